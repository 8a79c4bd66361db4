// SPDX-License-Identifier: GPL-3.0

//! A single simulated chain.
//!
//! This module provides [`ChainFork`], the handle tests and drivers use to produce
//! blocks, inject storage and inspect the results of one forked chain.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          ChainFork                              │
//! │                                                                 │
//! │   submit_extrinsic() ──► TxPool                                 │
//! │   set_storage() ───────► working StateStore (head + injections) │
//! │   enqueue_inbound() ───► InboundQueues (per channel FIFO)       │
//! │                                │                                │
//! │   new_block() ─────────► BlockBuilder ──► commit head           │
//! │                                                 │               │
//! │                                                 ▼               │
//! │                                    BlockObserver (relay)        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Block builds are serialized per fork. Different forks build independently.
//!
//! # Example
//!
//! ```ignore
//! let fork = ChainFork::builder("asset_hub", remote, runtime).build().await?;
//!
//! fork.set_storage(&StorageValues::default().with("System", "Account", accounts))?;
//! let inclusion = fork.submit_and_build(extrinsic).await?;
//! assert!(inclusion.is_success());
//!
//! let hrmp = fork.outbound_horizontal().await;
//! ```

use crate::{
	Block, BlockBuilder, RemoteStorageLayer, StateStore,
	block::{BlockHeader, BlockRef},
	error::{FetchError, ForkError, RelayError, SetupError},
	inherent::{InherentProvider, TimestampInherent, read_timestamp},
	injection::{StorageSchema, StorageValues},
	message::{
		ChainId, Channel, ChannelLimits, ChannelState, DownwardMessage, InboundQueues, Message,
		MessageKind, OutboundChannel,
	},
	runtime::{Event, MessageTags, Phase, Runtime},
	state::StorageChange,
	strings::inherent::parachain::storage_keys as para_keys,
	txpool::{PendingExtrinsic, TxPool},
};
use scale::Decode;
use std::{
	collections::{BTreeMap, HashMap},
	sync::{
		Arc, Mutex as StdMutex, RwLock as StdRwLock,
		atomic::{AtomicBool, Ordering},
	},
};
use subxt::config::substrate::H256;
use tokio::sync::{Mutex, RwLock};

/// Notified after every block a fork commits.
///
/// Called synchronously, before the next build on the same fork starts.
pub trait BlockObserver: Send + Sync {
	fn on_block_committed(&self, chain: ChainId, block: &Block);
}

/// Where and how an extrinsic was included.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtrinsicInclusion {
	/// Blake2-256 of the encoded extrinsic.
	pub hash: H256,
	pub block_number: u32,
	pub block_hash: H256,
	/// Position among the block's extrinsics.
	pub index: u32,
	/// `Err` with the dispatch error if the call failed.
	pub result: Result<(), String>,
	/// Events emitted while applying the extrinsic.
	pub events: Vec<Event>,
}

impl ExtrinsicInclusion {
	/// Whether the extrinsic dispatched successfully.
	pub fn is_success(&self) -> bool {
		self.result.is_ok()
	}
}

/// Inbound messages to deliver instead of the pending queues.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundOverride {
	/// Scripted downward messages, numbered from 1 in the given order.
	Downward(Vec<DownwardMessage>),
	/// Arbitrary messages per channel.
	Messages(BTreeMap<Channel, Vec<Message>>),
}

/// Options of [`ChainFork::new_block`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewBlockOptions {
	/// Number of blocks to build. Defaults to 1.
	pub count: Option<u32>,
	/// Build until the head reaches this number. Takes precedence over `count`.
	pub to: Option<u32>,
	/// Delivered by the first block built instead of its pending queues.
	pub inbound_override: Option<InboundOverride>,
}

impl NewBlockOptions {
	/// Build `count` blocks.
	pub fn count(count: u32) -> Self {
		Self { count: Some(count), ..Default::default() }
	}

	/// Build until the head is at `number`.
	pub fn to(number: u32) -> Self {
		Self { to: Some(number), ..Default::default() }
	}

	/// Deliver scripted downward messages in the first block.
	pub fn with_downward(mut self, messages: Vec<DownwardMessage>) -> Self {
		self.inbound_override = Some(InboundOverride::Downward(messages));
		self
	}

	/// Deliver `messages` in the first block.
	pub fn with_inbound(mut self, messages: BTreeMap<Channel, Vec<Message>>) -> Self {
		self.inbound_override = Some(InboundOverride::Messages(messages));
		self
	}
}

/// Storage key of `ParachainInfo::ParachainId`.
pub fn para_id_key() -> Vec<u8> {
	[
		sp_core::twox_128(para_keys::PARACHAIN_INFO_PALLET),
		sp_core::twox_128(para_keys::PARACHAIN_ID),
	]
	.concat()
}

/// Detect whether `remote` is a relay chain or a parachain.
///
/// `para_id` wins when given. Otherwise `ParachainInfo::ParachainId` is read from
/// the fork point: present means a parachain with that id.
pub async fn detect_chain(
	remote: &RemoteStorageLayer,
	para_id: Option<u32>,
) -> Result<ChainId, FetchError> {
	if let Some(id) = para_id {
		return Ok(ChainId::Para(id));
	}
	Ok(match remote.get(&para_id_key()).await? {
		Some(raw) => match u32::decode(&mut raw.as_slice()) {
			Ok(id) => ChainId::Para(id),
			Err(e) => {
				log::warn!("Undecodable ParachainInfo::ParachainId, assuming relay chain: {e}");
				ChainId::Relay
			},
		},
		None => ChainId::Relay,
	})
}

struct ChainState {
	head: Arc<Block>,
	/// Head state plus injections not yet built into a block.
	working: StateStore,
	/// Every block ever committed, reachable or not.
	blocks: HashMap<H256, Arc<Block>>,
	/// Block number to hash, from the fork point to the head.
	canonical: BTreeMap<u32, H256>,
	inclusions: HashMap<H256, ExtrinsicInclusion>,
	/// Last sequence number per outbound channel. Never rewound.
	sequences: HashMap<OutboundChannel, u64>,
}

/// Configures and creates a [`ChainFork`].
pub struct ChainForkBuilder {
	name: String,
	remote: Arc<RemoteStorageLayer>,
	runtime: Arc<dyn Runtime>,
	chain: Option<ChainId>,
	para_id: Option<u32>,
	limits: ChannelLimits,
	slot_duration_ms: Option<u64>,
	schema: StorageSchema,
	tags: MessageTags,
}

impl ChainForkBuilder {
	/// Use `chain` instead of detecting it.
	pub fn chain(mut self, chain: ChainId) -> Self {
		self.chain = Some(chain);
		self
	}

	/// Treat the chain as the parachain `para_id` when detecting it.
	pub fn para_id(mut self, para_id: Option<u32>) -> Self {
		self.para_id = para_id;
		self
	}

	pub fn channel_limits(mut self, limits: ChannelLimits) -> Self {
		self.limits = limits;
		self
	}

	/// Timestamp step per block. `None` uses the chain kind's default.
	pub fn slot_duration_ms(mut self, slot_duration_ms: Option<u64>) -> Self {
		self.slot_duration_ms = slot_duration_ms;
		self
	}

	pub fn schema(mut self, schema: StorageSchema) -> Self {
		self.schema = schema;
		self
	}

	pub fn message_tags(mut self, tags: MessageTags) -> Self {
		self.tags = tags;
		self
	}

	/// Read the fork point and create the fork.
	pub async fn build(self) -> Result<Arc<ChainFork>, SetupError> {
		self.limits.validate()?;
		let header = self.remote.header().await?;
		let chain = match self.chain {
			Some(chain) => chain,
			None => detect_chain(&self.remote, self.para_id).await?,
		};
		let slot_duration_ms = self
			.slot_duration_ms
			.unwrap_or_else(|| TimestampInherent::for_chain(chain).slot_duration_ms());

		let state = StateStore::new(self.remote.clone(), header.number);
		let timestamp = read_timestamp(&state).await?.unwrap_or_default();
		let fork_point = Arc::new(Block::fork_point(
			header.number,
			self.remote.block_hash(),
			header.parent_hash,
			timestamp,
			state.clone(),
		));
		log::info!(
			"Forked {} ({chain}) at #{} {:?} from {}",
			self.name,
			fork_point.number,
			fork_point.hash,
			self.remote.endpoint()
		);

		Ok(Arc::new(ChainFork {
			name: self.name,
			chain,
			fork_point: fork_point.header(),
			runtime: self.runtime,
			remote: self.remote,
			schema: self.schema,
			tags: self.tags,
			limits: self.limits,
			slot_duration_ms,
			build_lock: Mutex::new(()),
			state: RwLock::new(ChainState {
				working: state,
				blocks: HashMap::from([(fork_point.hash, fork_point.clone())]),
				canonical: BTreeMap::from([(fork_point.number, fork_point.hash)]),
				head: fork_point,
				inclusions: HashMap::new(),
				sequences: HashMap::new(),
			}),
			inbound: StdMutex::new(InboundQueues::default()),
			txpool: TxPool::new(),
			timestamp_override: StdMutex::new(None),
			observers: StdRwLock::new(Vec::new()),
			torn_down: AtomicBool::new(false),
		}))
	}
}

/// A simulated chain forked from a live one.
///
/// # Thread Safety
///
/// `ChainFork` is `Send + Sync` and is shared as `Arc<ChainFork>`. Block builds,
/// head changes and teardown are serialized; reads never wait for a build.
pub struct ChainFork {
	name: String,
	chain: ChainId,
	fork_point: BlockHeader,
	runtime: Arc<dyn Runtime>,
	remote: Arc<RemoteStorageLayer>,
	schema: StorageSchema,
	tags: MessageTags,
	limits: ChannelLimits,
	slot_duration_ms: u64,
	build_lock: Mutex<()>,
	state: RwLock<ChainState>,
	inbound: StdMutex<InboundQueues>,
	txpool: TxPool,
	/// Timestamp for the next block, set by time travel.
	timestamp_override: StdMutex<Option<u64>>,
	observers: StdRwLock<Vec<Arc<dyn BlockObserver>>>,
	torn_down: AtomicBool,
}

impl std::fmt::Debug for ChainFork {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChainFork")
			.field("name", &self.name)
			.field("chain", &self.chain)
			.field("fork_point", &self.fork_point)
			.field("torn_down", &self.is_torn_down())
			.finish_non_exhaustive()
	}
}

impl ChainFork {
	/// Configure a fork of `remote` executed by `runtime`.
	pub fn builder(
		name: &str,
		remote: Arc<RemoteStorageLayer>,
		runtime: Arc<dyn Runtime>,
	) -> ChainForkBuilder {
		ChainForkBuilder {
			name: name.to_string(),
			remote,
			runtime,
			chain: None,
			para_id: None,
			limits: ChannelLimits::default(),
			slot_duration_ms: None,
			schema: StorageSchema::default(),
			tags: MessageTags::default(),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Relay chain or parachain id.
	pub fn chain(&self) -> ChainId {
		self.chain
	}

	/// The remote block the fork started from.
	pub fn fork_point(&self) -> &BlockHeader {
		&self.fork_point
	}

	/// Timestamp step per block in milliseconds.
	pub fn slot_duration_ms(&self) -> u64 {
		self.slot_duration_ms
	}

	pub fn channel_limits(&self) -> &ChannelLimits {
		&self.limits
	}

	/// The storage injection schema.
	pub fn schema(&self) -> &StorageSchema {
		&self.schema
	}

	pub fn is_torn_down(&self) -> bool {
		self.torn_down.load(Ordering::SeqCst)
	}

	fn ensure_live(&self) -> Result<(), ForkError> {
		if self.is_torn_down() {
			return Err(ForkError::TornDown(self.name.clone()));
		}
		Ok(())
	}

	/// Header of the current head.
	pub async fn head(&self) -> BlockHeader {
		self.state.read().await.head.header()
	}

	/// The current head block.
	pub async fn head_block(&self) -> Arc<Block> {
		self.state.read().await.head.clone()
	}

	/// A committed block.
	///
	/// Numbers resolve along the current chain only; hashes also find blocks made
	/// unreachable by [`set_head`](Self::set_head).
	pub async fn block(&self, block: impl Into<BlockRef>) -> Option<Arc<Block>> {
		let state = self.state.read().await;
		Self::resolve(&state, block.into())
	}

	fn resolve(state: &ChainState, block: BlockRef) -> Option<Arc<Block>> {
		let hash = match block {
			BlockRef::Number(number) => *state.canonical.get(&number)?,
			BlockRef::Hash(hash) => hash,
		};
		state.blocks.get(&hash).cloned()
	}

	/// Build blocks on the head.
	///
	/// Each block drains the pending inbound queues up to the channel limits and
	/// includes every queued extrinsic. Returns the header of the last block built,
	/// or of the unchanged head when there is nothing to build.
	///
	/// # Errors
	///
	/// Stops at the first failed build. Blocks committed before it stay committed.
	pub async fn new_block(&self, options: NewBlockOptions) -> Result<BlockHeader, ForkError> {
		let _build = self.build_lock.lock().await;
		self.ensure_live()?;

		let head = self.state.read().await.head.number;
		let count = match options.to {
			Some(to) => to.saturating_sub(head),
			None => options.count.unwrap_or(1),
		};

		let mut inbound_override = options.inbound_override;
		for _ in 0..count {
			self.build_one(inbound_override.take()).await?;
		}
		Ok(self.head().await)
	}

	async fn build_one(
		&self,
		inbound_override: Option<InboundOverride>,
	) -> Result<Arc<Block>, ForkError> {
		let (parent, working) = {
			let state = self.state.read().await;
			(state.head.clone(), state.working.clone())
		};

		let from_queues = inbound_override.is_none();
		let inbound = match inbound_override {
			Some(InboundOverride::Downward(messages)) => self.scripted_downward(messages),
			Some(InboundOverride::Messages(messages)) => messages,
			None => self.lock_inbound()?.peek_drain(&self.limits),
		};

		let timestamp_override = *self.timestamp_override.lock().unwrap_or_else(|e| e.into_inner());
		let providers: Vec<Box<dyn InherentProvider>> = vec![Box::new(
			TimestampInherent::new(self.slot_duration_ms).with_override(timestamp_override),
		)];

		let extrinsics = self.txpool.drain()?;
		let builder =
			BlockBuilder::new(parent, working, self.runtime.clone(), self.chain, providers)
				.with_message_tags(self.tags.clone())
				.with_inbound(inbound.clone());

		let builder = match Self::apply_all(builder, &extrinsics).await {
			Ok(builder) => builder,
			Err(e) => {
				if !extrinsics.is_empty() {
					log::warn!(
						"Dropping {} extrinsics after failed build on {}: {e}",
						extrinsics.len(),
						self.name
					);
				}
				return Err(e);
			},
		};

		let block = {
			let mut state = self.state.write().await;
			let block = Arc::new(builder.finalize(&mut state.sequences)?);
			for record in &block.records {
				let events = block
					.events
					.iter()
					.filter(|event| event.phase == Phase::ApplyExtrinsic(record.index))
					.cloned()
					.collect();
				state.inclusions.insert(
					record.hash,
					ExtrinsicInclusion {
						hash: record.hash,
						block_number: block.number,
						block_hash: block.hash,
						index: record.index,
						result: record.result.clone(),
						events,
					},
				);
			}
			state.blocks.insert(block.hash, block.clone());
			state.canonical.insert(block.number, block.hash);
			state.working = block.state().snapshot();
			state.head = block.clone();
			block
		};

		if from_queues {
			self.lock_inbound()?.commit_drain(&block.inbound);
		}
		if timestamp_override.is_some() {
			*self.timestamp_override.lock().unwrap_or_else(|e| e.into_inner()) = None;
		}
		log::debug!("{} committed block #{} {:?}", self.name, block.number, block.hash);

		let observers = self.observers.read().unwrap_or_else(|e| e.into_inner()).clone();
		for observer in observers {
			observer.on_block_committed(self.chain, &block);
		}
		Ok(block)
	}

	async fn apply_all(
		mut builder: BlockBuilder,
		extrinsics: &[PendingExtrinsic],
	) -> Result<BlockBuilder, ForkError> {
		builder.initialize()?;
		builder.apply_inherents().await?;
		for extrinsic in extrinsics {
			builder.apply_extrinsic(extrinsic.encoded.clone()).await?;
		}
		Ok(builder)
	}

	fn scripted_downward(&self, messages: Vec<DownwardMessage>) -> BTreeMap<Channel, Vec<Message>> {
		let messages: Vec<Message> = messages
			.into_iter()
			.enumerate()
			.map(|(i, message)| Message {
				kind: MessageKind::Downward,
				origin: ChainId::Relay,
				destination: Some(self.chain),
				sequence: i as u64 + 1,
				payload: message.msg,
				sent_at: message.sent_at,
			})
			.collect();
		if messages.is_empty() {
			return BTreeMap::new();
		}
		BTreeMap::from([(Channel::Downward, messages)])
	}

	fn lock_inbound(&self) -> Result<std::sync::MutexGuard<'_, InboundQueues>, RelayError> {
		self.inbound.lock().map_err(|e| RelayError::Lock(e.to_string()))
	}

	/// Inject human-authored storage values into the head state.
	///
	/// Visible to reads immediately and built on by the next block. Waits for a
	/// build in progress, so the values land on the block it commits. Returns the
	/// number of raw keys written.
	pub async fn set_storage(&self, values: &StorageValues) -> Result<usize, ForkError> {
		let _build = self.build_lock.lock().await;
		self.ensure_live()?;
		Ok(self.state.write().await.working.apply_bulk(values, &self.schema)?)
	}

	/// Inject raw storage changes into the head state.
	///
	/// Waits for a build in progress, like [`set_storage`](Self::set_storage).
	pub async fn set_storage_raw(&self, changes: Vec<StorageChange>) -> Result<(), ForkError> {
		let _build = self.build_lock.lock().await;
		self.ensure_live()?;
		self.state.write().await.working.apply_raw(changes);
		Ok(())
	}

	/// Move the head to a committed block.
	///
	/// Blocks after it become unreachable by number but are kept, so a later
	/// `set_head` by hash can re-attach them. Injected storage not yet built into a
	/// block is discarded. Pending inbound messages and extrinsics are kept.
	pub async fn set_head(&self, block: impl Into<BlockRef>) -> Result<BlockHeader, ForkError> {
		let block = block.into();
		let _build = self.build_lock.lock().await;
		self.ensure_live()?;

		let mut state = self.state.write().await;
		let target = Self::resolve(&state, block)
			.ok_or_else(|| ForkError::BlockNotFound(block.to_string()))?;

		let mut canonical = BTreeMap::new();
		let mut cursor = Some(target.clone());
		while let Some(current) = cursor {
			canonical.insert(current.number, current.hash);
			cursor = if current.number > self.fork_point.number {
				state.blocks.get(&current.parent_hash).cloned()
			} else {
				None
			};
		}
		state.canonical = canonical;
		state.working = target.state().snapshot();
		state.head = target.clone();
		log::debug!("{} head set to #{} {:?}", self.name, target.number, target.hash);
		Ok(target.header())
	}

	/// Use `timestamp` (milliseconds) for the next block built.
	pub fn time_travel(&self, timestamp: u64) -> Result<(), ForkError> {
		self.ensure_live()?;
		*self.timestamp_override.lock().unwrap_or_else(|e| e.into_inner()) = Some(timestamp);
		Ok(())
	}

	/// Queue an extrinsic for the next block. Returns its hash.
	pub fn submit_extrinsic(&self, extrinsic: Vec<u8>) -> Result<H256, ForkError> {
		self.ensure_live()?;
		Ok(self.txpool.submit(extrinsic)?)
	}

	/// Queue an extrinsic, build one block and report its inclusion.
	pub async fn submit_and_build(
		&self,
		extrinsic: Vec<u8>,
	) -> Result<ExtrinsicInclusion, ForkError> {
		let hash = self.submit_extrinsic(extrinsic)?;
		let head = self.new_block(NewBlockOptions::default()).await?;
		self.extrinsic_status(&hash)
			.await
			.filter(|inclusion| inclusion.block_hash == head.hash)
			.ok_or_else(|| ForkError::BlockNotFound(format!("block including {hash:?}")))
	}

	/// Inclusion of a previously built extrinsic.
	pub async fn extrinsic_status(&self, hash: &H256) -> Option<ExtrinsicInclusion> {
		self.state.read().await.inclusions.get(hash).cloned()
	}

	/// Extrinsics waiting for the next block.
	pub fn pending_extrinsics(&self) -> Result<Vec<PendingExtrinsic>, ForkError> {
		Ok(self.txpool.pending()?)
	}

	/// Append a message to the pending inbound queue of its channel.
	pub fn enqueue_inbound(&self, message: Message) -> Result<Channel, RelayError> {
		if self.is_torn_down() {
			return Err(RelayError::DestinationGone(self.chain));
		}
		if message.target() != Some(self.chain) {
			return Err(RelayError::UnregisteredChannel {
				origin: message.origin,
				destination: self.chain,
			});
		}
		self.lock_inbound()?.push(message)
	}

	/// Messages waiting on `channel`, oldest first.
	pub fn pending_inbound(&self, channel: Channel) -> Result<Vec<Message>, ForkError> {
		Ok(self.lock_inbound()?.pending(channel))
	}

	/// Whether `channel` has messages waiting.
	pub fn inbound_state(&self, channel: Channel) -> Result<ChannelState, ForkError> {
		Ok(self.lock_inbound()?.state(channel))
	}

	/// Events of the head block.
	pub async fn events(&self) -> Vec<Event> {
		self.state.read().await.head.events.clone()
	}

	/// Events of a committed block.
	pub async fn events_at(&self, block: impl Into<BlockRef>) -> Result<Vec<Event>, ForkError> {
		let block = block.into();
		self.block(block)
			.await
			.map(|block| block.events.clone())
			.ok_or_else(|| ForkError::BlockNotFound(block.to_string()))
	}

	/// Events of the head block whose section is one of `sections`, ignoring case.
	pub async fn events_in_sections(&self, sections: &[&str]) -> Vec<Event> {
		self.events()
			.await
			.into_iter()
			.filter(|event| sections.iter().any(|s| s.eq_ignore_ascii_case(&event.section)))
			.collect()
	}

	async fn outbound_of(&self, kind: MessageKind) -> Vec<Message> {
		self.state
			.read()
			.await
			.head
			.outbound_messages()
			.filter(|message| message.kind == kind)
			.cloned()
			.collect()
	}

	/// Horizontal messages sent by the head block.
	pub async fn outbound_horizontal(&self) -> Vec<Message> {
		self.outbound_of(MessageKind::Horizontal).await
	}

	/// Upward messages sent by the head block.
	pub async fn outbound_upward(&self) -> Vec<Message> {
		self.outbound_of(MessageKind::Upward).await
	}

	/// Downward messages sent by the head block.
	pub async fn outbound_downward(&self) -> Vec<Message> {
		self.outbound_of(MessageKind::Downward).await
	}

	/// Read a key from the head state, including injections not yet built.
	pub async fn storage(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ForkError> {
		self.ensure_live()?;
		let working = self.state.read().await.working.clone();
		Ok(working.read(key).await?)
	}

	/// Read a key as of a committed block.
	pub async fn storage_at(
		&self,
		block: impl Into<BlockRef>,
		key: &[u8],
	) -> Result<Option<Vec<u8>>, ForkError> {
		self.ensure_live()?;
		let block = block.into();
		let found =
			self.block(block).await.ok_or_else(|| ForkError::BlockNotFound(block.to_string()))?;
		Ok(found.state().read(key).await?)
	}

	/// Read and decode a schema item from the head state.
	pub async fn read_storage_item(
		&self,
		module: &str,
		item: &str,
		key: &serde_json::Value,
	) -> Result<Option<serde_json::Value>, ForkError> {
		let raw_key = self.schema.storage_key(module, item, key)?;
		match self.storage(&raw_key).await? {
			Some(raw) => Ok(Some(self.schema.decode(module, item, &raw)?)),
			None => Ok(None),
		}
	}

	/// Notify `observer` of every block committed from now on.
	pub fn add_observer(&self, observer: Arc<dyn BlockObserver>) {
		self.observers.write().unwrap_or_else(|e| e.into_inner()).push(observer);
	}

	/// Release the remote source, drop pending messages and extrinsics and detach
	/// observers. Idempotent.
	///
	/// Committed blocks stay readable where their state is cached; anything else
	/// fails with [`FetchError::Closed`].
	pub fn teardown(&self) {
		if self.torn_down.swap(true, Ordering::SeqCst) {
			return;
		}
		self.remote.close();
		self.inbound.lock().unwrap_or_else(|e| e.into_inner()).clear();
		if let Err(e) = self.txpool.clear() {
			log::warn!("Could not clear the transaction pool of {}: {e}", self.name);
		}
		self.observers.write().unwrap_or_else(|e| e.into_inner()).clear();
		log::info!("Tore down {}", self.name);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		dev::{account_storage_key, free_balance},
		strings::inherent::timestamp::slot_duration,
		testing::{
			self, ALICE, BOB, CHARLIE, GENESIS_TIMESTAMP, InMemorySource, MockCall, MockXcm,
			XCM_FEE, extrinsic, mock_fork,
		},
	};
	use scale::Encode;
	use serde_json::json;
	use std::sync::Mutex as TestMutex;

	async fn relay() -> Arc<ChainFork> {
		mock_fork(Arc::new(InMemorySource::relay())).await
	}

	async fn para(id: u32) -> Arc<ChainFork> {
		mock_fork(Arc::new(InMemorySource::para(id))).await
	}

	async fn balance(fork: &ChainFork, who: &[u8; 32]) -> u128 {
		fork.storage(&account_storage_key(who))
			.await
			.unwrap()
			.and_then(|raw| free_balance(&raw))
			.unwrap_or_default()
	}

	#[tokio::test]
	async fn chain_kind_is_detected() {
		assert_eq!(relay().await.chain(), ChainId::Relay);
		assert_eq!(para(2000).await.chain(), ChainId::Para(2000));
		assert_eq!(para(2000).await.slot_duration_ms(), slot_duration::PARACHAIN_MS);

		let remote = testing::remote_layer(Arc::new(InMemorySource::relay())).await;
		assert_eq!(detect_chain(&remote, Some(7)).await.unwrap(), ChainId::Para(7));
	}

	#[tokio::test]
	async fn new_block_count_and_to() {
		let fork = relay().await;
		assert_eq!(fork.fork_point().number, 0);
		assert_eq!(fork.fork_point().timestamp, GENESIS_TIMESTAMP);

		let header = fork.new_block(NewBlockOptions::count(3)).await.unwrap();
		assert_eq!(header.number, 3);
		assert_eq!(header.timestamp, GENESIS_TIMESTAMP + 3 * 6_000);

		assert_eq!(fork.new_block(NewBlockOptions::to(5)).await.unwrap().number, 5);
		// Already past the target.
		assert_eq!(fork.new_block(NewBlockOptions::to(2)).await.unwrap().number, 5);

		let both = NewBlockOptions { count: Some(10), to: Some(6), ..Default::default() };
		assert_eq!(fork.new_block(both).await.unwrap().number, 6);
	}

	#[tokio::test]
	async fn identical_forks_build_identical_blocks() {
		let a = relay().await;
		let b = relay().await;
		let ha = a.new_block(NewBlockOptions::count(3)).await.unwrap();
		let hb = b.new_block(NewBlockOptions::count(3)).await.unwrap();
		assert_eq!(ha, hb);
	}

	#[tokio::test]
	async fn time_travel_applies_to_next_block_only() {
		let fork = relay().await;
		fork.new_block(NewBlockOptions::default()).await.unwrap();
		fork.time_travel(2_000_000_000_000).unwrap();

		let travelled = fork.new_block(NewBlockOptions::default()).await.unwrap();
		assert_eq!(travelled.timestamp, 2_000_000_000_000);
		let after = fork.new_block(NewBlockOptions::default()).await.unwrap();
		assert_eq!(after.timestamp, 2_000_000_000_000 + 6_000);

		let first = fork.block(1u32).await.unwrap();
		assert_eq!(first.timestamp, GENESIS_TIMESTAMP + 6_000);
	}

	#[tokio::test]
	async fn set_storage_is_visible_and_built_on() {
		let fork = relay().await;
		let values = StorageValues::default().with(
			"System",
			"Account",
			json!([[format!("0x{}", hex::encode(BOB)), { "providers": 1, "data": { "free": 500 } }]]),
		);
		assert_eq!(fork.set_storage(&values).await.unwrap(), 1);
		assert_eq!(balance(&fork, &BOB).await, 500);

		fork.new_block(NewBlockOptions::default()).await.unwrap();
		let built = fork.storage_at(1u32, &account_storage_key(&BOB)).await.unwrap().unwrap();
		assert_eq!(free_balance(&built), Some(500));
		assert_eq!(fork.storage_at(0u32, &account_storage_key(&BOB)).await.unwrap(), None);

		let decoded = fork
			.read_storage_item("System", "Account", &json!(format!("0x{}", hex::encode(BOB))))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(decoded["data"]["free"], json!("500"));
	}

	#[tokio::test]
	async fn foreign_asset_holdings_are_readable_by_location() {
		let fork = para(1000).await;
		let relay_token = json!({ "parents": 1, "interior": "Here" });
		let bob = format!("0x{}", hex::encode(BOB));
		let values = StorageValues::default().with(
			"ForeignAssets",
			"Account",
			json!([[[relay_token.clone(), bob.clone()], { "balance": 10e10 }]]),
		);
		assert_eq!(fork.set_storage(&values).await.unwrap(), 1);
		fork.new_block(NewBlockOptions::default()).await.unwrap();

		let holding = fork
			.read_storage_item("ForeignAssets", "Account", &json!([relay_token, bob]))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(holding["balance"], json!("100000000000"));
		assert_eq!(holding["status"], json!("Liquid"));
	}

	#[tokio::test]
	async fn set_head_rewinds_and_keeps_stale_blocks() {
		let fork = relay().await;
		fork.submit_extrinsic(extrinsic(ALICE, MockCall::Transfer { dest: BOB, amount: 7 }))
			.unwrap();
		fork.new_block(NewBlockOptions::count(3)).await.unwrap();
		let stale = fork.head().await;
		assert_eq!(balance(&fork, &BOB).await, 7);

		let rewound = fork.set_head(1u32).await.unwrap();
		assert_eq!(rewound.number, 1);
		assert!(fork.block(3u32).await.is_none());
		assert!(fork.block(stale.hash).await.is_some());

		let next = fork.new_block(NewBlockOptions::default()).await.unwrap();
		assert_eq!(next.number, 2);
		assert_eq!(next.parent_hash, rewound.hash);
		assert_eq!(balance(&fork, &BOB).await, 7);

		fork.set_head(0u32).await.unwrap();
		assert_eq!(balance(&fork, &BOB).await, 0);

		// Re-attach the stale chain.
		fork.set_head(stale.hash).await.unwrap();
		assert_eq!(fork.block(3u32).await.unwrap().hash, stale.hash);
		assert!(matches!(fork.set_head(99u32).await, Err(ForkError::BlockNotFound(_))));
	}

	#[tokio::test]
	async fn submit_and_build_reports_inclusion() {
		let fork = relay().await;
		let ok = fork
			.submit_and_build(extrinsic(ALICE, MockCall::Transfer { dest: CHARLIE, amount: 1 }))
			.await
			.unwrap();
		assert!(ok.is_success());
		assert_eq!(ok.block_number, 1);
		assert!(ok.events.iter().any(|e| e.is("System", "ExtrinsicSuccess")));
		assert_eq!(fork.extrinsic_status(&ok.hash).await, Some(ok.clone()));

		let failed = fork.submit_and_build(extrinsic(ALICE, MockCall::Fail)).await.unwrap();
		assert!(!failed.is_success());
		assert!(failed.events.iter().any(|e| e.is("System", "ExtrinsicFailed")));
		assert!(fork.pending_extrinsics().unwrap().is_empty());
	}

	#[tokio::test]
	async fn runtime_fault_surfaces_and_keeps_history() {
		let fork = relay().await;
		fork.new_block(NewBlockOptions::default()).await.unwrap();
		fork.submit_extrinsic(extrinsic(ALICE, MockCall::Panic)).unwrap();

		let result = fork.new_block(NewBlockOptions::default()).await;
		assert!(matches!(result, Err(ForkError::Build(crate::BuildError::RuntimeFault { .. }))));
		assert_eq!(fork.head().await.number, 1);
		assert!(fork.pending_extrinsics().unwrap().is_empty());
	}

	fn downward(sequence: u64, amount: u128) -> Message {
		Message {
			kind: MessageKind::Downward,
			origin: ChainId::Relay,
			destination: Some(ChainId::Para(1000)),
			sequence,
			payload: MockXcm { beneficiary: BOB, amount }.encode(),
			sent_at: 1,
		}
	}

	#[tokio::test]
	async fn inbound_queue_drains_once_under_limits() {
		let fork = mock_fork(Arc::new(InMemorySource::para(1000))).await;
		let limited = ChainFork::builder(
			"limited",
			testing::remote_layer(Arc::new(InMemorySource::para(1000))).await,
			Arc::new(testing::MockRuntime::new(ChainId::Para(1000))),
		)
		.channel_limits(ChannelLimits::uniform(crate::message::ChannelLimit {
			max_messages: 2,
			max_bytes: 1024,
		}))
		.build()
		.await
		.unwrap();

		for target in [&fork, &limited] {
			for sequence in 1..=3 {
				target.enqueue_inbound(downward(sequence, XCM_FEE * 2)).unwrap();
			}
		}

		fork.new_block(NewBlockOptions::default()).await.unwrap();
		assert_eq!(fork.inbound_state(Channel::Downward).unwrap(), ChannelState::Idle);
		assert_eq!(balance(&fork, &BOB).await, XCM_FEE * 3);

		limited.new_block(NewBlockOptions::default()).await.unwrap();
		let left = limited.pending_inbound(Channel::Downward).unwrap();
		assert_eq!(left.iter().map(|m| m.sequence).collect::<Vec<_>>(), vec![3]);
		limited.new_block(NewBlockOptions::default()).await.unwrap();
		assert!(limited.pending_inbound(Channel::Downward).unwrap().is_empty());
		let consumed = &limited.head_block().await.inbound[&Channel::Downward];
		assert_eq!(consumed[0].sequence, 3);
	}

	#[tokio::test]
	async fn enqueue_rejects_wrong_destination() {
		let fork = para(1000).await;
		let mut message = downward(1, 1);
		message.destination = Some(ChainId::Para(2000));
		assert!(matches!(
			fork.enqueue_inbound(message),
			Err(RelayError::UnregisteredChannel { .. })
		));
	}

	#[tokio::test]
	async fn scripted_downward_messages_leave_queues_alone() {
		let fork = para(1000).await;
		fork.enqueue_inbound(downward(1, XCM_FEE * 2)).unwrap();

		let scripted = vec![DownwardMessage {
			sent_at: 42,
			msg: MockXcm { beneficiary: CHARLIE, amount: XCM_FEE * 5 }.encode(),
		}];
		fork.new_block(NewBlockOptions::count(2).with_downward(scripted)).await.unwrap();

		let first = fork.block(1u32).await.unwrap();
		assert_eq!(first.inbound[&Channel::Downward][0].sent_at, 42);
		assert_eq!(balance(&fork, &CHARLIE).await, XCM_FEE * 4);
		// The queued message went into the second block.
		assert_eq!(balance(&fork, &BOB).await, XCM_FEE);
	}

	#[derive(Default)]
	struct Recorder(TestMutex<Vec<(ChainId, u32)>>);

	impl BlockObserver for Recorder {
		fn on_block_committed(&self, chain: ChainId, block: &Block) {
			self.0.lock().unwrap().push((chain, block.number));
		}
	}

	#[tokio::test]
	async fn teardown_is_idempotent_and_final() {
		let fork = relay().await;
		let recorder = Arc::new(Recorder::default());
		fork.add_observer(recorder.clone());
		fork.new_block(NewBlockOptions::default()).await.unwrap();
		fork.submit_extrinsic(vec![1]).unwrap();

		fork.teardown();
		fork.teardown();

		assert!(fork.is_torn_down());
		assert!(matches!(
			fork.new_block(NewBlockOptions::default()).await,
			Err(ForkError::TornDown(_))
		));
		assert!(fork.pending_extrinsics().unwrap().is_empty());
		assert!(matches!(fork.enqueue_inbound(downward(1, 1)), Err(RelayError::DestinationGone(_))));
		assert_eq!(*recorder.0.lock().unwrap(), vec![(ChainId::Relay, 1)]);
	}

	#[tokio::test]
	async fn events_filter_by_section() {
		let fork = para(1000).await;
		fork.submit_extrinsic(extrinsic(
			ALICE,
			MockCall::ReserveTransfer { dest: ChainId::Para(2000), beneficiary: BOB, amount: 5 },
		))
		.unwrap();
		fork.new_block(NewBlockOptions::default()).await.unwrap();

		let xcmp = fork.events_in_sections(&["xcmpQueue"]).await;
		assert_eq!(xcmp.len(), 1);
		assert_eq!(fork.outbound_horizontal().await.len(), 1);
		assert!(fork.outbound_upward().await.is_empty());
		assert!(fork.events_at(0u32).await.unwrap().is_empty());
	}

	/// Parks in `apply_extrinsic` until released.
	struct GatedRuntime {
		inner: testing::MockRuntime,
		entered: Arc<tokio::sync::Notify>,
		release: Arc<tokio::sync::Notify>,
	}

	#[async_trait::async_trait]
	impl Runtime for GatedRuntime {
		fn identifier(&self) -> &str {
			self.inner.identifier()
		}

		async fn apply_inherent(
			&self,
			state: &mut StateStore,
			context: &crate::runtime::BlockContext,
			inherent: &crate::runtime::Inherent,
		) -> Result<Vec<Event>, crate::runtime::RuntimeFault> {
			self.inner.apply_inherent(state, context, inherent).await
		}

		async fn apply_extrinsic(
			&self,
			state: &mut StateStore,
			context: &crate::runtime::BlockContext,
			extrinsic: &[u8],
		) -> Result<crate::runtime::ApplyOutcome, crate::runtime::RuntimeFault> {
			self.entered.notify_one();
			self.release.notified().await;
			self.inner.apply_extrinsic(state, context, extrinsic).await
		}
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn storage_injected_during_a_build_lands_on_the_next_head() {
		let entered = Arc::new(tokio::sync::Notify::new());
		let release = Arc::new(tokio::sync::Notify::new());
		let runtime = GatedRuntime {
			inner: testing::MockRuntime::new(ChainId::Relay),
			entered: entered.clone(),
			release: release.clone(),
		};
		let fork = ChainFork::builder(
			"gated",
			testing::remote_layer(Arc::new(InMemorySource::relay())).await,
			Arc::new(runtime),
		)
		.chain(ChainId::Relay)
		.build()
		.await
		.unwrap();

		fork.submit_extrinsic(extrinsic(ALICE, MockCall::Remark(vec![1]))).unwrap();
		let build = tokio::spawn({
			let fork = fork.clone();
			async move { fork.new_block(NewBlockOptions::default()).await }
		});
		entered.notified().await;

		let inject = tokio::spawn({
			let fork = fork.clone();
			async move {
				fork.set_storage_raw(vec![(b"injected".to_vec(), Some(b"v".to_vec()))]).await
			}
		});
		tokio::time::sleep(std::time::Duration::from_millis(50)).await;
		assert!(!inject.is_finished());

		release.notify_one();
		assert_eq!(build.await.unwrap().unwrap().number, 1);
		inject.await.unwrap().unwrap();

		assert_eq!(fork.storage(b"injected").await.unwrap(), Some(b"v".to_vec()));
		assert_eq!(fork.storage_at(1u32, b"injected").await.unwrap(), None);

		fork.new_block(NewBlockOptions::default()).await.unwrap();
		assert_eq!(fork.storage_at(2u32, b"injected").await.unwrap(), Some(b"v".to_vec()));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_builds_on_one_fork_are_serialized() {
		let fork = relay().await;
		let builds: Vec<_> = (0..8)
			.map(|_| {
				let fork = fork.clone();
				tokio::spawn(async move { fork.new_block(NewBlockOptions::default()).await })
			})
			.collect();

		let mut numbers = Vec::new();
		for build in builds {
			numbers.push(build.await.unwrap().unwrap().number);
		}
		numbers.sort_unstable();
		assert_eq!(numbers, (1..=8).collect::<Vec<u32>>());

		assert_eq!(fork.head().await.number, 8);
		for number in 1..=8u32 {
			let block = fork.block(number).await.unwrap();
			let parent = fork.block(number - 1).await.unwrap();
			assert_eq!(block.parent_hash, parent.hash);
		}
	}
}
