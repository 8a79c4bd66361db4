// SPDX-License-Identifier: GPL-3.0

//! Block builder for constructing new blocks on a forked chain.
//!
//! This module provides the [`BlockBuilder`] for constructing new blocks by applying
//! inherents, user extrinsics, and finalizing the block.
//!
//! # Architecture
//!
//! The block building process follows these phases:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Block Building Flow                        │
//! │                                                                 │
//! │   1. new()          Snapshot the parent's working state         │
//! │         │                                                       │
//! │         ▼                                                       │
//! │   2. initialize()   Fix the block number and context            │
//! │         │                                                       │
//! │         ▼                                                       │
//! │   3. apply_inherents()  Timestamp, then inbound messages        │
//! │         │                                                       │
//! │         ▼                                                       │
//! │   4. apply_extrinsic()  Apply user extrinsics (repeatable)      │
//! │         │                                                       │
//! │         ▼                                                       │
//! │   5. finalize()     Extract outbound messages                   │
//! │                     Returns new Block                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! let mut builder = BlockBuilder::new(parent, state, runtime, chain, providers)
//!     .with_inbound(drained);
//!
//! builder.initialize()?;
//! builder.apply_inherents().await?;
//! for extrinsic in extrinsics {
//!     match builder.apply_extrinsic(extrinsic).await? {
//!         ApplyExtrinsicResult::Success { .. } => {},
//!         ApplyExtrinsicResult::DispatchFailed { error } => log::debug!("{error}"),
//!     }
//! }
//! let block = builder.finalize(&mut sequences)?;
//! ```

use crate::{
	Block, BuildError, ChainId, StateStore,
	block::ExtrinsicRecord,
	inherent::{InboundMessageInherent, InherentProvider},
	message::{Channel, Message, MessageKind, OutboundChannel},
	runtime::{BlockContext, Event, Inherent, MessageTags, Phase, Runtime},
	strings::relay::fields,
	txpool::extrinsic_hash,
};
use std::{
	collections::{BTreeMap, HashMap},
	sync::Arc,
};

/// Phase of the block building process.
///
/// Tracks the current state of the builder to enforce correct ordering:
/// `Created` → `Initialized` → `InherentsApplied` → (extrinsics) → finalize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuilderPhase {
	/// Builder created, `initialize()` not yet called.
	#[default]
	Created,
	/// Block context fixed, ready for inherents.
	Initialized,
	/// Inherents applied, ready for user extrinsics and finalization.
	InherentsApplied,
}

/// Result of applying an extrinsic to the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyExtrinsicResult {
	/// Extrinsic was applied successfully.
	Success {
		/// Number of storage keys modified by this extrinsic.
		storage_changes: usize,
	},
	/// Extrinsic dispatch failed.
	///
	/// Storage changes from the failed extrinsic are NOT applied. The extrinsic and
	/// its events are still part of the block.
	DispatchFailed {
		/// Error description from the runtime.
		error: String,
	},
}

/// Builder for constructing new blocks on a forked chain.
///
/// # Storage Handling
///
/// The builder works on its own snapshot of the state it was given. Each extrinsic
/// runs on a further scratch copy which replaces the block state only on success.
///
/// # Thread Safety
///
/// `BlockBuilder` should be driven from a single async task. The owning
/// [`ChainFork`](crate::ChainFork) serializes builds.
pub struct BlockBuilder {
	/// The parent block being extended.
	parent: Arc<Block>,
	/// State the block is built on.
	state: StateStore,
	runtime: Arc<dyn Runtime>,
	chain: ChainId,
	tags: MessageTags,
	inherent_providers: Vec<Box<dyn InherentProvider>>,
	/// Inbound messages the block consumes, recorded in the block.
	inbound: BTreeMap<Channel, Vec<Message>>,
	context: Option<BlockContext>,
	/// Applied user extrinsics, in order.
	extrinsics: Vec<Vec<u8>>,
	records: Vec<ExtrinsicRecord>,
	events: Vec<Event>,
	phase: BuilderPhase,
}

impl BlockBuilder {
	/// Create a new block builder.
	///
	/// # Arguments
	///
	/// * `parent` - The parent block to build upon
	/// * `state` - State to build on: the parent's state plus any pending injections
	/// * `runtime` - State-transition function of the chain
	/// * `chain` - Chain the block belongs to, the origin of its outbound messages
	/// * `inherent_providers` - Providers for generating inherents, applied in order
	pub fn new(
		parent: Arc<Block>,
		state: StateStore,
		runtime: Arc<dyn Runtime>,
		chain: ChainId,
		inherent_providers: Vec<Box<dyn InherentProvider>>,
	) -> Self {
		let mut state = state.snapshot();
		state.set_block_height(parent.number + 1);
		Self {
			parent,
			state,
			runtime,
			chain,
			tags: MessageTags::default(),
			inherent_providers,
			inbound: BTreeMap::new(),
			context: None,
			extrinsics: Vec::new(),
			records: Vec::new(),
			events: Vec::new(),
			phase: BuilderPhase::Created,
		}
	}

	/// Recognise outbound messages by `tags` instead of the defaults.
	pub fn with_message_tags(mut self, tags: MessageTags) -> Self {
		self.tags = tags;
		self
	}

	/// Deliver `inbound` in this block, after the other inherents.
	pub fn with_inbound(mut self, inbound: BTreeMap<Channel, Vec<Message>>) -> Self {
		self.inherent_providers.push(Box::new(InboundMessageInherent::new(inbound.clone())));
		self.inbound = inbound;
		self
	}

	/// Get the current list of successfully applied extrinsics.
	pub fn extrinsics(&self) -> &[Vec<u8>] {
		&self.extrinsics
	}

	/// Events emitted so far.
	pub fn events(&self) -> &[Event] {
		&self.events
	}

	/// Get the current phase of block building.
	pub fn phase(&self) -> BuilderPhase {
		self.phase
	}

	/// Fix the block context. Must be called once, before anything else.
	pub fn initialize(&mut self) -> Result<&BlockContext, BuildError> {
		if self.phase != BuilderPhase::Created {
			return Err(BuildError::AlreadyInitialized);
		}
		self.phase = BuilderPhase::Initialized;
		Ok(self.context.insert(BlockContext {
			chain: self.chain,
			number: self.parent.number + 1,
			parent_hash: self.parent.hash,
			timestamp: self.parent.timestamp,
		}))
	}

	/// Apply the inherents of all registered providers, in registration order.
	///
	/// Returns the number of inherents applied.
	///
	/// # Errors
	///
	/// Returns an error if:
	/// - The block has not been initialized
	/// - Inherents have already been applied
	/// - Any inherent provider fails
	/// - The runtime faults on an inherent
	pub async fn apply_inherents(&mut self) -> Result<usize, BuildError> {
		match self.phase {
			BuilderPhase::Created => return Err(BuildError::NotInitialized),
			BuilderPhase::InherentsApplied => return Err(BuildError::InherentsAlreadyApplied),
			BuilderPhase::Initialized => {},
		}

		let mut inherents = Vec::new();
		for provider in &self.inherent_providers {
			let provided = provider.provide(&self.parent).await.map_err(|e| {
				BuildError::InherentProvider {
					provider: provider.identifier().to_string(),
					message: e.to_string(),
				}
			})?;
			inherents.extend(provided);
		}

		let context = self.context.as_mut().ok_or(BuildError::NotInitialized)?;
		for (index, inherent) in inherents.iter().enumerate() {
			if let Inherent::Timestamp(now) = inherent {
				context.timestamp = *now;
			}
			let events = self
				.runtime
				.apply_inherent(&mut self.state, context, inherent)
				.await
				.map_err(|fault| BuildError::RuntimeFault {
					call: inherent.identifier().to_string(),
					message: fault.to_string(),
				})?;
			let phase = Phase::Inherent(index as u32);
			self.events.extend(events.into_iter().map(|event| Event { phase: phase.clone(), ..event }));
		}

		self.phase = BuilderPhase::InherentsApplied;
		Ok(inherents.len())
	}

	/// Apply a user extrinsic to the block.
	///
	/// # Returns
	///
	/// - `ApplyExtrinsicResult::Success` if the extrinsic was applied
	/// - `ApplyExtrinsicResult::DispatchFailed` if dispatch failed
	///
	/// # Errors
	///
	/// Returns an error if:
	/// - The block has not been initialized
	/// - Inherents have not been applied yet
	/// - The runtime faults (not a dispatch failure)
	pub async fn apply_extrinsic(
		&mut self,
		extrinsic: Vec<u8>,
	) -> Result<ApplyExtrinsicResult, BuildError> {
		match self.phase {
			BuilderPhase::Created => return Err(BuildError::NotInitialized),
			BuilderPhase::Initialized => return Err(BuildError::InherentsNotApplied),
			BuilderPhase::InherentsApplied => {},
		}
		let context = self.context.as_ref().ok_or(BuildError::NotInitialized)?;
		let index = self.extrinsics.len() as u32;
		let hash = extrinsic_hash(&extrinsic);

		let mut scratch = self.state.snapshot();
		let outcome = self
			.runtime
			.apply_extrinsic(&mut scratch, context, &extrinsic)
			.await
			.map_err(|fault| BuildError::RuntimeFault {
				call: format!("extrinsic {hash:?}"),
				message: fault.to_string(),
			})?;

		let phase = Phase::ApplyExtrinsic(index);
		self.events
			.extend(outcome.events.into_iter().map(|event| Event { phase: phase.clone(), ..event }));
		self.extrinsics.push(extrinsic);
		self.records.push(ExtrinsicRecord { hash, index, result: outcome.result.clone() });

		match outcome.result {
			Ok(()) => {
				let storage_changes = scratch.changed_keys(&self.state);
				self.state = scratch;
				Ok(ApplyExtrinsicResult::Success { storage_changes })
			},
			Err(error) => {
				log::debug!("Extrinsic {hash:?} failed to dispatch: {error}");
				Ok(ApplyExtrinsicResult::DispatchFailed { error })
			},
		}
	}

	/// Finalize the block.
	///
	/// Scans the events for recognised outbound messages and numbers them per
	/// channel from `sequences`. Counters are only advanced once every message
	/// has been extracted.
	///
	/// # Errors
	///
	/// Returns an error if:
	/// - The block has not been initialized
	/// - Inherents have not been applied
	/// - A recognised event does not carry a valid message
	pub fn finalize(
		self,
		sequences: &mut HashMap<OutboundChannel, u64>,
	) -> Result<Block, BuildError> {
		match self.phase {
			BuilderPhase::Created => return Err(BuildError::NotInitialized),
			BuilderPhase::Initialized => return Err(BuildError::InherentsNotApplied),
			BuilderPhase::InherentsApplied => {},
		}
		let context = self.context.ok_or(BuildError::NotInitialized)?;

		let mut extracted = Vec::new();
		for event in &self.events {
			if let Some(kind) = self.tags.recognise(event) {
				extracted.push(extract_message(self.chain, kind, event)?);
			}
		}

		let mut outbound: BTreeMap<OutboundChannel, Vec<Message>> = BTreeMap::new();
		for (channel, kind, destination, payload) in extracted {
			let sequence = sequences.entry(channel).or_insert(0);
			*sequence += 1;
			outbound.entry(channel).or_default().push(Message {
				kind,
				origin: self.chain,
				destination,
				sequence: *sequence,
				payload,
				sent_at: context.number,
			});
		}

		let block = Block::child(
			&self.parent,
			context.timestamp,
			self.extrinsics,
			self.records,
			self.events,
			self.inbound,
			outbound,
			self.state,
		);
		log::debug!(
			"Built block #{} {:?} on {} ({} extrinsics, {} outbound)",
			block.number,
			block.hash,
			self.chain,
			block.extrinsics.len(),
			block.outbound_messages().count()
		);
		Ok(block)
	}
}

type Extracted = (OutboundChannel, MessageKind, Option<ChainId>, Vec<u8>);

/// Read the destination and payload of a recognised message event.
fn extract_message(
	origin: ChainId,
	kind: MessageKind,
	event: &Event,
) -> Result<Extracted, BuildError> {
	let malformed =
		|reason: &str| BuildError::Codec(format!("{}.{}: {reason}", event.section, event.method));

	let payload = event
		.data
		.get(fields::PAYLOAD)
		.and_then(|value| value.as_str())
		.ok_or_else(|| malformed("missing message payload"))?;
	let payload = hex::decode(payload.trim_start_matches("0x"))
		.map_err(|e| malformed(&format!("invalid payload: {e}")))?;

	let destination = || {
		event
			.data
			.get(fields::DESTINATION)
			.and_then(|value| value.as_u64())
			.and_then(|id| u32::try_from(id).ok())
			.ok_or_else(|| malformed("missing destination para id"))
	};

	match (kind, origin) {
		(MessageKind::Downward, ChainId::Relay) => {
			let para = destination()?;
			Ok((OutboundChannel::Downward(para), kind, Some(ChainId::Para(para)), payload))
		},
		(MessageKind::Upward, ChainId::Para(_)) =>
			Ok((OutboundChannel::Upward, kind, None, payload)),
		(MessageKind::Horizontal, ChainId::Para(from)) => {
			let para = destination()?;
			if para == from {
				return Err(malformed("horizontal message to self"));
			}
			Ok((OutboundChannel::Horizontal(para), kind, Some(ChainId::Para(para)), payload))
		},
		(kind, origin) => Err(malformed(&format!("{kind:?} message cannot originate on {origin}"))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		dev::{account_storage_key, free_balance},
		inherent::TimestampInherent,
		testing::{self, ALICE, BOB, InMemorySource, MockCall, MockRuntime, XCM_FEE, extrinsic},
	};
	use serde_json::json;

	async fn parent(source: InMemorySource, number: u32) -> Arc<Block> {
		let source = Arc::new(source);
		let hash = source.genesis_hash();
		let state = StateStore::new(testing::remote_layer(source).await, number);
		Arc::new(Block::fork_point(number, hash, Default::default(), 6_000, state))
	}

	async fn builder(chain: ChainId) -> BlockBuilder {
		let source = match chain {
			ChainId::Relay => InMemorySource::relay(),
			ChainId::Para(id) => InMemorySource::para(id),
		};
		let parent = parent(source, 10).await;
		let state = parent.state().snapshot();
		let providers: Vec<Box<dyn InherentProvider>> = vec![Box::new(TimestampInherent::new(6_000))];
		BlockBuilder::new(parent, state, Arc::new(MockRuntime::new(chain)), chain, providers)
	}

	async fn ready(chain: ChainId) -> BlockBuilder {
		let mut builder = builder(chain).await;
		builder.initialize().unwrap();
		builder.apply_inherents().await.unwrap();
		builder
	}

	#[tokio::test]
	async fn phases_are_enforced() {
		let mut builder = builder(ChainId::Relay).await;
		assert!(matches!(builder.apply_inherents().await, Err(BuildError::NotInitialized)));
		assert!(matches!(builder.apply_extrinsic(vec![]).await, Err(BuildError::NotInitialized)));

		builder.initialize().unwrap();
		assert!(matches!(builder.initialize(), Err(BuildError::AlreadyInitialized)));
		assert!(matches!(
			builder.apply_extrinsic(vec![]).await,
			Err(BuildError::InherentsNotApplied)
		));

		builder.apply_inherents().await.unwrap();
		assert!(matches!(builder.apply_inherents().await, Err(BuildError::InherentsAlreadyApplied)));
		assert_eq!(builder.phase(), BuilderPhase::InherentsApplied);
	}

	#[tokio::test]
	async fn finalize_before_inherents_fails() {
		let mut builder = builder(ChainId::Relay).await;
		builder.initialize().unwrap();
		assert!(matches!(
			builder.finalize(&mut HashMap::new()),
			Err(BuildError::InherentsNotApplied)
		));
	}

	#[tokio::test]
	async fn empty_block_advances_number_and_timestamp() {
		let builder = ready(ChainId::Relay).await;
		let block = builder.finalize(&mut HashMap::new()).unwrap();
		assert_eq!(block.number, 11);
		// Parent has `Timestamp::Now` set to the genesis timestamp.
		assert_eq!(block.timestamp, testing::GENESIS_TIMESTAMP + 6_000);
		assert!(block.extrinsics.is_empty());
		assert!(block.outbound.is_empty());
	}

	#[tokio::test]
	async fn successful_extrinsic_changes_state() {
		let mut builder = ready(ChainId::Relay).await;
		let result = builder
			.apply_extrinsic(extrinsic(ALICE, MockCall::Transfer { dest: BOB, amount: 100 }))
			.await
			.unwrap();
		assert_eq!(result, ApplyExtrinsicResult::Success { storage_changes: 2 });

		let block = builder.finalize(&mut HashMap::new()).unwrap();
		let bob = block.state().read(&account_storage_key(&BOB)).await.unwrap().unwrap();
		assert_eq!(free_balance(&bob), Some(100));
		assert!(block.events.iter().any(|e| e.is("Balances", "Transfer")));
		assert_eq!(block.records[0].result, Ok(()));
	}

	#[tokio::test]
	async fn dispatch_failure_keeps_events_but_not_state() {
		let mut builder = ready(ChainId::Relay).await;
		let before = builder.state.read(&account_storage_key(&ALICE)).await.unwrap();

		let result = builder.apply_extrinsic(extrinsic(ALICE, MockCall::Fail)).await.unwrap();
		assert!(matches!(result, ApplyExtrinsicResult::DispatchFailed { .. }));

		let block = builder.finalize(&mut HashMap::new()).unwrap();
		assert_eq!(block.state().read(&account_storage_key(&ALICE)).await.unwrap(), before);
		assert_eq!(block.extrinsics.len(), 1);
		assert!(block.records[0].result.is_err());
		assert!(
			block
				.events
				.iter()
				.any(|e| e.is("System", "ExtrinsicFailed") && e.phase == Phase::ApplyExtrinsic(0))
		);
	}

	#[tokio::test]
	async fn runtime_fault_aborts_build() {
		let mut builder = ready(ChainId::Relay).await;
		let result = builder.apply_extrinsic(extrinsic(ALICE, MockCall::Panic)).await;
		assert!(matches!(result, Err(BuildError::RuntimeFault { .. })));
	}

	#[tokio::test]
	async fn outbound_messages_are_numbered_per_channel() {
		let mut builder = ready(ChainId::Para(1000)).await;
		for amount in [10 * testing::UNIT, 20 * testing::UNIT] {
			builder
				.apply_extrinsic(extrinsic(
					ALICE,
					MockCall::ReserveTransfer { dest: ChainId::Para(2000), beneficiary: BOB, amount },
				))
				.await
				.unwrap();
		}
		builder
			.apply_extrinsic(extrinsic(
				ALICE,
				MockCall::ReserveTransfer { dest: ChainId::Relay, beneficiary: BOB, amount: 1 },
			))
			.await
			.unwrap();

		let mut sequences = HashMap::from([(OutboundChannel::Horizontal(2000), 5)]);
		let block = builder.finalize(&mut sequences).unwrap();

		let hrmp = &block.outbound[&OutboundChannel::Horizontal(2000)];
		assert_eq!(hrmp.iter().map(|m| m.sequence).collect::<Vec<_>>(), vec![6, 7]);
		assert!(hrmp.iter().all(|m| m.origin == ChainId::Para(1000) && m.sent_at == 11));
		assert_eq!(block.outbound[&OutboundChannel::Upward][0].sequence, 1);
		assert_eq!(sequences[&OutboundChannel::Horizontal(2000)], 7);
	}

	#[tokio::test]
	async fn inbound_messages_are_applied_and_recorded() {
		let mut inbound = BTreeMap::new();
		let payload = scale::Encode::encode(&testing::MockXcm { beneficiary: BOB, amount: XCM_FEE * 3 });
		inbound.insert(
			Channel::Downward,
			vec![Message {
				kind: MessageKind::Downward,
				origin: ChainId::Relay,
				destination: Some(ChainId::Para(1000)),
				sequence: 1,
				payload,
				sent_at: 3,
			}],
		);
		let mut builder = builder(ChainId::Para(1000)).await.with_inbound(inbound.clone());
		builder.initialize().unwrap();
		assert_eq!(builder.apply_inherents().await.unwrap(), 2);

		let block = builder.finalize(&mut HashMap::new()).unwrap();
		assert_eq!(block.inbound, inbound);
		let bob = block.state().read(&account_storage_key(&BOB)).await.unwrap().unwrap();
		assert_eq!(free_balance(&bob), Some(XCM_FEE * 2));
		assert!(block.events.iter().all(|e| matches!(e.phase, Phase::Inherent(1))));
	}

	#[test]
	fn malformed_message_events_are_rejected() {
		let event = Event::new("XcmpQueue", "XcmpMessageSent", json!({ "message": "0xzz" }));
		assert!(matches!(
			extract_message(ChainId::Para(1000), MessageKind::Horizontal, &event),
			Err(BuildError::Codec(_))
		));

		let upward = Event::new("ParachainSystem", "UpwardMessageSent", json!({ "message": "0x01" }));
		assert!(extract_message(ChainId::Relay, MessageKind::Upward, &upward).is_err());
		let (channel, _, destination, payload) =
			extract_message(ChainId::Para(1000), MessageKind::Upward, &upward).unwrap();
		assert_eq!(channel, OutboundChannel::Upward);
		assert_eq!(destination, None);
		assert_eq!(payload, vec![1]);
	}
}
