// SPDX-License-Identifier: GPL-3.0

//! Shared testing utilities.
//!
//! An in-memory [`ChainSource`] standing in for a live endpoint, a [`Connector`]
//! over a set of such sources, and a small deterministic runtime that moves
//! balances and sends reserve transfers as cross-chain messages.

use crate::{
	Block, ChainFork, ChainId, RemoteStorageLayer, StateStore, StorageCache,
	dev::{AccountInfo, account_storage_key, build_account_info},
	error::RpcClientError,
	inherent::timestamp_now_key,
	message::{Channel, Message},
	runtime::{
		ApplyOutcome, BlockContext, Event, Inherent, Runtime, RuntimeCode, RuntimeConfig,
		RuntimeFactory, RuntimeFault,
	},
	storage::{ChainSource, Connector, RemoteHeader},
	strings::{
		relay::{fields, tags},
		storage::CODE_KEY,
	},
};
use async_trait::async_trait;
use scale::{Compact, Decode, Encode};
use serde_json::json;
use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
};
use subxt::config::substrate::H256;
use url::Url;

pub use crate::{
	dev::{ALICE, BOB, CHARLIE},
	fork::para_id_key,
};

/// Runtime code stored under `:code` by the prepared sources.
pub const MOCK_CODE: &[u8] = b"mock-runtime";

/// `Timestamp::Now` at the fork point of the prepared sources.
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000_000;

/// One unit of the native token.
pub const UNIT: u128 = 10_000_000_000;

/// Free balance of Alice on the prepared sources.
pub const INITIAL_BALANCE: u128 = 1_000 * UNIT;

/// Fee deducted from every processed inbound transfer.
pub const XCM_FEE: u128 = UNIT / 10;

/// A chain held in memory, answering like a remote node at a single block.
#[derive(Debug)]
pub struct InMemorySource {
	endpoint: Url,
	header: RemoteHeader,
	hash: H256,
	storage: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
	storage_requests: AtomicUsize,
	fail_storage: AtomicBool,
}

impl InMemorySource {
	/// An empty chain named `name` at block 0.
	pub fn new(name: &str) -> Self {
		Self::at_block(name, 0)
	}

	/// An empty chain named `name` at block `number`.
	pub fn at_block(name: &str, number: u32) -> Self {
		let parent_hash = [0u8; 32];
		let state_root = sp_core::blake2_256(name.as_bytes());
		let encoded =
			(parent_hash, Compact(number), state_root, [0u8; 32], Vec::<u8>::new()).encode();
		let hash = H256::from(sp_core::blake2_256(&encoded));
		let header = RemoteHeader {
			number,
			parent_hash: H256::from(parent_hash),
			state_root: H256::from(state_root),
			encoded,
		};
		let endpoint = Url::parse(&format!("mem://{name}")).expect("valid in-memory endpoint");
		Self {
			endpoint,
			header,
			hash,
			storage: Mutex::new(HashMap::new()),
			storage_requests: AtomicUsize::new(0),
			fail_storage: AtomicBool::new(false),
		}
	}

	/// A relay chain with runtime code, a timestamp and a funded Alice.
	pub fn relay() -> Self {
		Self::new("relay").prepared()
	}

	/// A parachain with `para_id`, runtime code, a timestamp and a funded Alice.
	pub fn para(para_id: u32) -> Self {
		let source = Self::new(&format!("para-{para_id}")).prepared();
		source.insert(para_id_key(), para_id.encode());
		source
	}

	fn prepared(self) -> Self {
		self.insert(CODE_KEY.to_vec(), MOCK_CODE.to_vec());
		self.insert(timestamp_now_key(), GENESIS_TIMESTAMP.encode());
		self.insert(account_storage_key(&ALICE), build_account_info(INITIAL_BALANCE));
		self
	}

	/// Hash of the block this source serves.
	pub fn genesis_hash(&self) -> H256 {
		self.hash
	}

	/// Number of the block this source serves.
	pub fn number(&self) -> u32 {
		self.header.number
	}

	/// Set a storage value.
	pub fn insert(&self, key: Vec<u8>, value: Vec<u8>) {
		self.storage.lock().expect("storage lock").insert(key, value);
	}

	/// Number of storage requests served or refused so far.
	pub fn storage_requests(&self) -> usize {
		self.storage_requests.load(Ordering::SeqCst)
	}

	/// Make storage requests fail like a dropped connection.
	pub fn fail_storage(&self, fail: bool) {
		self.fail_storage.store(fail, Ordering::SeqCst);
	}

	fn check_storage(&self, method: &'static str) -> Result<(), RpcClientError> {
		self.storage_requests.fetch_add(1, Ordering::SeqCst);
		if self.fail_storage.load(Ordering::SeqCst) {
			return Err(RpcClientError::RequestFailed {
				method,
				message: "connection reset".to_string(),
			});
		}
		Ok(())
	}
}

#[async_trait]
impl ChainSource for InMemorySource {
	fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	async fn finalized_head(&self) -> Result<H256, RpcClientError> {
		Ok(self.hash)
	}

	async fn block_hash_at(&self, number: u32) -> Result<Option<H256>, RpcClientError> {
		Ok((number == self.header.number).then_some(self.hash))
	}

	async fn header(&self, hash: H256) -> Result<RemoteHeader, RpcClientError> {
		if hash != self.hash {
			return Err(RpcClientError::InvalidResponse(format!("unknown block {hash:?}")));
		}
		Ok(self.header.clone())
	}

	async fn storage(&self, key: &[u8], _at: H256) -> Result<Option<Vec<u8>>, RpcClientError> {
		self.check_storage("state_getStorage")?;
		Ok(self.storage.lock().expect("storage lock").get(key).cloned())
	}

	async fn storage_batch(
		&self,
		keys: &[&[u8]],
		_at: H256,
	) -> Result<Vec<Option<Vec<u8>>>, RpcClientError> {
		self.check_storage("state_queryStorageAt")?;
		let storage = self.storage.lock().expect("storage lock");
		Ok(keys.iter().map(|key| storage.get(*key).cloned()).collect())
	}
}

/// Connects to registered [`InMemorySource`]s by endpoint; everything else is
/// unreachable.
#[derive(Debug, Default)]
pub struct MockConnector {
	sources: HashMap<Url, Arc<InMemorySource>>,
	attempts: Mutex<Vec<Url>>,
}

impl MockConnector {
	pub fn new() -> Self {
		Self::default()
	}

	/// Make `source` reachable at its endpoint.
	pub fn with_source(mut self, source: Arc<InMemorySource>) -> Self {
		self.sources.insert(source.endpoint().clone(), source);
		self
	}

	/// Every endpoint a connection was attempted to, in order.
	pub fn attempts(&self) -> Vec<Url> {
		self.attempts.lock().expect("attempts lock").clone()
	}
}

#[async_trait]
impl Connector for MockConnector {
	async fn connect(&self, endpoint: &Url) -> Result<Arc<dyn ChainSource>, RpcClientError> {
		self.attempts.lock().expect("attempts lock").push(endpoint.clone());
		match self.sources.get(endpoint) {
			Some(source) => Ok(source.clone()),
			None => Err(RpcClientError::ConnectionFailed {
				endpoint: endpoint.to_string(),
				message: "connection refused".to_string(),
			}),
		}
	}
}

/// A call understood by [`MockRuntime`].
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum MockCall {
	/// Move `amount` to `dest` on the same chain.
	Transfer { dest: [u8; 32], amount: u128 },
	/// Burn `amount` here and send it to `beneficiary` on `dest`.
	ReserveTransfer { dest: ChainId, beneficiary: [u8; 32], amount: u128 },
	/// Emit an event, change nothing else.
	Remark(Vec<u8>),
	/// Bump the nonce, then fail dispatch.
	Fail,
	/// Trap.
	Panic,
}

/// A signed [`MockCall`]. Signatures are not checked.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct MockExtrinsic {
	pub signer: [u8; 32],
	pub call: MockCall,
}

/// Encode `call` signed by `signer`.
pub fn extrinsic(signer: [u8; 32], call: MockCall) -> Vec<u8> {
	MockExtrinsic { signer, call }.encode()
}

/// Payload of the messages [`MockRuntime`] sends and understands.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct MockXcm {
	pub beneficiary: [u8; 32],
	pub amount: u128,
}

fn hex0x(bytes: &[u8]) -> String {
	format!("0x{}", hex::encode(bytes))
}

/// Deterministic runtime for tests.
#[derive(Debug, Clone)]
pub struct MockRuntime {
	chain: ChainId,
	identifier: String,
}

impl MockRuntime {
	pub fn new(chain: ChainId) -> Self {
		Self { chain, identifier: format!("mock-{chain}") }
	}

	async fn account(state: &StateStore, who: &[u8; 32]) -> Result<AccountInfo, RuntimeFault> {
		let raw = state
			.read(&account_storage_key(who))
			.await
			.map_err(|e| RuntimeFault(format!("storage read failed: {e}")))?;
		Ok(raw
			.and_then(|raw| AccountInfo::decode(&mut raw.as_slice()).ok())
			.unwrap_or_default())
	}

	fn store_account(state: &mut StateStore, who: &[u8; 32], info: &AccountInfo) {
		state.write(account_storage_key(who), Some(info.encode()));
	}

	async fn credit(state: &mut StateStore, who: &[u8; 32], amount: u128) -> Result<(), RuntimeFault> {
		let mut info = Self::account(state, who).await?;
		if info.providers == 0 {
			info.providers = 1;
		}
		info.data.free = info.data.free.saturating_add(amount);
		Self::store_account(state, who, &info);
		Ok(())
	}

	fn failed(events: Vec<Event>, error: &str) -> ApplyOutcome {
		let mut events = events;
		events.push(Event::new("System", "ExtrinsicFailed", json!({ "error": error })));
		ApplyOutcome { events, result: Err(error.to_string()) }
	}

	fn message_sent(&self, dest: ChainId, payload: &[u8]) -> Option<Event> {
		let message = hex0x(payload);
		match (self.chain, dest) {
			(ChainId::Relay, ChainId::Para(para)) => Some(Event::new(
				tags::DOWNWARD.0,
				tags::DOWNWARD.1,
				json!({ (fields::DESTINATION): para, (fields::PAYLOAD): message }),
			)),
			(ChainId::Para(_), ChainId::Relay) =>
				Some(Event::new(tags::UPWARD.0, tags::UPWARD.1, json!({ (fields::PAYLOAD): message }))),
			(ChainId::Para(from), ChainId::Para(to)) if from != to => Some(Event::new(
				tags::HORIZONTAL.0,
				tags::HORIZONTAL.1,
				json!({ (fields::DESTINATION): to, (fields::PAYLOAD): message }),
			)),
			_ => None,
		}
	}

	async fn process_inbound(
		state: &mut StateStore,
		channel: &Channel,
		messages: &[Message],
	) -> Result<Vec<Event>, RuntimeFault> {
		let mut events = Vec::new();
		for message in messages {
			let success = match MockXcm::decode(&mut message.payload.as_slice()) {
				Ok(xcm) => {
					let amount = xcm.amount.saturating_sub(XCM_FEE);
					Self::credit(state, &xcm.beneficiary, amount).await?;
					events.push(Event::new(
						"Balances",
						"Minted",
						json!({ "who": hex0x(&xcm.beneficiary), "amount": amount.to_string() }),
					));
					true
				},
				Err(_) => false,
			};
			events.push(Event::new(
				"MessageQueue",
				"Processed",
				json!({
					"origin": channel.to_string(),
					"sequence": message.sequence,
					"success": success,
				}),
			));
		}
		Ok(events)
	}
}

#[async_trait]
impl Runtime for MockRuntime {
	fn identifier(&self) -> &str {
		&self.identifier
	}

	async fn apply_inherent(
		&self,
		state: &mut StateStore,
		_context: &BlockContext,
		inherent: &Inherent,
	) -> Result<Vec<Event>, RuntimeFault> {
		match inherent {
			Inherent::Timestamp(now) => {
				state.write(timestamp_now_key(), Some(now.encode()));
				Ok(vec![])
			},
			Inherent::InboundMessages { channel, messages } =>
				Self::process_inbound(state, channel, messages).await,
		}
	}

	async fn apply_extrinsic(
		&self,
		state: &mut StateStore,
		_context: &BlockContext,
		extrinsic: &[u8],
	) -> Result<ApplyOutcome, RuntimeFault> {
		let Ok(MockExtrinsic { signer, call }) = MockExtrinsic::decode(&mut &extrinsic[..]) else {
			return Ok(Self::failed(vec![], "CannotDecode"));
		};

		let mut sender = Self::account(state, &signer).await?;
		sender.nonce += 1;
		Self::store_account(state, &signer, &sender);

		let mut events = Vec::new();
		match call {
			MockCall::Transfer { dest, amount } => {
				if sender.data.free < amount {
					return Ok(Self::failed(events, "InsufficientBalance"));
				}
				sender.data.free -= amount;
				Self::store_account(state, &signer, &sender);
				Self::credit(state, &dest, amount).await?;
				events.push(Event::new(
					"Balances",
					"Transfer",
					json!({ "from": hex0x(&signer), "to": hex0x(&dest), "amount": amount.to_string() }),
				));
			},
			MockCall::ReserveTransfer { dest, beneficiary, amount } => {
				if sender.data.free < amount {
					return Ok(Self::failed(events, "InsufficientBalance"));
				}
				let payload = MockXcm { beneficiary, amount }.encode();
				let Some(sent) = self.message_sent(dest, &payload) else {
					return Ok(Self::failed(events, "Unroutable"));
				};
				sender.data.free -= amount;
				Self::store_account(state, &signer, &sender);
				events.push(Event::new("PolkadotXcm", "Attempted", json!({ "outcome": "Complete" })));
				events.push(sent);
			},
			MockCall::Remark(remark) => {
				events.push(Event::new(
					"System",
					"Remarked",
					json!({ "sender": hex0x(&signer), "hash": hex0x(&sp_core::blake2_256(&remark)) }),
				));
			},
			MockCall::Fail => return Ok(Self::failed(events, "Other")),
			MockCall::Panic => return Err(RuntimeFault("wasm trap: unreachable".to_string())),
		}
		events.push(Event::new("System", "ExtrinsicSuccess", json!({})));
		Ok(ApplyOutcome { events, result: Ok(()) })
	}
}

/// Creates [`MockRuntime`]s from [`MOCK_CODE`].
#[derive(Debug, Default)]
pub struct MockRuntimeFactory {
	created: Mutex<Vec<(ChainId, RuntimeConfig)>>,
}

impl MockRuntimeFactory {
	pub fn new() -> Self {
		Self::default()
	}

	/// Every runtime created so far.
	pub fn created(&self) -> Vec<(ChainId, RuntimeConfig)> {
		self.created.lock().expect("created lock").clone()
	}
}

impl RuntimeFactory for MockRuntimeFactory {
	fn create(
		&self,
		chain: ChainId,
		code: RuntimeCode,
		config: RuntimeConfig,
	) -> Result<Arc<dyn Runtime>, String> {
		if code.code.is_empty() {
			return Err("empty runtime code".to_string());
		}
		self.created.lock().expect("created lock").push((chain, config));
		Ok(Arc::new(MockRuntime::new(chain)))
	}
}

/// Remote layer over `source` with an in-memory cache.
pub async fn remote_layer(source: Arc<InMemorySource>) -> Arc<RemoteStorageLayer> {
	let cache = StorageCache::in_memory().await.expect("in-memory cache");
	let hash = source.genesis_hash();
	Arc::new(RemoteStorageLayer::new(source, cache, hash))
}

/// Fork point of an empty relay chain at block 0.
pub async fn fork_point_block() -> Block {
	let source = Arc::new(InMemorySource::new("relay"));
	let hash = source.genesis_hash();
	let state = StateStore::new(remote_layer(source).await, 0);
	Block::fork_point(0, hash, H256::zero(), 0, state)
}

/// A fork of `source` running [`MockRuntime`].
pub async fn mock_fork(source: Arc<InMemorySource>) -> Arc<ChainFork> {
	let name = source.endpoint().host_str().unwrap_or("chain").to_string();
	let remote = remote_layer(source).await;
	let chain = crate::fork::detect_chain(&remote, None).await.expect("chain detection");
	ChainFork::builder(&name, remote, Arc::new(MockRuntime::new(chain)))
		.chain(chain)
		.build()
		.await
		.expect("mock fork")
}
