// SPDX-License-Identifier: GPL-3.0

//! Named forks of a scenario.
//!
//! A [`NetworkRegistry`] is the explicit context a scenario passes around instead
//! of ambient global state. It creates each fork lazily on first use, hands the
//! same fork back to later callers with the same parameters, and tears everything
//! down on [`teardown_all`](NetworkRegistry::teardown_all) or when dropped.
//!
//! # Creation
//!
//! ```text
//! endpoints ──first reachable──► ChainSource
//!                                    │ fork block (hash, number or finalized head)
//!                                    ▼
//!              StorageCache ──► RemoteStorageLayer ──► chain kind, runtime code
//!                                                             │
//!                                          RuntimeFactory ◄───┘
//!                                                 │
//!                                                 ▼
//!                                             ChainFork
//! ```

use crate::{
	ChainFork, RemoteStorageLayer, RpcConnector, StorageCache,
	config::{ForkOptions, ForkParams, ForkPoint, NetworkProfile},
	error::SetupError,
	fork::{detect_chain, para_id_key},
	inherent::timestamp_now_key,
	runtime::{CodeSource, RuntimeCode, RuntimeFactory},
	storage::{ChainSource, Connector},
	strings::storage::CODE_KEY,
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use url::Url;

enum EntryState {
	Uninitialized,
	Ready(Arc<ChainFork>),
	/// Creation failed; the next request retries.
	Failed(String),
	TornDown,
}

struct Entry {
	params: ForkParams,
	state: EntryState,
}

/// Lifecycle of a registered network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkStatus {
	/// Registered, not created yet.
	Uninitialized,
	Ready,
	/// The last creation attempt failed with this message.
	Failed(String),
	TornDown,
}

/// Creates and owns the forks of one scenario.
pub struct NetworkRegistry {
	connector: Arc<dyn Connector>,
	factory: Arc<dyn RuntimeFactory>,
	entries: Mutex<HashMap<String, Entry>>,
}

impl std::fmt::Debug for NetworkRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NetworkRegistry").finish_non_exhaustive()
	}
}

impl NetworkRegistry {
	/// A registry connecting through `connector` and instantiating runtimes with
	/// `factory`.
	pub fn new(connector: Arc<dyn Connector>, factory: Arc<dyn RuntimeFactory>) -> Self {
		Self { connector, factory, entries: Mutex::new(HashMap::new()) }
	}

	/// A registry connecting to live chains over RPC.
	pub fn with_rpc(factory: Arc<dyn RuntimeFactory>) -> Self {
		Self::new(Arc::new(RpcConnector), factory)
	}

	/// Register `name` with `params` without creating the fork.
	///
	/// Re-registering with the same parameters is a no-op. Different parameters
	/// replace the registration unless the fork already exists.
	pub async fn register(&self, name: &str, params: ForkParams) -> Result<(), SetupError> {
		let mut entries = self.entries.lock().await;
		if let Some(entry) = entries.get(name) {
			match entry.state {
				_ if entry.params == params => return Ok(()),
				EntryState::Ready(_) => return Err(SetupError::ConflictingParams(name.to_string())),
				EntryState::TornDown => return Err(SetupError::TornDown(name.to_string())),
				EntryState::Uninitialized | EntryState::Failed(_) => {},
			}
		}
		entries.insert(name.to_string(), Entry { params, state: EntryState::Uninitialized });
		Ok(())
	}

	/// The fork registered as `name`, created on first use.
	pub async fn fork(&self, name: &str) -> Result<Arc<ChainFork>, SetupError> {
		let params = match self.entries.lock().await.get(name) {
			Some(entry) => entry.params.clone(),
			None => return Err(SetupError::UnknownNetwork(name.to_string())),
		};
		self.get(name, params).await
	}

	/// The fork `name` created with `params`.
	///
	/// Returns the existing fork if `name` was already created with equal
	/// parameters. A failed earlier attempt is retried.
	///
	/// # Errors
	///
	/// - [`SetupError::ConflictingParams`] if `name` exists with other parameters.
	/// - [`SetupError::TornDown`] if `name` was torn down.
	/// - Any creation failure. Nothing partially created is kept.
	pub async fn get(&self, name: &str, params: ForkParams) -> Result<Arc<ChainFork>, SetupError> {
		let mut entries = self.entries.lock().await;
		if let Some(entry) = entries.get(name) {
			match &entry.state {
				EntryState::TornDown => return Err(SetupError::TornDown(name.to_string())),
				EntryState::Ready(_) if entry.params != params =>
					return Err(SetupError::ConflictingParams(name.to_string())),
				EntryState::Ready(fork) => return Ok(fork.clone()),
				EntryState::Uninitialized | EntryState::Failed(_) => {},
			}
		}

		let result = self.create(name, &params).await;
		let state = match &result {
			Ok(fork) => EntryState::Ready(fork.clone()),
			Err(e) => {
				log::warn!("Could not create network {name}: {e}");
				EntryState::Failed(e.to_string())
			},
		};
		entries.insert(name.to_string(), Entry { params, state });
		result
	}

	/// The built-in network `profile`, with `options` layered over the environment
	/// and the profile's defaults.
	pub async fn get_profile(
		&self,
		profile: &NetworkProfile,
		options: &ForkOptions,
	) -> Result<Arc<ChainFork>, SetupError> {
		let params = profile.resolve(options)?;
		self.get(profile.name, params).await
	}

	/// Lifecycle state of `name`, if registered.
	pub async fn status(&self, name: &str) -> Option<NetworkStatus> {
		self.entries.lock().await.get(name).map(|entry| match &entry.state {
			EntryState::Uninitialized => NetworkStatus::Uninitialized,
			EntryState::Ready(_) => NetworkStatus::Ready,
			EntryState::Failed(message) => NetworkStatus::Failed(message.clone()),
			EntryState::TornDown => NetworkStatus::TornDown,
		})
	}

	/// Registered network names, sorted.
	pub async fn names(&self) -> Vec<String> {
		let mut names: Vec<String> = self.entries.lock().await.keys().cloned().collect();
		names.sort();
		names
	}

	/// Tear down the fork `name`. Returns whether it was registered.
	pub async fn teardown(&self, name: &str) -> bool {
		match self.entries.lock().await.get_mut(name) {
			Some(entry) => {
				Self::teardown_entry(name, entry);
				true
			},
			None => false,
		}
	}

	/// Tear down every registered fork, whatever state its creation reached.
	pub async fn teardown_all(&self) {
		let mut entries = self.entries.lock().await;
		for (name, entry) in entries.iter_mut() {
			Self::teardown_entry(name, entry);
		}
	}

	fn teardown_entry(name: &str, entry: &mut Entry) {
		if let EntryState::Ready(fork) = &entry.state {
			fork.teardown();
		}
		if !matches!(entry.state, EntryState::TornDown) {
			log::debug!("Network {name} torn down");
		}
		entry.state = EntryState::TornDown;
	}

	async fn create(&self, name: &str, params: &ForkParams) -> Result<Arc<ChainFork>, SetupError> {
		let source = self.connect(name, &params.endpoints).await?;

		let block_hash = match params.fork_point {
			ForkPoint::Hash(hash) => hash,
			ForkPoint::Number(number) => source
				.block_hash_at(number)
				.await?
				.ok_or_else(|| SetupError::BlockNotFound(number.to_string()))?,
			ForkPoint::Finalized => source.finalized_head().await?,
		};

		let cache = match &params.database {
			Some(path) => StorageCache::open(path).await?,
			None => StorageCache::in_memory().await?,
		};
		let remote = Arc::new(RemoteStorageLayer::new(source, cache, block_hash));

		// Every fork-point key setup reads, in one request.
		let mut setup_keys = vec![timestamp_now_key()];
		if params.para_id.is_none() {
			setup_keys.push(para_id_key());
		}
		if params.wasm_override.is_none() {
			setup_keys.push(CODE_KEY.to_vec());
		}
		let keys: Vec<&[u8]> = setup_keys.iter().map(Vec::as_slice).collect();
		let mut prefetched = remote.get_batch(&keys).await?;

		let chain = detect_chain(&remote, params.para_id).await?;
		let code = match &params.wasm_override {
			Some(path) => RuntimeCode {
				code: tokio::fs::read(path).await?,
				source: CodeSource::Override(path.clone()),
			},
			None => RuntimeCode {
				code: prefetched.pop().flatten().ok_or_else(|| {
					SetupError::RuntimeCodeNotFound(format!(":code at {block_hash:?}"))
				})?,
				source: CodeSource::OnChain,
			},
		};
		let runtime = self.factory.create(chain, code, params.runtime).map_err(SetupError::Runtime)?;

		ChainFork::builder(name, remote, runtime)
			.chain(chain)
			.channel_limits(params.channel_limits)
			.slot_duration_ms(params.slot_duration_ms)
			.build()
			.await
	}

	/// Connect to the first reachable endpoint, in order.
	async fn connect(
		&self,
		name: &str,
		endpoints: &[Url],
	) -> Result<Arc<dyn ChainSource>, SetupError> {
		if endpoints.is_empty() {
			return Err(SetupError::NoEndpoints(name.to_string()));
		}
		let mut attempts = Vec::with_capacity(endpoints.len());
		for endpoint in endpoints {
			match self.connector.connect(endpoint).await {
				Ok(source) => {
					log::debug!("Network {name} connected to {endpoint}");
					return Ok(source);
				},
				Err(e) => {
					log::warn!("Endpoint {endpoint} of {name} unreachable: {e}");
					attempts.push(format!("{endpoint}: {e}"));
				},
			}
		}
		Err(SetupError::Unreachable { name: name.to_string(), attempts })
	}
}

impl Drop for NetworkRegistry {
	fn drop(&mut self) {
		for (name, entry) in self.entries.get_mut().iter_mut() {
			Self::teardown_entry(name, entry);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		ChainId,
		runtime::RuntimeConfig,
		testing::{InMemorySource, MockConnector, MockRuntimeFactory},
	};

	fn unreachable() -> Url {
		Url::parse("ws://127.0.0.1:1").unwrap()
	}

	fn registry(sources: &[Arc<InMemorySource>]) -> (NetworkRegistry, Arc<MockRuntimeFactory>) {
		let connector =
			sources.iter().cloned().fold(MockConnector::new(), MockConnector::with_source);
		let factory = Arc::new(MockRuntimeFactory::new());
		(NetworkRegistry::new(Arc::new(connector), factory.clone()), factory)
	}

	#[tokio::test]
	async fn first_reachable_endpoint_wins() {
		let source = Arc::new(InMemorySource::para(2000));
		let (registry, factory) = registry(&[source.clone()]);
		let mut params = ForkParams::new(unreachable());
		params.endpoints.push(source.endpoint().clone());
		params.runtime = RuntimeConfig { mock_signature_host: true, log_level: 5 };

		let fork = registry.get("asset_hub", params).await.unwrap();

		assert_eq!(fork.chain(), ChainId::Para(2000));
		assert_eq!(fork.fork_point().hash, source.genesis_hash());
		assert_eq!(factory.created(), vec![(ChainId::Para(2000), RuntimeConfig {
			mock_signature_host: true,
			log_level: 5
		})]);
		assert_eq!(registry.status("asset_hub").await, Some(NetworkStatus::Ready));
	}

	#[tokio::test]
	async fn setup_reads_the_fork_point_in_one_request() {
		let source = Arc::new(InMemorySource::para(2000));
		let (registry, _) = registry(&[source.clone()]);

		let params = ForkParams::new(source.endpoint().clone());
		let fork = registry.get("asset_hub", params).await.unwrap();

		assert_eq!(fork.chain(), ChainId::Para(2000));
		assert_eq!(fork.fork_point().timestamp, crate::testing::GENESIS_TIMESTAMP);
		assert_eq!(source.storage_requests(), 1);
	}

	#[tokio::test]
	async fn get_is_idempotent_for_equal_params() {
		let source = Arc::new(InMemorySource::relay());
		let (registry, factory) = registry(&[source.clone()]);
		let params = ForkParams::new(source.endpoint().clone());

		let a = registry.get("polkadot", params.clone()).await.unwrap();
		let b = registry.get("polkadot", params.clone()).await.unwrap();
		assert!(Arc::ptr_eq(&a, &b));
		assert_eq!(factory.created().len(), 1);

		let mut other = params;
		other.para_id = Some(7);
		assert!(matches!(
			registry.get("polkadot", other).await,
			Err(SetupError::ConflictingParams(_))
		));
	}

	#[tokio::test]
	async fn unreachable_endpoints_fail_setup() {
		let (registry, _) = registry(&[]);
		let mut params = ForkParams::new(unreachable());
		params.endpoints.push(Url::parse("ws://127.0.0.1:2").unwrap());

		match registry.get("polkadot", params).await {
			Err(SetupError::Unreachable { name, attempts }) => {
				assert_eq!(name, "polkadot");
				assert_eq!(attempts.len(), 2);
			},
			other => panic!("expected Unreachable, got {other:?}"),
		}
		assert!(matches!(registry.status("polkadot").await, Some(NetworkStatus::Failed(_))));

		let mut empty = ForkParams::new(unreachable());
		empty.endpoints.clear();
		assert!(matches!(registry.get("none", empty).await, Err(SetupError::NoEndpoints(_))));
	}

	#[tokio::test]
	async fn fork_block_must_exist() {
		let source = Arc::new(InMemorySource::relay());
		let (registry, _) = registry(&[source.clone()]);
		let mut params = ForkParams::new(source.endpoint().clone());
		params.fork_point = ForkPoint::Number(source.number() + 1);

		assert!(matches!(registry.get("polkadot", params).await, Err(SetupError::BlockNotFound(_))));
	}

	#[tokio::test]
	async fn missing_runtime_code_fails_setup() {
		let source = Arc::new(InMemorySource::new("bare"));
		let (registry, _) = registry(&[source.clone()]);
		let params = ForkParams::new(source.endpoint().clone());

		assert!(matches!(
			registry.get("bare", params).await,
			Err(SetupError::RuntimeCodeNotFound(_))
		));
	}

	#[tokio::test]
	async fn wasm_override_replaces_on_chain_code() {
		let source = Arc::new(InMemorySource::new("bare"));
		let (registry, _) = registry(&[source.clone()]);
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("runtime.wasm");
		std::fs::write(&path, b"override").unwrap();
		let mut params = ForkParams::new(source.endpoint().clone());
		params.wasm_override = Some(path);

		assert!(registry.get("bare", params).await.is_ok());
	}

	#[tokio::test]
	async fn file_database_is_used_when_configured() {
		let source = Arc::new(InMemorySource::relay());
		let (registry, _) = registry(&[source.clone()]);
		let dir = tempfile::tempdir().unwrap();
		let mut params = ForkParams::new(source.endpoint().clone());
		params.database = Some(dir.path().join("nested").join("relay-db.sqlite"));

		registry.get("relay", params).await.unwrap();
		assert!(dir.path().join("nested").join("relay-db.sqlite").exists());
	}

	#[tokio::test]
	async fn registered_forks_are_created_lazily() {
		let source = Arc::new(InMemorySource::relay());
		let (registry, factory) = registry(&[source.clone()]);
		registry.register("polkadot", ForkParams::new(source.endpoint().clone())).await.unwrap();
		assert_eq!(registry.status("polkadot").await, Some(NetworkStatus::Uninitialized));
		assert!(factory.created().is_empty());

		registry.fork("polkadot").await.unwrap();
		assert_eq!(factory.created().len(), 1);
		assert!(matches!(registry.fork("kusama").await, Err(SetupError::UnknownNetwork(_))));
		assert_eq!(registry.names().await, vec!["polkadot".to_string()]);
	}

	#[tokio::test]
	async fn teardown_all_survives_failed_setup() {
		let source = Arc::new(InMemorySource::relay());
		let (registry, _) = registry(&[source.clone()]);
		let fork = registry.get("relay", ForkParams::new(source.endpoint().clone())).await.unwrap();
		let _ = registry.get("broken", ForkParams::new(unreachable())).await;

		registry.teardown_all().await;

		assert!(fork.is_torn_down());
		assert_eq!(registry.status("broken").await, Some(NetworkStatus::TornDown));
		assert!(matches!(
			registry.get("relay", ForkParams::new(source.endpoint().clone())).await,
			Err(SetupError::TornDown(_))
		));
	}

	#[tokio::test]
	async fn drop_tears_down_forks() {
		let source = Arc::new(InMemorySource::relay());
		let (registry, _) = registry(&[source.clone()]);
		let fork = registry.get("relay", ForkParams::new(source.endpoint().clone())).await.unwrap();

		drop(registry);

		assert!(fork.is_torn_down());
	}
}
