// SPDX-License-Identifier: GPL-3.0

//! RPC client wrapper for connecting to live Polkadot-SDK chains.
//!
//! Wraps subxt's [`LegacyRpcMethods`] and exposes only what a fork needs: the
//! finalized head, block hashes and headers, and storage reads at a block.
//!
//! Legacy RPCs (`state_*`, `chain_*`) are used rather than `chainHead_v1_*` because
//! they are served by every node and follow a plain request/response pattern, which
//! is all that querying a fixed historical block requires.

use crate::{
	error::rpc::RpcClientError,
	storage::{ChainSource, Connector, RemoteHeader},
	strings::rpc::methods,
};
use async_trait::async_trait;
use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};
use subxt::{
	SubstrateConfig,
	backend::{legacy::LegacyRpcMethods, rpc::RpcClient},
	config::substrate::H256,
	ext::codec::Encode,
};
use url::Url;

/// Upper bound for a single request, including connection establishment.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// RPC client wrapper for fork operations.
///
/// # Example
///
/// ```ignore
/// use xcm_fork::ForkRpcClient;
///
/// let client = ForkRpcClient::connect(&"wss://rpc.ibp.network/polkadot".parse()?).await?;
/// let block_hash = client.finalized_head().await?;
/// let storage_value = client.storage(&key, block_hash).await?;
/// ```
#[derive(Clone, Debug)]
pub struct ForkRpcClient {
	legacy: LegacyRpcMethods<SubstrateConfig>,
	endpoint: Url,
}

impl ForkRpcClient {
	/// Connect to a live Polkadot-SDK chain.
	///
	/// # Arguments
	/// * `endpoint` - WebSocket URL of the chain's RPC endpoint.
	pub async fn connect(endpoint: &Url) -> Result<Self, RpcClientError> {
		let client = tokio::time::timeout(REQUEST_TIMEOUT, RpcClient::from_url(endpoint.as_str()))
			.await
			.map_err(|_| RpcClientError::ConnectionFailed {
				endpoint: endpoint.to_string(),
				message: "timed out".to_string(),
			})?
			.map_err(|e| RpcClientError::ConnectionFailed {
				endpoint: endpoint.to_string(),
				message: e.to_string(),
			})?;

		let legacy = LegacyRpcMethods::new(client);

		Ok(Self { legacy, endpoint: endpoint.clone() })
	}

	/// Get the endpoint URL this client is connected to.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Get the latest finalized block hash.
	pub async fn finalized_head(&self) -> Result<H256, RpcClientError> {
		request(methods::CHAIN_GET_FINALIZED_HEAD, self.legacy.chain_get_finalized_head()).await
	}

	/// Get the hash of the block at `number`.
	///
	/// Returns `Ok(None)` when the chain has no block at that height yet.
	pub async fn block_hash_at(&self, number: u32) -> Result<Option<H256>, RpcClientError> {
		request(methods::CHAIN_GET_BLOCK_HASH, self.legacy.chain_get_block_hash(Some(number.into())))
			.await
	}

	/// Get block header by hash.
	pub async fn header(&self, hash: H256) -> Result<RemoteHeader, RpcClientError> {
		let header = request(methods::CHAIN_GET_HEADER, self.legacy.chain_get_header(Some(hash)))
			.await?
			.ok_or_else(|| {
				RpcClientError::InvalidResponse(format!("No header found for {hash:?}"))
			})?;

		Ok(RemoteHeader {
			number: header.number,
			parent_hash: header.parent_hash,
			state_root: header.state_root,
			encoded: header.encode(),
		})
	}

	/// Get a single storage value at a specific block.
	///
	/// # Returns
	/// * `Ok(Some(value))` - Storage exists with value
	/// * `Ok(None)` - Storage key doesn't exist (empty)
	/// * `Err(_)` - RPC error
	pub async fn storage(&self, key: &[u8], at: H256) -> Result<Option<Vec<u8>>, RpcClientError> {
		request(methods::STATE_GET_STORAGE, self.legacy.state_get_storage(key, Some(at))).await
	}

	/// Get multiple storage values in a single batch request.
	///
	/// Returns a vector of optional values, in the same order as the input keys.
	pub async fn storage_batch(
		&self,
		keys: &[&[u8]],
		at: H256,
	) -> Result<Vec<Option<Vec<u8>>>, RpcClientError> {
		if keys.is_empty() {
			return Ok(vec![]);
		}

		let result = request(
			methods::STATE_QUERY_STORAGE_AT,
			self.legacy.state_query_storage_at(keys.iter().copied(), Some(at)),
		)
		.await?;

		let mut changes: HashMap<Vec<u8>, Option<Vec<u8>>> = result
			.into_iter()
			.flat_map(|change_set| {
				change_set.changes.into_iter().map(|(k, v)| (k.0.to_vec(), v.map(|v| v.0.to_vec())))
			})
			.collect();

		// Duplicate keys only get their value on the first occurrence.
		Ok(keys.iter().map(|key| changes.remove(*key).flatten()).collect())
	}
}

/// Run one request with [`REQUEST_TIMEOUT`] and map its failure.
async fn request<T, E: std::fmt::Display>(
	method: &'static str,
	fut: impl Future<Output = Result<T, E>>,
) -> Result<T, RpcClientError> {
	tokio::time::timeout(REQUEST_TIMEOUT, fut)
		.await
		.map_err(|_| RpcClientError::Timeout { method })?
		.map_err(|e| RpcClientError::RequestFailed { method, message: e.to_string() })
}

#[async_trait]
impl ChainSource for ForkRpcClient {
	fn endpoint(&self) -> &Url {
		ForkRpcClient::endpoint(self)
	}

	async fn finalized_head(&self) -> Result<H256, RpcClientError> {
		ForkRpcClient::finalized_head(self).await
	}

	async fn block_hash_at(&self, number: u32) -> Result<Option<H256>, RpcClientError> {
		ForkRpcClient::block_hash_at(self, number).await
	}

	async fn header(&self, hash: H256) -> Result<RemoteHeader, RpcClientError> {
		ForkRpcClient::header(self, hash).await
	}

	async fn storage(&self, key: &[u8], at: H256) -> Result<Option<Vec<u8>>, RpcClientError> {
		ForkRpcClient::storage(self, key, at).await
	}

	async fn storage_batch(
		&self,
		keys: &[&[u8]],
		at: H256,
	) -> Result<Vec<Option<Vec<u8>>>, RpcClientError> {
		ForkRpcClient::storage_batch(self, keys, at).await
	}
}

/// [`Connector`] that opens a [`ForkRpcClient`] per endpoint.
#[derive(Clone, Copy, Debug, Default)]
pub struct RpcConnector;

#[async_trait]
impl Connector for RpcConnector {
	async fn connect(&self, endpoint: &Url) -> Result<Arc<dyn ChainSource>, RpcClientError> {
		Ok(Arc::new(ForkRpcClient::connect(endpoint).await?))
	}
}
