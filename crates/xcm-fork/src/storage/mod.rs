// SPDX-License-Identifier: GPL-3.0

//! Remote chain source traits.
//!
//! [`ChainSource`] is the base-snapshot fetch collaborator: given a key and a block
//! it answers with the stored bytes or their absence. [`Connector`] turns an endpoint
//! into a connected source. The live implementations are
//! [`ForkRpcClient`](crate::ForkRpcClient) and [`RpcConnector`](crate::RpcConnector);
//! tests use the in-memory ones from [`testing`](crate::testing).

use crate::error::RpcClientError;
use async_trait::async_trait;
use scale::{Compact, Decode};
use std::sync::Arc;
use subxt::config::substrate::H256;
use url::Url;

/// The parts of a remote block header the fork needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHeader {
	/// Block number.
	pub number: u32,
	/// Parent block hash.
	pub parent_hash: H256,
	/// State root.
	pub state_root: H256,
	/// SCALE-encoded header, as returned by the chain.
	pub encoded: Vec<u8>,
}

impl RemoteHeader {
	/// Decode the leading fields of a SCALE-encoded Substrate header.
	pub fn from_encoded(encoded: Vec<u8>) -> Result<Self, scale::Error> {
		let mut input = &encoded[..];
		let parent_hash = <[u8; 32]>::decode(&mut input)?;
		let Compact(number) = Compact::<u32>::decode(&mut input)?;
		let state_root = <[u8; 32]>::decode(&mut input)?;
		Ok(Self {
			number,
			parent_hash: H256::from(parent_hash),
			state_root: H256::from(state_root),
			encoded,
		})
	}
}

/// Read access to a remote chain's state.
#[async_trait]
pub trait ChainSource: Send + Sync + std::fmt::Debug {
	/// The endpoint this source is connected to.
	fn endpoint(&self) -> &Url;

	/// Latest finalized block hash.
	async fn finalized_head(&self) -> Result<H256, RpcClientError>;

	/// Hash of the block at `number`, if the chain has one.
	async fn block_hash_at(&self, number: u32) -> Result<Option<H256>, RpcClientError>;

	/// Header of the block with `hash`.
	async fn header(&self, hash: H256) -> Result<RemoteHeader, RpcClientError>;

	/// A single storage value at `at`. `Ok(None)` means the key holds nothing.
	async fn storage(&self, key: &[u8], at: H256) -> Result<Option<Vec<u8>>, RpcClientError>;

	/// Several storage values at `at`, in the order of `keys`.
	async fn storage_batch(
		&self,
		keys: &[&[u8]],
		at: H256,
	) -> Result<Vec<Option<Vec<u8>>>, RpcClientError>;
}

/// Opens a [`ChainSource`] for an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
	/// Connect to `endpoint`.
	async fn connect(&self, endpoint: &Url) -> Result<Arc<dyn ChainSource>, RpcClientError>;
}
