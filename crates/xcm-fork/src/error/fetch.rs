// SPDX-License-Identifier: GPL-3.0

//! Base-snapshot fetch error types.

use crate::error::{CacheError, RpcClientError};
use thiserror::Error;

/// Errors that can occur when reading through to the forked chain's base snapshot.
///
/// Fetches are attempted once. Fork data is expected to be stable, so a failure is
/// surfaced to the caller instead of being retried.
#[derive(Debug, Error)]
pub enum FetchError {
	/// The remote source failed to answer.
	#[error("RPC error: {0}")]
	Rpc(#[from] RpcClientError),
	/// The durable cache failed.
	#[error("Cache error: {0}")]
	Cache(#[from] CacheError),
	/// The remote source was released by a teardown.
	#[error("Remote source for block {block} has been closed")]
	Closed {
		/// Hex-encoded hash of the fork block.
		block: String,
	},
}
