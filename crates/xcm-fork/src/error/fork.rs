// SPDX-License-Identifier: GPL-3.0

//! Error types for chain fork operations.

use crate::error::{BuildError, FetchError, RelayError, SchemaError, TxPoolError};
use thiserror::Error;

/// Errors that can occur when working with a [`ChainFork`](crate::ChainFork).
#[derive(Debug, Error)]
pub enum ForkError {
	/// Block building failed.
	#[error(transparent)]
	Build(#[from] BuildError),

	/// Storage read failed.
	#[error(transparent)]
	Fetch(#[from] FetchError),

	/// Storage injection could not be encoded.
	#[error(transparent)]
	Schema(#[from] SchemaError),

	/// Transaction pool error.
	#[error(transparent)]
	TxPool(#[from] TxPoolError),

	/// Inbound queue error.
	#[error(transparent)]
	Relay(#[from] RelayError),

	/// No committed block matches the reference.
	#[error("Block not found: {0}")]
	BlockNotFound(String),

	/// The fork has been torn down.
	#[error("Fork `{0}` has been torn down")]
	TornDown(String),
}
