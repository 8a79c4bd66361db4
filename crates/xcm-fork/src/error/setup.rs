// SPDX-License-Identifier: GPL-3.0

//! Fork setup error types.

use crate::error::{CacheError, ConfigError, FetchError, RpcClientError};
use thiserror::Error;

/// Errors that can occur while creating a fork.
///
/// Setup fails fast: no partially-initialised fork is ever returned.
#[derive(Debug, Error)]
pub enum SetupError {
	/// No network with this name was registered.
	#[error("Network `{0}` is not registered")]
	UnknownNetwork(String),

	/// The network was configured without any endpoint.
	#[error("No endpoint configured for `{0}`")]
	NoEndpoints(String),

	/// None of the configured endpoints could be reached.
	#[error("No reachable endpoint for `{name}` (tried: {})", attempts.join("; "))]
	Unreachable {
		/// Network name.
		name: String,
		/// One entry per endpoint tried, with its failure.
		attempts: Vec<String>,
	},

	/// The configured fork block does not exist on the remote chain.
	#[error("Fork block {0} not found on the remote chain")]
	BlockNotFound(String),

	/// The runtime code could not be located.
	#[error("Runtime code not found: {0}")]
	RuntimeCodeNotFound(String),

	/// The runtime collaborator rejected the code.
	#[error("Runtime could not be created: {0}")]
	Runtime(String),

	/// The network was already created with different parameters.
	#[error("Network `{0}` already exists with different parameters")]
	ConflictingParams(String),

	/// The network was torn down and cannot be reused.
	#[error("Network `{0}` has been torn down")]
	TornDown(String),

	/// Remote transport error outside of a storage read.
	#[error(transparent)]
	Rpc(#[from] RpcClientError),

	/// Storage read error.
	#[error(transparent)]
	Fetch(#[from] FetchError),

	/// Cache creation error.
	#[error(transparent)]
	Cache(#[from] CacheError),

	/// Invalid configuration.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// IO error (e.g. reading a wasm override).
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}
