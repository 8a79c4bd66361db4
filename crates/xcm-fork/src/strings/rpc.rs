// SPDX-License-Identifier: GPL-3.0

//! String constants for the RPC client module.

/// JSON-RPC method names used for error reporting.
///
/// These match the actual RPC method names in the Polkadot SDK JSON-RPC specification.
pub mod methods {
	pub const CHAIN_GET_BLOCK_HASH: &str = "chain_getBlockHash";
	pub const CHAIN_GET_FINALIZED_HEAD: &str = "chain_getFinalisedHead";
	pub const CHAIN_GET_HEADER: &str = "chain_getHeader";
	pub const STATE_GET_STORAGE: &str = "state_getStorage";
	pub const STATE_QUERY_STORAGE_AT: &str = "state_queryStorageAt";
}
