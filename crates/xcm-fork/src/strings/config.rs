// SPDX-License-Identifier: GPL-3.0

//! String constants for configuration layering.

/// Environment variable names and suffixes.
pub mod env {
	/// Comma separated endpoint list suffix.
	pub const ENDPOINT_SUFFIX: &str = "_ENDPOINT";

	/// Fork block number suffix.
	pub const BLOCK_NUMBER_SUFFIX: &str = "_BLOCK_NUMBER";

	/// Runtime override path suffix.
	pub const WASM_SUFFIX: &str = "_WASM";

	/// When set to any value, disables the database for every network.
	pub const RUN_TESTS_WITHOUT_DB: &str = "RUN_TESTS_WITHOUT_DB";
}

/// Built-in network profile names.
pub mod networks {
	pub const POLKADOT: &str = "polkadot";
	pub const ASSET_HUB: &str = "asset_hub";
	pub const FREQUENCY: &str = "frequency";
}

/// Documented defaults of the built-in profiles.
pub mod defaults {
	pub const POLKADOT_ENDPOINT: &str = "wss://rpc.ibp.network/polkadot";
	pub const POLKADOT_BLOCK: u32 = 14_500_000;
	pub const POLKADOT_DATABASE: &str = "polkadot-db.sqlite";

	pub const ASSET_HUB_ENDPOINT: &str = "wss://asset-hub-polkadot-rpc.n.dwellir.com";
	pub const ASSET_HUB_BLOCK: u32 = 3_000_000;
	pub const ASSET_HUB_DATABASE: &str = "asset-hub-db.sqlite";

	pub const FREQUENCY_ENDPOINT: &str = "wss://0.rpc.frequency.xyz";
	pub const FREQUENCY_BLOCK: u32 = 3_000_000;
	pub const FREQUENCY_DATABASE: &str = "frequency-db.sqlite";

	/// Runtime log level of the profiles that enable runtime logs.
	pub const VERBOSE_RUNTIME_LOG_LEVEL: u32 = 5;
}
