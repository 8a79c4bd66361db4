// SPDX-License-Identifier: GPL-3.0

//! String constants for the inherent module.

/// String constants for the timestamp inherent provider.
pub mod timestamp {
	/// Provider identifier for logging/debugging.
	pub const IDENTIFIER: &str = "Timestamp";

	/// Storage key components for reading the current timestamp.
	pub mod storage_keys {
		/// Pallet name for computing the storage key prefix.
		pub const PALLET_NAME: &[u8] = b"Timestamp";

		/// Storage item name for the current timestamp.
		pub const NOW: &[u8] = b"Now";
	}

	/// Default slot durations when none is configured.
	pub mod slot_duration {
		/// Relay chains produce a block every 6 seconds.
		pub const RELAY_CHAIN_MS: u64 = 6_000;

		/// Parachains produce a block every 12 seconds.
		pub const PARACHAIN_MS: u64 = 12_000;
	}

	/// Error message formats.
	pub mod errors {
		/// Format string for timestamp decode failures.
		pub const DECODE_FAILED: &str = "Failed to decode timestamp";
	}
}

/// String constants for the inbound message inherents.
pub mod messages {
	/// Identifier of the downward message inherent.
	pub const DOWNWARD_IDENTIFIER: &str = "DownwardMessages";

	/// Identifier of the upward message inherent.
	pub const UPWARD_IDENTIFIER: &str = "UpwardMessages";

	/// Identifier of the horizontal message inherent.
	pub const HORIZONTAL_IDENTIFIER: &str = "HorizontalMessages";

	/// Identifier of the provider delivering all inbound channels.
	pub const INBOUND_IDENTIFIER: &str = "InboundMessages";
}

/// String constants for parachain detection.
pub mod parachain {
	/// Storage key components for parachain info.
	pub mod storage_keys {
		/// Pallet name for computing the storage key prefix.
		pub const PARACHAIN_INFO_PALLET: &[u8] = b"ParachainInfo";

		/// Storage item name for the parachain ID.
		pub const PARACHAIN_ID: &[u8] = b"ParachainId";
	}
}
