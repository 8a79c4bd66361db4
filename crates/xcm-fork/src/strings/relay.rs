// SPDX-License-Identifier: GPL-3.0

//! String constants for outbound message recognition.

/// Default `(section, method)` tags of events that announce a queued message.
pub mod tags {
	/// Horizontal message queued by a parachain.
	pub const HORIZONTAL: (&str, &str) = ("XcmpQueue", "XcmpMessageSent");

	/// Upward message queued by a parachain.
	pub const UPWARD: (&str, &str) = ("ParachainSystem", "UpwardMessageSent");

	/// Downward message queued by the relay chain.
	pub const DOWNWARD: (&str, &str) = ("XcmPallet", "Sent");
}

/// Field names read from the data of a recognised event.
pub mod fields {
	/// Destination parachain id (absent for upward messages).
	pub const DESTINATION: &str = "destination";

	/// Hex-encoded message payload.
	pub const PAYLOAD: &str = "message";
}

/// Reasons used in link validation errors.
pub mod links {
	pub const SAME_CHAIN: &str = "a chain cannot be linked to itself";
	pub const NOT_RELAY: &str = "vertical links need a relay chain parent";
	pub const NOT_PARACHAIN: &str = "expected a parachain";
}
