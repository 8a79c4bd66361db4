// SPDX-License-Identifier: GPL-3.0

//! Well-known storage prefixes.

/// `System` pallet name.
pub const SYSTEM_PALLET: &[u8] = b"System";

/// `System::Account` storage item name.
pub const ACCOUNT_STORAGE: &[u8] = b"Account";

/// Module/item names as used in storage injection values.
pub mod names {
	pub const SYSTEM: &str = "System";
	pub const ACCOUNT: &str = "Account";
	pub const ASSETS: &str = "Assets";
	pub const FOREIGN_ASSETS: &str = "ForeignAssets";
	pub const ASSET: &str = "Asset";
}

/// Well-known key holding the runtime code.
pub const CODE_KEY: &[u8] = b":code";
