// SPDX-License-Identifier: GPL-3.0

//! Dev account utilities for forked chains.
//!
//! Provides well-known dev account public keys and the `System::Account` layout
//! used to fund them through storage injection.

use crate::{injection::StorageValues, strings::storage};
use scale::{Decode, Encode};
use serde_json::{Value, json};

/// Default balance for dev accounts: half of u128::MAX.
pub const DEV_BALANCE: u128 = u128::MAX / 2;

/// Well-known dev account: Alice.
pub const ALICE: [u8; 32] = [
	0xd4, 0x35, 0x93, 0xc7, 0x15, 0xfd, 0xd3, 0x1c, 0x61, 0x14, 0x1a, 0xbd, 0x04, 0xa9, 0x9f, 0xd6,
	0x82, 0x2c, 0x85, 0x58, 0x85, 0x4c, 0xcd, 0xe3, 0x9a, 0x56, 0x84, 0xe7, 0xa5, 0x6d, 0xa2, 0x7d,
];

/// Well-known dev account: Bob.
pub const BOB: [u8; 32] = [
	0x8e, 0xaf, 0x04, 0x15, 0x16, 0x87, 0x73, 0x63, 0x26, 0xc9, 0xfe, 0xa1, 0x7e, 0x25, 0xfc, 0x52,
	0x87, 0x61, 0x36, 0x93, 0xc9, 0x12, 0x90, 0x9c, 0xb2, 0x26, 0xaa, 0x47, 0x94, 0xf2, 0x6a, 0x48,
];

/// Well-known dev account: Charlie.
pub const CHARLIE: [u8; 32] = [
	0x90, 0xb5, 0xab, 0x20, 0x5c, 0x69, 0x74, 0xc9, 0xea, 0x84, 0x1b, 0xe6, 0x88, 0x86, 0x46, 0x33,
	0xdc, 0x9c, 0xa8, 0xa3, 0x57, 0x84, 0x3e, 0xea, 0xcf, 0x23, 0x14, 0x64, 0x99, 0x65, 0xfe, 0x22,
];

/// All dev accounts (name, 32-byte public key).
pub const DEV_ACCOUNTS: [(&str, [u8; 32]); 3] =
	[("Alice", ALICE), ("Bob", BOB), ("Charlie", CHARLIE)];

/// Balances part of `System::Account`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct AccountData {
	pub free: u128,
	pub reserved: u128,
	pub frozen: u128,
	pub flags: u128,
}

/// Value stored under `System::Account`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct AccountInfo {
	pub nonce: u32,
	pub consumers: u32,
	pub providers: u32,
	pub sufficients: u32,
	pub data: AccountData,
}

impl AccountInfo {
	/// A fresh account with one provider and the given free balance.
	pub fn with_free(free: u128) -> Self {
		Self { providers: 1, data: AccountData { free, ..Default::default() }, ..Default::default() }
	}
}

/// Compute the `System::Account` storage key for an account (Blake2_128Concat).
pub fn account_storage_key(account: &[u8]) -> Vec<u8> {
	let mut key = Vec::new();
	key.extend(sp_core::twox_128(storage::SYSTEM_PALLET));
	key.extend(sp_core::twox_128(storage::ACCOUNT_STORAGE));
	key.extend(sp_core::blake2_128(account));
	key.extend(account);
	key
}

/// Build an encoded `AccountInfo` with the given free balance.
pub fn build_account_info(free_balance: u128) -> Vec<u8> {
	AccountInfo::with_free(free_balance).encode()
}

/// `System::Account` values funding every dev account with `free`.
pub fn fund_dev_accounts(free: u128) -> StorageValues {
	let accounts = DEV_ACCOUNTS
		.iter()
		.map(|(_, account)| {
			json!([format!("0x{}", hex::encode(account)), { "data": { "free": free.to_string() } }])
		})
		.collect();
	StorageValues::default().with(
		storage::names::SYSTEM,
		storage::names::ACCOUNT,
		Value::Array(accounts),
	)
}

/// Free balance of an encoded `AccountInfo`, if it decodes.
pub fn free_balance(encoded: &[u8]) -> Option<u128> {
	AccountInfo::decode(&mut &encoded[..]).ok().map(|info| info.data.free)
}
