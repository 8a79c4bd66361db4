// SPDX-License-Identifier: GPL-3.0

//! Storage injection: human-authored values to raw storage changes.
//!
//! Values are written as a nested JSON object, `module → item → value`. Each
//! `(module, item)` pair is resolved through a [`StorageSchema`], a table of
//! [`ItemCodec`]s built and validated once, up front.
//!
//! ```json
//! {
//!   "System": {
//!     "Account": [
//!       [["0xd43593c7..."], { "providers": 1, "data": { "free": "1000000000000" } }]
//!     ]
//!   }
//! }
//! ```
//!
//! Plain items take the value directly. Map items take a list of `[key, value]`
//! pairs. A `null` value is a tombstone and deletes the key.
//!
//! The default table also covers the `Assets` and `ForeignAssets` pallets (see
//! [`assets`]). Other items are registered through [`StorageSchema::builder`]:
//!
//! ```
//! use xcm_fork::injection::{RawValueCodec, StorageSchema, assets};
//!
//! let schema = StorageSchema::builder()
//! 	.item("PoolAssets", "Asset", assets::AssetDetailsCodec { id: assets::AssetIdKind::Index })
//! 	.item("Sudo", "Key", RawValueCodec)
//! 	.build()
//! 	.unwrap();
//! assert!(schema.contains("Sudo", "Key"));
//! ```

pub mod assets;

use crate::{
	dev::{AccountData, AccountInfo, account_storage_key},
	error::SchemaError,
	state::StorageChange,
	strings::storage::names,
};
use scale::{Decode, Encode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::{
	collections::{BTreeMap, HashMap},
	sync::Arc,
};

/// Human-authored storage values: module → item → value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageValues(pub BTreeMap<String, BTreeMap<String, Value>>);

impl StorageValues {
	/// Parse from a JSON value.
	pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
		serde_json::from_value(value)
	}

	/// Add or replace one item.
	pub fn with(mut self, module: &str, item: &str, value: Value) -> Self {
		self.0.entry(module.to_string()).or_default().insert(item.to_string(), value);
		self
	}
}

/// Encode/decode pair for one storage item.
pub trait ItemCodec: Send + Sync {
	/// Whether the item is a map (values are `[key, value]` pairs).
	fn is_map(&self) -> bool;

	/// Full storage key for `key` (ignored by plain items) under `prefix`.
	fn storage_key(&self, prefix: &[u8], key: &Value) -> Result<Vec<u8>, String>;

	/// Encode a non-null value.
	fn encode_value(&self, value: &Value) -> Result<Vec<u8>, String>;

	/// Decode a stored value back into its human-authored shape.
	fn decode_value(&self, raw: &[u8]) -> Result<Value, String>;
}

/// Plain item holding hex bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawValueCodec;

impl ItemCodec for RawValueCodec {
	fn is_map(&self) -> bool {
		false
	}

	fn storage_key(&self, prefix: &[u8], _key: &Value) -> Result<Vec<u8>, String> {
		Ok(prefix.to_vec())
	}

	fn encode_value(&self, value: &Value) -> Result<Vec<u8>, String> {
		hex_bytes(value)
	}

	fn decode_value(&self, raw: &[u8]) -> Result<Value, String> {
		Ok(Value::String(format!("0x{}", hex::encode(raw))))
	}
}

/// Map item with hex keys (the hashed key suffix) and hex values.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawMapCodec;

impl ItemCodec for RawMapCodec {
	fn is_map(&self) -> bool {
		true
	}

	fn storage_key(&self, prefix: &[u8], key: &Value) -> Result<Vec<u8>, String> {
		let mut full = prefix.to_vec();
		full.extend(hex_bytes(key)?);
		Ok(full)
	}

	fn encode_value(&self, value: &Value) -> Result<Vec<u8>, String> {
		hex_bytes(value)
	}

	fn decode_value(&self, raw: &[u8]) -> Result<Value, String> {
		Ok(Value::String(format!("0x{}", hex::encode(raw))))
	}
}

/// `System::Account`: account id → `AccountInfo`.
///
/// Missing fields default to zero, except `providers` which defaults to one.
/// Balances may be given as numbers or decimal strings and decode as strings.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemAccountCodec;

impl ItemCodec for SystemAccountCodec {
	fn is_map(&self) -> bool {
		true
	}

	fn storage_key(&self, _prefix: &[u8], key: &Value) -> Result<Vec<u8>, String> {
		// Keys may be wrapped in a single-element list, as map key tuples are.
		let key = match key {
			Value::Array(parts) if parts.len() == 1 => &parts[0],
			other => other,
		};
		let account = hex_bytes(key)?;
		if account.len() != 32 {
			return Err(format!("account id must be 32 bytes, got {}", account.len()));
		}
		Ok(account_storage_key(&account))
	}

	fn encode_value(&self, value: &Value) -> Result<Vec<u8>, String> {
		let object = value.as_object().ok_or("expected an object")?;
		let empty = Map::new();
		let data = match object.get("data") {
			Some(Value::Object(data)) => data,
			Some(_) => return Err("`data` must be an object".into()),
			None => &empty,
		};
		let info = AccountInfo {
			nonce: u32_field(object, "nonce", 0)?,
			consumers: u32_field(object, "consumers", 0)?,
			providers: u32_field(object, "providers", 1)?,
			sufficients: u32_field(object, "sufficients", 0)?,
			data: AccountData {
				free: u128_field(data, "free")?,
				reserved: u128_field(data, "reserved")?,
				frozen: u128_field(data, "frozen")?,
				flags: u128_field(data, "flags")?,
			},
		};
		Ok(info.encode())
	}

	fn decode_value(&self, raw: &[u8]) -> Result<Value, String> {
		let info = AccountInfo::decode(&mut &raw[..]).map_err(|e| e.to_string())?;
		Ok(json!({
			"nonce": info.nonce,
			"consumers": info.consumers,
			"providers": info.providers,
			"sufficients": info.sufficients,
			"data": {
				"free": info.data.free.to_string(),
				"reserved": info.data.reserved.to_string(),
				"frozen": info.data.frozen.to_string(),
				"flags": info.data.flags.to_string(),
			}
		}))
	}
}

fn hex_bytes(value: &Value) -> Result<Vec<u8>, String> {
	let text = value.as_str().ok_or("expected a hex string")?;
	hex::decode(text.trim_start_matches("0x")).map_err(|e| e.to_string())
}

fn u32_field(object: &Map<String, Value>, name: &str, default: u32) -> Result<u32, String> {
	match object.get(name) {
		None => Ok(default),
		Some(value) => u128_value(value)?
			.try_into()
			.map_err(|_| format!("`{name}` does not fit in u32")),
	}
}

fn u128_field(object: &Map<String, Value>, name: &str) -> Result<u128, String> {
	object.get(name).map(u128_value).transpose().map(Option::unwrap_or_default)
}

fn u128_value(value: &Value) -> Result<u128, String> {
	match value {
		// Integral floats such as `10e10` are accepted up to `u64::MAX`.
		Value::Number(n) => n
			.as_u64()
			.or_else(|| {
				n.as_f64()
					.filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f < u64::MAX as f64)
					.map(|f| f as u64)
			})
			.map(u128::from)
			.ok_or_else(|| format!("invalid amount {n}")),
		Value::String(s) => s.parse().map_err(|_| format!("invalid amount `{s}`")),
		other => Err(format!("invalid amount {other}")),
	}
}

struct SchemaEntry {
	prefix: Vec<u8>,
	codec: Arc<dyn ItemCodec>,
}

/// Table from `(module, item)` to the codec that encodes it.
#[derive(Clone)]
pub struct StorageSchema {
	entries: Arc<HashMap<(String, String), SchemaEntry>>,
}

impl std::fmt::Debug for StorageSchema {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut items: Vec<_> = self.entries.keys().map(|(m, i)| format!("{m}::{i}")).collect();
		items.sort();
		f.debug_struct("StorageSchema").field("items", &items).finish()
	}
}

impl Default for StorageSchema {
	/// The built-in table: `System::Account` and the `Asset`/`Account` items of
	/// `Assets` and `ForeignAssets`.
	fn default() -> Self {
		use assets::{AssetAccountCodec, AssetDetailsCodec, AssetIdKind};
		Self::builder()
			.item(names::SYSTEM, names::ACCOUNT, SystemAccountCodec)
			.item(names::ASSETS, names::ASSET, AssetDetailsCodec { id: AssetIdKind::Index })
			.item(names::ASSETS, names::ACCOUNT, AssetAccountCodec { id: AssetIdKind::Index })
			.item(names::FOREIGN_ASSETS, names::ASSET, AssetDetailsCodec { id: AssetIdKind::Location })
			.item(names::FOREIGN_ASSETS, names::ACCOUNT, AssetAccountCodec { id: AssetIdKind::Location })
			.build()
			.unwrap_or_else(|_| Self { entries: Arc::new(HashMap::new()) })
	}
}

impl StorageSchema {
	/// Start an empty table.
	pub fn builder() -> StorageSchemaBuilder {
		StorageSchemaBuilder::default()
	}

	/// Whether the table knows `(module, item)`.
	pub fn contains(&self, module: &str, item: &str) -> bool {
		self.entries.contains_key(&(module.to_string(), item.to_string()))
	}

	fn entry(&self, module: &str, item: &str) -> Result<&SchemaEntry, SchemaError> {
		self.entries.get(&(module.to_string(), item.to_string())).ok_or_else(|| {
			SchemaError::UnknownItem { module: module.to_string(), item: item.to_string() }
		})
	}

	/// Flatten `values` into raw storage changes.
	pub fn encode(&self, values: &StorageValues) -> Result<Vec<StorageChange>, SchemaError> {
		let mut changes = Vec::new();
		for (module, items) in &values.0 {
			for (item, value) in items {
				let entry = self.entry(module, item)?;
				let invalid = |message: String| SchemaError::InvalidValue {
					module: module.clone(),
					item: item.clone(),
					message,
				};
				let encode = |key: &Value, value: &Value| -> Result<StorageChange, SchemaError> {
					let storage_key = entry.codec.storage_key(&entry.prefix, key).map_err(invalid)?;
					let raw = match value {
						Value::Null => None,
						value => Some(entry.codec.encode_value(value).map_err(invalid)?),
					};
					Ok((storage_key, raw))
				};

				if entry.codec.is_map() {
					let pairs = value
						.as_array()
						.ok_or_else(|| invalid("expected a list of [key, value] pairs".into()))?;
					for pair in pairs {
						match pair.as_array().map(Vec::as_slice) {
							Some([key, value]) => changes.push(encode(key, value)?),
							_ => return Err(invalid("expected a [key, value] pair".into())),
						}
					}
				} else {
					changes.push(encode(&Value::Null, value)?);
				}
			}
		}
		Ok(changes)
	}

	/// Storage key of `(module, item)` at `key` (ignored for plain items).
	pub fn storage_key(&self, module: &str, item: &str, key: &Value) -> Result<Vec<u8>, SchemaError> {
		let entry = self.entry(module, item)?;
		entry.codec.storage_key(&entry.prefix, key).map_err(|message| SchemaError::InvalidValue {
			module: module.to_string(),
			item: item.to_string(),
			message,
		})
	}

	/// Decode a raw value of `(module, item)`.
	pub fn decode(&self, module: &str, item: &str, raw: &[u8]) -> Result<Value, SchemaError> {
		self.entry(module, item)?.codec.decode_value(raw).map_err(|message| {
			SchemaError::InvalidValue { module: module.to_string(), item: item.to_string(), message }
		})
	}
}

/// Collects codecs and validates them into a [`StorageSchema`].
#[derive(Default)]
pub struct StorageSchemaBuilder {
	items: Vec<(String, String, Arc<dyn ItemCodec>)>,
}

impl StorageSchemaBuilder {
	/// Register a codec for `(module, item)`.
	pub fn item(mut self, module: &str, item: &str, codec: impl ItemCodec + 'static) -> Self {
		self.items.push((module.to_string(), item.to_string(), Arc::new(codec)));
		self
	}

	/// Validate and build. Rejects empty names and duplicate entries.
	pub fn build(self) -> Result<StorageSchema, SchemaError> {
		let mut entries = HashMap::new();
		for (module, item, codec) in self.items {
			if module.is_empty() || item.is_empty() {
				return Err(SchemaError::EmptyName);
			}
			let mut prefix = sp_core::twox_128(module.as_bytes()).to_vec();
			prefix.extend(sp_core::twox_128(item.as_bytes()));
			let key = (module, item);
			if entries.contains_key(&key) {
				let (module, item) = key;
				return Err(SchemaError::Duplicate { module, item });
			}
			entries.insert(key, SchemaEntry { prefix, codec });
		}
		Ok(StorageSchema { entries: Arc::new(entries) })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dev::{ALICE, BOB, free_balance};

	fn alice_hex() -> String {
		format!("0x{}", hex::encode(ALICE))
	}

	#[test]
	fn system_account_encodes_to_account_info() {
		let values = StorageValues::default().with(
			"System",
			"Account",
			json!([[[alice_hex()], { "providers": 1, "data": { "free": "1000000000000000" } }]]),
		);
		let changes = StorageSchema::default().encode(&values).unwrap();

		assert_eq!(changes.len(), 1);
		assert_eq!(changes[0].0, account_storage_key(&ALICE));
		assert_eq!(free_balance(changes[0].1.as_ref().unwrap()), Some(1_000_000_000_000_000));
	}

	#[test]
	fn null_value_is_a_tombstone() {
		let values = StorageValues::default().with(
			"System",
			"Account",
			json!([[format!("0x{}", hex::encode(BOB)), null]]),
		);
		let changes = StorageSchema::default().encode(&values).unwrap();
		assert_eq!(changes, vec![(account_storage_key(&BOB), None)]);
	}

	#[test]
	fn unknown_item_is_rejected() {
		let values = StorageValues::default().with("Tokens", "Accounts", json!([]));
		let err = StorageSchema::default().encode(&values).unwrap_err();
		assert!(matches!(err, SchemaError::UnknownItem { .. }));
	}

	#[test]
	fn invalid_account_value_is_rejected() {
		let values =
			StorageValues::default().with("System", "Account", json!([[alice_hex(), "oops"]]));
		let err = StorageSchema::default().encode(&values).unwrap_err();
		assert!(matches!(err, SchemaError::InvalidValue { .. }));
	}

	#[test]
	fn duplicate_entries_fail_validation() {
		let result = StorageSchema::builder()
			.item("Sudo", "Key", RawValueCodec)
			.item("Sudo", "Key", RawValueCodec)
			.build();
		assert!(matches!(result, Err(SchemaError::Duplicate { .. })));
		assert!(matches!(
			StorageSchema::builder().item("", "Key", RawValueCodec).build(),
			Err(SchemaError::EmptyName)
		));
	}

	#[test]
	fn raw_codecs_use_pallet_prefix() {
		let schema = StorageSchema::builder()
			.item("Sudo", "Key", RawValueCodec)
			.item("Foo", "Bar", RawMapCodec)
			.build()
			.unwrap();
		let values = StorageValues::from_json(json!({
			"Sudo": { "Key": "0x0102" },
			"Foo": { "Bar": [["0xaa", "0xbb"]] }
		}))
		.unwrap();
		let changes = schema.encode(&values).unwrap();

		let mut sudo_key = sp_core::twox_128(b"Sudo").to_vec();
		sudo_key.extend(sp_core::twox_128(b"Key"));
		let mut bar_key = sp_core::twox_128(b"Foo").to_vec();
		bar_key.extend(sp_core::twox_128(b"Bar"));
		bar_key.push(0xaa);

		assert!(changes.contains(&(sudo_key, Some(vec![1, 2]))));
		assert!(changes.contains(&(bar_key, Some(vec![0xbb]))));
	}

	#[test]
	fn account_round_trips_through_json() {
		let schema = StorageSchema::default();
		let raw = AccountInfo::with_free(42).encode();
		let decoded = schema.decode("System", "Account", &raw).unwrap();
		assert_eq!(decoded["data"]["free"], "42");
		assert_eq!(decoded["providers"], 1);
	}
}
