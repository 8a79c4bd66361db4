// SPDX-License-Identifier: GPL-3.0

//! Codecs for `pallet-assets` instances.
//!
//! Asset hubs run two instances: `Assets`, keyed by a `u32` index, and
//! `ForeignAssets`, keyed by an XCM location. Both store `Asset` (asset id →
//! details) and `Account` (asset id, account id → balance entry) behind
//! `Blake2_128Concat` hashers.
//!
//! ```json
//! {
//!   "ForeignAssets": {
//!     "Asset": [
//!       [[{ "parents": 1, "interior": "Here" }], { "supply": "10000000000000", "owner": "0xd435..." }]
//!     ],
//!     "Account": [
//!       [[{ "parents": 1, "interior": "Here" }, "0xd435..."], { "balance": "100000000000" }]
//!     ]
//!   }
//! }
//! ```
//!
//! Locations are `{ "parents": n, "interior": "Here" | { "X<n>": [junction, ...] } }`
//! with `Parachain`, `AccountId32`, `PalletInstance` and `GeneralIndex` junctions,
//! or a hex string holding an already encoded location.

use super::{ItemCodec, hex_bytes, u32_field, u128_field, u128_value};
use scale::{Compact, Decode, Encode};
use serde_json::{Value, json};

/// How an asset instance identifies its assets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetIdKind {
	/// `u32` index, as in the `Assets` instance.
	Index,
	/// XCM location, as in the `ForeignAssets` instance.
	Location,
}

impl AssetIdKind {
	fn encode(self, value: &Value) -> Result<Vec<u8>, String> {
		match self {
			AssetIdKind::Index => {
				let id: u32 = u128_value(value)?
					.try_into()
					.map_err(|_| "asset index does not fit in u32".to_string())?;
				Ok(id.encode())
			},
			AssetIdKind::Location => encode_location(value),
		}
	}
}

/// `AssetStatus` of an asset class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub enum AssetStatus {
	Live,
	Frozen,
	Destroying,
}

/// `AssetDetails` as stored under `Asset`.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct AssetDetails {
	pub owner: [u8; 32],
	pub issuer: [u8; 32],
	pub admin: [u8; 32],
	pub freezer: [u8; 32],
	pub supply: u128,
	pub deposit: u128,
	pub min_balance: u128,
	pub is_sufficient: bool,
	pub accounts: u32,
	pub sufficients: u32,
	pub approvals: u32,
	pub status: AssetStatus,
}

/// `AccountStatus` of a holding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub enum AccountStatus {
	Liquid,
	Frozen,
	Blocked,
}

/// `ExistenceReason` of a holding.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum ExistenceReason {
	Consumer,
	Sufficient,
	DepositHeld(u128),
	DepositRefunded,
	DepositFrom([u8; 32], u128),
}

/// `AssetAccount` as stored under `Account`. The `extra` field is `()` and
/// encodes to nothing.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct AssetAccount {
	pub balance: u128,
	pub status: AccountStatus,
	pub reason: ExistenceReason,
}

/// `Asset`: asset id → [`AssetDetails`].
///
/// Only `owner` is required. `issuer`, `admin` and `freezer` default to the
/// owner, `min_balance` to one, the rest to zero, `false` or `Live`.
#[derive(Clone, Copy, Debug)]
pub struct AssetDetailsCodec {
	pub id: AssetIdKind,
}

impl ItemCodec for AssetDetailsCodec {
	fn is_map(&self) -> bool {
		true
	}

	fn storage_key(&self, prefix: &[u8], key: &Value) -> Result<Vec<u8>, String> {
		let key = match key {
			Value::Array(parts) if parts.len() == 1 => &parts[0],
			other => other,
		};
		let mut full = prefix.to_vec();
		full.extend(blake2_128_concat(&self.id.encode(key)?));
		Ok(full)
	}

	fn encode_value(&self, value: &Value) -> Result<Vec<u8>, String> {
		let object = value.as_object().ok_or("expected an object")?;
		let owner = account_id(object.get("owner").ok_or("missing `owner`")?)?;
		let or_owner = |name: &str| {
			object.get(name).map(account_id).transpose().map(|account| account.unwrap_or(owner))
		};
		let is_sufficient = match object.get("is_sufficient") {
			None => false,
			Some(Value::Bool(flag)) => *flag,
			Some(other) => return Err(format!("`is_sufficient` must be a boolean, got {other}")),
		};
		let status = match variant(object.get("status"))? {
			None | Some(("Live", _)) => AssetStatus::Live,
			Some(("Frozen", _)) => AssetStatus::Frozen,
			Some(("Destroying", _)) => AssetStatus::Destroying,
			Some((other, _)) => return Err(format!("unknown asset status `{other}`")),
		};
		let details = AssetDetails {
			owner,
			issuer: or_owner("issuer")?,
			admin: or_owner("admin")?,
			freezer: or_owner("freezer")?,
			supply: u128_field(object, "supply")?,
			deposit: u128_field(object, "deposit")?,
			min_balance: match object.get("min_balance") {
				Some(value) => u128_value(value)?,
				None => 1,
			},
			is_sufficient,
			accounts: u32_field(object, "accounts", 0)?,
			sufficients: u32_field(object, "sufficients", 0)?,
			approvals: u32_field(object, "approvals", 0)?,
			status,
		};
		Ok(details.encode())
	}

	fn decode_value(&self, raw: &[u8]) -> Result<Value, String> {
		let details = AssetDetails::decode(&mut &raw[..]).map_err(|e| e.to_string())?;
		Ok(json!({
			"owner": hex_string(&details.owner),
			"issuer": hex_string(&details.issuer),
			"admin": hex_string(&details.admin),
			"freezer": hex_string(&details.freezer),
			"supply": details.supply.to_string(),
			"deposit": details.deposit.to_string(),
			"min_balance": details.min_balance.to_string(),
			"is_sufficient": details.is_sufficient,
			"accounts": details.accounts,
			"sufficients": details.sufficients,
			"approvals": details.approvals,
			"status": format!("{:?}", details.status),
		}))
	}
}

/// `Account`: (asset id, account id) → [`AssetAccount`].
///
/// `status` defaults to `Liquid` and `reason` to `Consumer`. Enum fields may be
/// written as `"Liquid"` or `{ "Liquid": null }`.
#[derive(Clone, Copy, Debug)]
pub struct AssetAccountCodec {
	pub id: AssetIdKind,
}

impl ItemCodec for AssetAccountCodec {
	fn is_map(&self) -> bool {
		true
	}

	fn storage_key(&self, prefix: &[u8], key: &Value) -> Result<Vec<u8>, String> {
		let (asset, account) = match key.as_array().map(Vec::as_slice) {
			Some([asset, account]) => (asset, account),
			_ => return Err("expected an [asset id, account id] key".into()),
		};
		let mut full = prefix.to_vec();
		full.extend(blake2_128_concat(&self.id.encode(asset)?));
		full.extend(blake2_128_concat(&account_id(account)?));
		Ok(full)
	}

	fn encode_value(&self, value: &Value) -> Result<Vec<u8>, String> {
		let object = value.as_object().ok_or("expected an object")?;
		let status = match variant(object.get("status"))? {
			None | Some(("Liquid", _)) => AccountStatus::Liquid,
			Some(("Frozen", _)) => AccountStatus::Frozen,
			Some(("Blocked", _)) => AccountStatus::Blocked,
			Some((other, _)) => return Err(format!("unknown account status `{other}`")),
		};
		let reason = match variant(object.get("reason"))? {
			None | Some(("Consumer", _)) => ExistenceReason::Consumer,
			Some(("Sufficient", _)) => ExistenceReason::Sufficient,
			Some(("DepositHeld", amount)) => ExistenceReason::DepositHeld(u128_value(amount)?),
			Some(("DepositRefunded", _)) => ExistenceReason::DepositRefunded,
			Some(("DepositFrom", args)) => match args.as_array().map(Vec::as_slice) {
				Some([depositor, amount]) =>
					ExistenceReason::DepositFrom(account_id(depositor)?, u128_value(amount)?),
				_ => return Err("`DepositFrom` takes [account id, amount]".into()),
			},
			Some((other, _)) => return Err(format!("unknown existence reason `{other}`")),
		};
		let account = AssetAccount { balance: u128_field(object, "balance")?, status, reason };
		Ok(account.encode())
	}

	fn decode_value(&self, raw: &[u8]) -> Result<Value, String> {
		let account = AssetAccount::decode(&mut &raw[..]).map_err(|e| e.to_string())?;
		let reason = match account.reason {
			ExistenceReason::Consumer => json!("Consumer"),
			ExistenceReason::Sufficient => json!("Sufficient"),
			ExistenceReason::DepositHeld(amount) => json!({ "DepositHeld": amount.to_string() }),
			ExistenceReason::DepositRefunded => json!("DepositRefunded"),
			ExistenceReason::DepositFrom(depositor, amount) =>
				json!({ "DepositFrom": [hex_string(&depositor), amount.to_string()] }),
		};
		Ok(json!({
			"balance": account.balance.to_string(),
			"status": format!("{:?}", account.status),
			"reason": reason,
		}))
	}
}

/// SCALE-encode an XCM location written as JSON.
pub fn encode_location(value: &Value) -> Result<Vec<u8>, String> {
	let object = match value {
		Value::String(_) => return hex_bytes(value),
		Value::Object(object) => object,
		other => return Err(format!("expected a location, got {other}")),
	};
	let parents: u8 = u32_field(object, "parents", 0)?
		.try_into()
		.map_err(|_| "`parents` does not fit in u8".to_string())?;
	let mut encoded = vec![parents];
	let junctions = match variant(object.get("interior"))? {
		None | Some(("Here", _)) => Vec::new(),
		Some((arity, junctions)) => {
			let count: usize = arity
				.strip_prefix('X')
				.and_then(|n| n.parse().ok())
				.filter(|n| (1..=8).contains(n))
				.ok_or_else(|| format!("unknown interior `{arity}`"))?;
			let junctions = match junctions {
				Value::Array(list) => list.clone(),
				single => vec![single.clone()],
			};
			if junctions.len() != count {
				return Err(format!("`{arity}` takes {count} junctions, got {}", junctions.len()));
			}
			junctions
		},
	};
	encoded.push(junctions.len() as u8);
	for junction in &junctions {
		encode_junction(junction, &mut encoded)?;
	}
	Ok(encoded)
}

fn encode_junction(junction: &Value, out: &mut Vec<u8>) -> Result<(), String> {
	match variant(Some(junction))? {
		Some(("Parachain", id)) => {
			let id: u32 = u128_value(id)?
				.try_into()
				.map_err(|_| "parachain id does not fit in u32".to_string())?;
			out.push(0);
			Compact(id).encode_to(out);
		},
		Some(("AccountId32", account)) => {
			let account = account.as_object().ok_or("`AccountId32` must be an object")?;
			if !matches!(account.get("network"), None | Some(Value::Null)) {
				return Err("only `AccountId32` junctions without a network are supported".into());
			}
			out.push(1);
			out.push(0);
			out.extend(account_id(account.get("id").ok_or("missing `id`")?)?);
		},
		Some(("PalletInstance", index)) => {
			let index: u8 = u128_value(index)?
				.try_into()
				.map_err(|_| "pallet instance does not fit in u8".to_string())?;
			out.push(4);
			out.push(index);
		},
		Some(("GeneralIndex", index)) => {
			out.push(5);
			Compact(u128_value(index)?).encode_to(out);
		},
		Some((other, _)) => return Err(format!("unsupported junction `{other}`")),
		None => return Err("missing junction".into()),
	}
	Ok(())
}

static UNIT: Value = Value::Null;

/// Split a unit or single-field enum value: `"Name"` or `{ "Name": payload }`.
fn variant(value: Option<&Value>) -> Result<Option<(&str, &Value)>, String> {
	match value {
		None | Some(Value::Null) => Ok(None),
		Some(Value::String(name)) => Ok(Some((name.as_str(), &UNIT))),
		Some(Value::Object(object)) if object.len() == 1 => {
			Ok(object.iter().next().map(|(name, payload)| (name.as_str(), payload)))
		},
		Some(other) => Err(format!("expected an enum variant, got {other}")),
	}
}

fn account_id(value: &Value) -> Result<[u8; 32], String> {
	let bytes = hex_bytes(value)?;
	let len = bytes.len();
	bytes.try_into().map_err(|_| format!("account id must be 32 bytes, got {len}"))
}

fn blake2_128_concat(data: &[u8]) -> Vec<u8> {
	let mut hashed = sp_core::blake2_128(data).to_vec();
	hashed.extend_from_slice(data);
	hashed
}

fn hex_string(bytes: &[u8]) -> String {
	format!("0x{}", hex::encode(bytes))
}
