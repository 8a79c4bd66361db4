// SPDX-License-Identifier: GPL-3.0

//! Timestamp inherent provider.
//!
//! The next timestamp is the override set by time travel when there is one.
//! Otherwise it is the parent's `Timestamp::Now` (or, if unset, the parent block's
//! timestamp) plus the slot duration. Wall-clock time is never used, so builds are
//! reproducible.

use crate::{
	Block, BuildError, StateStore,
	error::FetchError,
	inherent::InherentProvider,
	message::ChainId,
	runtime::Inherent,
	strings::inherent::timestamp::{self as strings, slot_duration},
};
use async_trait::async_trait;
use scale::Decode;

/// Timestamp inherent provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampInherent {
	/// Slot duration in milliseconds.
	slot_duration_ms: u64,
	/// Exact timestamp to use instead of advancing by one slot.
	override_ms: Option<u64>,
}

impl TimestampInherent {
	/// Create a provider advancing by `slot_duration_ms` per block.
	pub fn new(slot_duration_ms: u64) -> Self {
		Self { slot_duration_ms, override_ms: None }
	}

	/// Default slots for `chain`: 6 seconds on a relay chain, 12 on a parachain.
	pub fn for_chain(chain: ChainId) -> Self {
		Self::new(match chain {
			ChainId::Relay => slot_duration::RELAY_CHAIN_MS,
			ChainId::Para(_) => slot_duration::PARACHAIN_MS,
		})
	}

	/// Use `timestamp` for the next block instead of advancing.
	pub fn with_override(mut self, timestamp: Option<u64>) -> Self {
		self.override_ms = timestamp;
		self
	}

	/// Slot duration in milliseconds.
	pub fn slot_duration_ms(&self) -> u64 {
		self.slot_duration_ms
	}
}

/// Compute the storage key for `Timestamp::Now`.
pub fn timestamp_now_key() -> Vec<u8> {
	let pallet_hash = sp_core::twox_128(strings::storage_keys::PALLET_NAME);
	let storage_hash = sp_core::twox_128(strings::storage_keys::NOW);
	[pallet_hash.as_slice(), storage_hash.as_slice()].concat()
}

/// Read `Timestamp::Now` from `state`.
///
/// Returns `Ok(None)` when unset or not a valid `u64`.
pub async fn read_timestamp(state: &StateStore) -> Result<Option<u64>, FetchError> {
	let Some(raw) = state.read(&timestamp_now_key()).await? else {
		return Ok(None);
	};
	match u64::decode(&mut raw.as_slice()) {
		Ok(now) => Ok(Some(now)),
		Err(e) => {
			log::warn!("{}: {e}", strings::errors::DECODE_FAILED);
			Ok(None)
		},
	}
}

#[async_trait]
impl InherentProvider for TimestampInherent {
	fn identifier(&self) -> &'static str {
		strings::IDENTIFIER
	}

	async fn provide(&self, parent: &Block) -> Result<Vec<Inherent>, BuildError> {
		if let Some(timestamp) = self.override_ms {
			return Ok(vec![Inherent::Timestamp(timestamp)]);
		}
		let current = read_timestamp(parent.state()).await?.unwrap_or(parent.timestamp);
		Ok(vec![Inherent::Timestamp(current.saturating_add(self.slot_duration_ms))])
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{RemoteStorageLayer, StorageCache, testing::InMemorySource};
	use scale::Encode;
	use std::sync::Arc;
	use subxt::config::substrate::H256;

	async fn parent(now: Option<u64>) -> Block {
		let source = Arc::new(InMemorySource::new("relay"));
		if let Some(now) = now {
			source.insert(timestamp_now_key(), now.encode());
		}
		let hash = source.genesis_hash();
		let cache = StorageCache::in_memory().await.unwrap();
		let state = StateStore::new(Arc::new(RemoteStorageLayer::new(source, cache, hash)), 1);
		Block::fork_point(1, hash, H256::zero(), 500, state)
	}

	#[test]
	fn defaults_follow_chain_kind() {
		assert_eq!(TimestampInherent::for_chain(ChainId::Relay).slot_duration_ms(), 6_000);
		assert_eq!(TimestampInherent::for_chain(ChainId::Para(1000)).slot_duration_ms(), 12_000);
	}

	#[test]
	fn timestamp_now_key_is_32_bytes() {
		assert_eq!(timestamp_now_key().len(), 32);
	}

	#[tokio::test]
	async fn advances_stored_timestamp_by_one_slot() {
		let parent = parent(Some(10_000)).await;
		let inherents = TimestampInherent::new(1_000).provide(&parent).await.unwrap();
		assert_eq!(inherents, vec![Inherent::Timestamp(11_000)]);
	}

	#[tokio::test]
	async fn falls_back_to_parent_timestamp() {
		let parent = parent(None).await;
		let inherents = TimestampInherent::new(1_000).provide(&parent).await.unwrap();
		assert_eq!(inherents, vec![Inherent::Timestamp(1_500)]);
	}

	#[tokio::test]
	async fn override_wins() {
		let parent = parent(Some(10_000)).await;
		let provider = TimestampInherent::new(1_000).with_override(Some(42));
		assert_eq!(provider.provide(&parent).await.unwrap(), vec![Inherent::Timestamp(42)]);
	}
}
