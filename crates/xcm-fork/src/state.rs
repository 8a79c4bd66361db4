// SPDX-License-Identifier: GPL-3.0

//! Copy-on-write storage state of one chain at one block.
//!
//! A [`StateStore`] is an override layer over the shared [`RemoteStorageLayer`] of its
//! fork. Reads consult the overrides first (a tombstone reads as absent) and fall
//! through to the base snapshot otherwise.
//!
//! ```text
//! read(key) ──► overrides ──hit──► value / absent (tombstone)
//!                  │
//!                 miss
//!                  ▼
//!          RemoteStorageLayer (cache, then remote)
//! ```
//!
//! [`snapshot`](StateStore::snapshot) clones only the override layer; the base
//! snapshot and the override values themselves are shared.

use crate::{
	RemoteStorageLayer,
	error::{FetchError, SchemaError},
	injection::{StorageSchema, StorageValues},
};
use scale::Encode;
use std::{collections::HashMap, sync::Arc};
use subxt::config::substrate::H256;

/// One raw storage change: key and new value (`None` deletes the key).
pub type StorageChange = (Vec<u8>, Option<Vec<u8>>);

/// Storage of a chain at a block: local overrides over a lazily fetched base.
#[derive(Clone, Debug)]
pub struct StateStore {
	base: Arc<RemoteStorageLayer>,
	overrides: HashMap<Vec<u8>, Option<Arc<Vec<u8>>>>,
	block_height: u32,
}

impl StateStore {
	/// Create an empty override layer over `base` at `block_height`.
	pub fn new(base: Arc<RemoteStorageLayer>, block_height: u32) -> Self {
		Self { base, overrides: HashMap::new(), block_height }
	}

	/// The base snapshot shared by all stores of a fork.
	pub fn base(&self) -> &Arc<RemoteStorageLayer> {
		&self.base
	}

	/// Block height this store represents.
	pub fn block_height(&self) -> u32 {
		self.block_height
	}

	pub(crate) fn set_block_height(&mut self, block_height: u32) {
		self.block_height = block_height;
	}

	/// Read a value.
	///
	/// Overrides win, including tombstones. Otherwise the base snapshot is read at
	/// the fork block; a failed remote read surfaces as [`FetchError`].
	pub async fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, FetchError> {
		match self.overrides.get(key) {
			Some(value) => Ok(value.as_deref().cloned()),
			None => self.base.get(key).await,
		}
	}

	/// Write a value, or a tombstone when `value` is `None`.
	///
	/// Visible to subsequent reads on this store only.
	pub fn write(&mut self, key: impl Into<Vec<u8>>, value: Option<Vec<u8>>) {
		self.overrides.insert(key.into(), value.map(Arc::new));
	}

	/// A copy whose writes never affect this store, and vice versa.
	pub fn snapshot(&self) -> StateStore {
		self.clone()
	}

	/// Write a batch of raw changes.
	pub fn apply_raw(&mut self, changes: impl IntoIterator<Item = StorageChange>) {
		for (key, value) in changes {
			self.write(key, value);
		}
	}

	/// Flatten human-authored values through `schema` and write them.
	///
	/// Nothing is written if any entry fails to encode.
	pub fn apply_bulk(
		&mut self,
		values: &StorageValues,
		schema: &StorageSchema,
	) -> Result<usize, SchemaError> {
		let changes = schema.encode(values)?;
		let count = changes.len();
		self.apply_raw(changes);
		Ok(count)
	}

	/// Overrides relative to the fork point, sorted by key.
	pub fn diff(&self) -> Vec<StorageChange> {
		let mut changes: Vec<StorageChange> = self
			.overrides
			.iter()
			.map(|(key, value)| (key.clone(), value.as_deref().cloned()))
			.collect();
		changes.sort_by(|a, b| a.0.cmp(&b.0));
		changes
	}

	/// Number of keys whose value here differs from `earlier`.
	pub fn changed_keys(&self, earlier: &StateStore) -> usize {
		self.overrides
			.iter()
			.filter(|(key, value)| earlier.overrides.get(*key) != Some(*value))
			.count()
	}

	/// Deterministic commitment to this state.
	///
	/// Hashes the fork block together with the sorted overrides, so equal override
	/// layers over the same base always produce the same root.
	pub fn state_root(&self) -> H256 {
		let mut preimage = self.base.block_hash().as_bytes().to_vec();
		self.diff().encode_to(&mut preimage);
		H256::from(sp_core::blake2_256(&preimage))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{StorageCache, testing::InMemorySource};

	async fn store() -> StateStore {
		let source = Arc::new(InMemorySource::new("relay"));
		source.insert(b"remote".to_vec(), b"base".to_vec());
		let hash = source.genesis_hash();
		let cache = StorageCache::in_memory().await.unwrap();
		StateStore::new(Arc::new(RemoteStorageLayer::new(source, cache, hash)), 0)
	}

	#[tokio::test]
	async fn read_falls_through_to_base() {
		let store = store().await;
		assert_eq!(store.read(b"remote").await.unwrap(), Some(b"base".to_vec()));
		assert_eq!(store.read(b"unknown").await.unwrap(), None);
	}

	#[tokio::test]
	async fn last_write_wins_over_base() {
		let mut store = store().await;
		store.write(b"remote".to_vec(), Some(b"one".to_vec()));
		store.write(b"remote".to_vec(), Some(b"two".to_vec()));
		assert_eq!(store.read(b"remote").await.unwrap(), Some(b"two".to_vec()));

		store.write(b"remote".to_vec(), None);
		assert_eq!(store.read(b"remote").await.unwrap(), None);
	}

	#[tokio::test]
	async fn snapshot_is_isolated() {
		let mut original = store().await;
		original.write(b"shared".to_vec(), Some(b"a".to_vec()));

		let mut copy = original.snapshot();
		copy.write(b"shared".to_vec(), Some(b"b".to_vec()));
		copy.write(b"remote".to_vec(), None);

		assert_eq!(copy.changed_keys(&original), 2);
		assert_eq!(original.read(b"shared").await.unwrap(), Some(b"a".to_vec()));
		assert_eq!(original.read(b"remote").await.unwrap(), Some(b"base".to_vec()));
		assert_eq!(copy.read(b"shared").await.unwrap(), Some(b"b".to_vec()));

		original.write(b"later".to_vec(), Some(b"x".to_vec()));
		assert_eq!(copy.read(b"later").await.unwrap(), None);
	}

	#[tokio::test]
	async fn state_root_ignores_write_order() {
		let mut a = store().await;
		let mut b = a.snapshot();
		a.write(b"k1".to_vec(), Some(vec![1]));
		a.write(b"k2".to_vec(), None);
		b.write(b"k2".to_vec(), None);
		b.write(b"k1".to_vec(), Some(vec![1]));

		assert_eq!(a.state_root(), b.state_root());
		b.write(b"k1".to_vec(), Some(vec![2]));
		assert_ne!(a.state_root(), b.state_root());
	}
}
