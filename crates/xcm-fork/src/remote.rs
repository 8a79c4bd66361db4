// SPDX-License-Identifier: GPL-3.0

//! Remote storage layer for lazy-loading state from live chains.
//!
//! [`RemoteStorageLayer`] is the base snapshot every [`StateStore`](crate::StateStore)
//! of a fork reads through to. Values are fetched on demand rather than synced up front.
//!
//! ```text
//! get(key) ─────► Cache Hit? ──── Yes ────► Return cached value
//!                      │
//!                      No
//!                      ▼
//!            Fetch from source (once)
//!                      ▼
//!               Store in cache
//!                      ▼
//!                Return value
//! ```

use crate::{
	StorageCache,
	error::{CacheError, FetchError},
	storage::{ChainSource, RemoteHeader},
};
use std::sync::{Arc, RwLock};
use subxt::config::substrate::H256;
use url::Url;

/// Remote storage layer that lazily fetches state at a fixed block.
///
/// Reads check the cache first and only reach the remote source when the value
/// isn't cached. Fetched values, including absent ones, are cached. A failed fetch
/// is not retried.
///
/// The source can be released with [`close`](Self::close); later cache misses fail
/// with [`FetchError::Closed`].
#[derive(Debug)]
pub struct RemoteStorageLayer {
	source: RwLock<Option<Arc<dyn ChainSource>>>,
	endpoint: Url,
	cache: StorageCache,
	block_hash: H256,
}

impl RemoteStorageLayer {
	/// Create a new remote storage layer.
	///
	/// # Arguments
	/// * `source` - Connected source of the live chain
	/// * `cache` - Storage cache for persisting fetched values
	/// * `block_hash` - Block hash to query state at
	pub fn new(source: Arc<dyn ChainSource>, cache: StorageCache, block_hash: H256) -> Self {
		let endpoint = source.endpoint().clone();
		Self { source: RwLock::new(Some(source)), endpoint, cache, block_hash }
	}

	/// Get the block hash this layer is querying.
	pub fn block_hash(&self) -> H256 {
		self.block_hash
	}

	/// Endpoint of the remote source.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Get a reference to the underlying cache.
	pub fn cache(&self) -> &StorageCache {
		&self.cache
	}

	/// Whether the remote source has been released.
	pub fn is_closed(&self) -> bool {
		self.source.read().unwrap_or_else(|e| e.into_inner()).is_none()
	}

	/// Release the remote source. Idempotent.
	pub fn close(&self) {
		let released = self.source.write().unwrap_or_else(|e| e.into_inner()).take();
		if released.is_some() {
			log::debug!("Closed remote source {} at {:?}", self.endpoint, self.block_hash);
		}
	}

	fn source(&self) -> Result<Arc<dyn ChainSource>, FetchError> {
		self.source
			.read()
			.unwrap_or_else(|e| e.into_inner())
			.clone()
			.ok_or_else(|| FetchError::Closed { block: format!("{:?}", self.block_hash) })
	}

	/// Get a storage value, fetching from the remote source if not cached.
	///
	/// # Returns
	/// * `Ok(Some(value))` - Storage exists with value
	/// * `Ok(None)` - Storage key doesn't exist (empty)
	/// * `Err(_)` - Remote or cache error
	pub async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, FetchError> {
		if let Some(cached) = self.cache.get_storage(self.block_hash, key).await? {
			return Ok(cached);
		}

		let source = self.source()?;
		log::debug!("Fetching 0x{} at {:?}", hex::encode(key), self.block_hash);
		let value = source.storage(key, self.block_hash).await?;

		self.cache.set_storage(self.block_hash, key, value.as_deref()).await?;

		Ok(value)
	}

	/// Get multiple storage values in a batch, fetching uncached keys remotely.
	///
	/// Returns results in the same order as the input keys.
	pub async fn get_batch(&self, keys: &[&[u8]]) -> Result<Vec<Option<Vec<u8>>>, FetchError> {
		if keys.is_empty() {
			return Ok(vec![]);
		}

		let cached_results = self.cache.get_storage_batch(self.block_hash, keys).await?;

		let (uncached_indices, uncached_keys): (Vec<usize>, Vec<&[u8]>) = cached_results
			.iter()
			.enumerate()
			.filter(|(_, cached)| cached.is_none())
			.map(|(i, _)| (i, keys[i]))
			.unzip();

		let mut results: Vec<Option<Vec<u8>>> =
			cached_results.into_iter().map(Option::flatten).collect();
		if uncached_keys.is_empty() {
			return Ok(results);
		}

		let source = self.source()?;
		let fetched_values = source.storage_batch(&uncached_keys, self.block_hash).await?;

		let cache_entries: Vec<(&[u8], Option<&[u8]>)> = uncached_keys
			.iter()
			.zip(fetched_values.iter())
			.map(|(k, v)| (*k, v.as_deref()))
			.collect();
		self.cache.set_storage_batch(self.block_hash, &cache_entries).await?;

		for (idx, value) in uncached_indices.into_iter().zip(fetched_values) {
			results[idx] = value;
		}

		Ok(results)
	}

	/// Header of the fork block, from the cache or the remote source.
	pub async fn header(&self) -> Result<RemoteHeader, FetchError> {
		if let Some(info) = self.cache.get_block(self.block_hash).await? {
			return RemoteHeader::from_encoded(info.header)
				.map_err(|e| CacheError::DataCorruption(e.to_string()).into());
		}
		let header = self.source()?.header(self.block_hash).await?;
		self.cache
			.cache_block(self.block_hash, header.number, header.parent_hash, &header.encoded)
			.await?;
		Ok(header)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::InMemorySource;

	async fn layer(source: Arc<InMemorySource>) -> RemoteStorageLayer {
		let cache = StorageCache::in_memory().await.unwrap();
		let hash = source.genesis_hash();
		RemoteStorageLayer::new(source, cache, hash)
	}

	#[tokio::test]
	async fn get_fetches_once_and_caches() {
		let source = Arc::new(InMemorySource::new("relay"));
		source.insert(b"key".to_vec(), b"value".to_vec());
		let layer = layer(source.clone()).await;

		assert_eq!(layer.get(b"key").await.unwrap(), Some(b"value".to_vec()));
		assert_eq!(layer.get(b"key").await.unwrap(), Some(b"value".to_vec()));
		assert_eq!(source.storage_requests(), 1);
	}

	#[tokio::test]
	async fn absent_values_are_cached() {
		let source = Arc::new(InMemorySource::new("relay"));
		let layer = layer(source.clone()).await;

		assert_eq!(layer.get(b"missing").await.unwrap(), None);
		assert_eq!(layer.get(b"missing").await.unwrap(), None);
		assert_eq!(source.storage_requests(), 1);
	}

	#[tokio::test]
	async fn get_batch_merges_cached_and_fetched() {
		let source = Arc::new(InMemorySource::new("relay"));
		source.insert(b"a".to_vec(), b"1".to_vec());
		source.insert(b"b".to_vec(), b"2".to_vec());
		let layer = layer(source.clone()).await;

		layer.get(b"a").await.unwrap();
		let values = layer.get_batch(&[b"a", b"b", b"c"]).await.unwrap();
		assert_eq!(values, vec![Some(b"1".to_vec()), Some(b"2".to_vec()), None]);
	}

	#[tokio::test]
	async fn fetch_failure_is_not_retried() {
		let source = Arc::new(InMemorySource::new("relay"));
		source.insert(b"key".to_vec(), b"value".to_vec());
		source.fail_storage(true);
		let layer = layer(source.clone()).await;

		assert!(matches!(layer.get(b"key").await, Err(FetchError::Rpc(_))));
		assert_eq!(source.storage_requests(), 1);
	}

	#[tokio::test]
	async fn closed_layer_still_serves_cache() {
		let source = Arc::new(InMemorySource::new("relay"));
		source.insert(b"key".to_vec(), b"value".to_vec());
		let layer = layer(source).await;

		layer.get(b"key").await.unwrap();
		layer.close();
		layer.close();
		assert!(layer.is_closed());

		assert_eq!(layer.get(b"key").await.unwrap(), Some(b"value".to_vec()));
		assert!(matches!(layer.get(b"other").await, Err(FetchError::Closed { .. })));
	}
}
