// SPDX-License-Identifier: GPL-3.0

//! SQLite-based storage cache for fork operations.
//!
//! Provides persistent caching of storage values fetched from live chains,
//! enabling fast restarts and reducing RPC calls. When no database path is
//! configured the cache lives in memory and is dropped with the fork.

use crate::{
	error::CacheError,
	models::{BlockRow, StorageRow},
	schema::{blocks, storage},
	strings::cache::{errors, pragmas, urls},
};
use diesel::{
	ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper, sqlite::SqliteConnection,
};
use diesel_async::{
	RunQueryDsl, SimpleAsyncConnection,
	pooled_connection::{
		AsyncDieselConnectionManager,
		bb8::{Pool, PooledConnection},
	},
	sync_connection_wrapper::SyncConnectionWrapper,
};
use std::{collections::HashMap, path::Path};
use subxt::config::substrate::H256;

type Connection = SyncConnectionWrapper<SqliteConnection>;

/// Maximum number of connections in the SQLite connection pool.
const MAX_POOL_CONNECTIONS: u32 = 5;

/// Connection pool size for in-memory databases.
///
/// Must be 1 because SQLite in-memory databases are connection-specific:
/// each connection creates a separate, isolated database instance.
const MEMORY_POOL_CONNECTIONS: u32 = 1;

/// Information about a cached block.
///
/// Block numbers are stored as `i64` by SQLite and converted back to `u32`.
/// Values outside the `u32` range indicate corruption and return
/// [`CacheError::DataCorruption`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
	/// Block hash.
	pub hash: H256,
	/// Block number.
	pub number: u32,
	/// SCALE-encoded block header.
	pub header: Vec<u8>,
	/// Parent block hash.
	pub parent_hash: H256,
}

/// SQLite-backed cache for storage values and block headers.
///
/// Cheap to clone: clones share the same connection pool.
#[derive(Clone)]
pub struct StorageCache {
	pool: Pool<Connection>,
}

impl std::fmt::Debug for StorageCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StorageCache").field("state", &self.pool.state()).finish()
	}
}

impl StorageCache {
	/// Open or create a cache database at the specified path.
	///
	/// Creates the parent directory if it doesn't exist.
	pub async fn open(path: &Path) -> Result<Self, CacheError> {
		if let Some(parent) = path.parent() &&
			!parent.as_os_str().is_empty()
		{
			tokio::fs::create_dir_all(parent).await?;
		}
		let url = path
			.to_str()
			.ok_or_else(|| CacheError::DataCorruption(errors::NON_UTF8_PATH.into()))?;

		let manager = AsyncDieselConnectionManager::<Connection>::new(url);
		let pool = Pool::builder().max_size(MAX_POOL_CONNECTIONS).build(manager).await?;

		let cache = Self { pool };
		{
			let mut conn = cache.conn().await?;
			conn.batch_execute(pragmas::JOURNAL_MODE_WAL).await?;
			conn.batch_execute(CREATE_TABLES_SQL).await?;
		}
		log::debug!("Opened storage cache at {}", path.display());
		Ok(cache)
	}

	/// Open an in-memory cache.
	pub async fn in_memory() -> Result<Self, CacheError> {
		let manager = AsyncDieselConnectionManager::<Connection>::new(urls::IN_MEMORY);
		// The single connection is the database: it must never be recycled.
		let pool = Pool::builder()
			.max_size(MEMORY_POOL_CONNECTIONS)
			.idle_timeout(None)
			.max_lifetime(None)
			.build(manager)
			.await?;

		let cache = Self { pool };
		cache.conn().await?.batch_execute(CREATE_TABLES_SQL).await?;
		Ok(cache)
	}

	async fn conn(&self) -> Result<PooledConnection<'_, Connection>, CacheError> {
		let mut conn = self.pool.get().await?;
		conn.batch_execute(pragmas::BUSY_TIMEOUT).await?;
		Ok(conn)
	}

	/// Get a cached storage value.
	///
	/// # Returns
	/// * `Ok(Some(Some(value)))` - Cached with a value
	/// * `Ok(Some(None))` - Cached as empty (storage key exists but has no value)
	/// * `Ok(None)` - Not in cache (unknown)
	pub async fn get_storage(
		&self,
		block_hash: H256,
		key: &[u8],
	) -> Result<Option<Option<Vec<u8>>>, CacheError> {
		let mut conn = self.conn().await?;
		let row = storage::table
			.filter(storage::block_hash.eq(block_hash.as_bytes()))
			.filter(storage::key.eq(key))
			.select((storage::value, storage::is_empty))
			.first::<(Option<Vec<u8>>, bool)>(&mut *conn)
			.await
			.optional()?;

		Ok(row.map(|(value, is_empty)| if is_empty { None } else { value }))
	}

	/// Cache a storage value.
	///
	/// `value` is `None` when the key holds nothing at `block_hash`, which is
	/// remembered so the remote is not asked again.
	pub async fn set_storage(
		&self,
		block_hash: H256,
		key: &[u8],
		value: Option<&[u8]>,
	) -> Result<(), CacheError> {
		let row = StorageRow {
			block_hash: block_hash.as_bytes().to_vec(),
			key: key.to_vec(),
			value: value.map(<[u8]>::to_vec),
			is_empty: value.is_none(),
		};
		let mut conn = self.conn().await?;
		diesel::replace_into(storage::table).values(&row).execute(&mut *conn).await?;
		Ok(())
	}

	/// Get multiple cached storage values in a batch.
	///
	/// Returns results in the same order as the input keys.
	pub async fn get_storage_batch(
		&self,
		block_hash: H256,
		keys: &[&[u8]],
	) -> Result<Vec<Option<Option<Vec<u8>>>>, CacheError> {
		if keys.is_empty() {
			return Ok(vec![]);
		}

		let wanted: Vec<Vec<u8>> = keys.iter().map(|k| k.to_vec()).collect();
		let mut conn = self.conn().await?;
		let rows = storage::table
			.filter(storage::block_hash.eq(block_hash.as_bytes()))
			.filter(storage::key.eq_any(wanted))
			.select((storage::key, storage::value, storage::is_empty))
			.load::<(Vec<u8>, Option<Vec<u8>>, bool)>(&mut *conn)
			.await?;

		// SQLite doesn't guarantee result order matches the IN clause order.
		let cached: HashMap<Vec<u8>, Option<Vec<u8>>> = rows
			.into_iter()
			.map(|(key, value, is_empty)| (key, if is_empty { None } else { value }))
			.collect();

		Ok(keys.iter().map(|key| cached.get(*key).cloned()).collect())
	}

	/// Cache multiple storage values in a batch.
	pub async fn set_storage_batch(
		&self,
		block_hash: H256,
		entries: &[(&[u8], Option<&[u8]>)],
	) -> Result<(), CacheError> {
		if entries.is_empty() {
			return Ok(());
		}

		let mut conn = self.conn().await?;
		for (key, value) in entries {
			let row = StorageRow {
				block_hash: block_hash.as_bytes().to_vec(),
				key: key.to_vec(),
				value: value.map(<[u8]>::to_vec),
				is_empty: value.is_none(),
			};
			diesel::replace_into(storage::table).values(&row).execute(&mut *conn).await?;
		}
		Ok(())
	}

	/// Cache block metadata.
	pub async fn cache_block(
		&self,
		hash: H256,
		number: u32,
		parent_hash: H256,
		header: &[u8],
	) -> Result<(), CacheError> {
		let row = BlockRow {
			hash: hash.as_bytes().to_vec(),
			number: number.into(),
			parent_hash: parent_hash.as_bytes().to_vec(),
			header: header.to_vec(),
		};
		let mut conn = self.conn().await?;
		diesel::replace_into(blocks::table).values(&row).execute(&mut *conn).await?;
		Ok(())
	}

	/// Get cached block metadata by hash.
	pub async fn get_block(&self, hash: H256) -> Result<Option<BlockInfo>, CacheError> {
		let mut conn = self.conn().await?;
		let row = blocks::table
			.filter(blocks::hash.eq(hash.as_bytes()))
			.select(BlockRow::as_select())
			.first(&mut *conn)
			.await
			.optional()?;
		row.map(BlockInfo::try_from).transpose()
	}
}

impl TryFrom<BlockRow> for BlockInfo {
	type Error = CacheError;

	fn try_from(row: BlockRow) -> Result<Self, Self::Error> {
		let number = u32::try_from(row.number)
			.map_err(|_| CacheError::DataCorruption(errors::BLOCK_NUMBER_OUT_OF_U32_RANGE.into()))?;
		Ok(Self {
			hash: hash_from_bytes(&row.hash)?,
			number,
			parent_hash: hash_from_bytes(&row.parent_hash)?,
			header: row.header,
		})
	}
}

fn hash_from_bytes(bytes: &[u8]) -> Result<H256, CacheError> {
	if bytes.len() != 32 {
		return Err(CacheError::DataCorruption(errors::INVALID_HASH_LENGTH.into()));
	}
	Ok(H256::from_slice(bytes))
}

/// SQL to create the cache tables.
///
/// - `storage`: one row per (block, key). `is_empty` distinguishes "cached as
///   empty" from "not cached".
/// - `blocks`: block metadata, looked up by hash or number.
const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS storage (
    block_hash BLOB NOT NULL,
    key BLOB NOT NULL,
    value BLOB,
    is_empty BOOLEAN NOT NULL DEFAULT FALSE,
    PRIMARY KEY (block_hash, key)
);

CREATE INDEX IF NOT EXISTS idx_storage_block ON storage(block_hash);

CREATE TABLE IF NOT EXISTS blocks (
    hash BLOB PRIMARY KEY,
    number BIGINT NOT NULL,
    parent_hash BLOB NOT NULL,
    header BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_blocks_number ON blocks(number);
"#;
