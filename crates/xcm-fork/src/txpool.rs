// SPDX-License-Identifier: GPL-3.0

//! Pending extrinsics of one fork.
//!
//! A FIFO queue without validation or priority. The next block built on the fork
//! takes everything queued, in submission order.

use crate::TxPoolError;
use std::sync::RwLock;
use subxt::config::substrate::H256;

/// An extrinsic waiting for inclusion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingExtrinsic {
	/// Blake2-256 of `encoded`.
	pub hash: H256,
	pub encoded: Vec<u8>,
}

impl PendingExtrinsic {
	fn new(encoded: Vec<u8>) -> Self {
		Self { hash: extrinsic_hash(&encoded), encoded }
	}
}

/// Hash identifying an encoded extrinsic.
pub fn extrinsic_hash(encoded: &[u8]) -> H256 {
	H256::from(sp_core::blake2_256(encoded))
}

/// Thread-safe FIFO of extrinsics awaiting inclusion.
#[derive(Debug, Default)]
pub struct TxPool {
	pending: RwLock<Vec<PendingExtrinsic>>,
}

impl TxPool {
	pub fn new() -> Self {
		Self::default()
	}

	/// Queue an extrinsic. Returns its hash.
	pub fn submit(&self, extrinsic: Vec<u8>) -> Result<H256, TxPoolError> {
		let extrinsic = PendingExtrinsic::new(extrinsic);
		let hash = extrinsic.hash;
		self.pending.write().map_err(|err| TxPoolError::Lock(err.to_string()))?.push(extrinsic);
		Ok(hash)
	}

	/// Take all queued extrinsics in submission order.
	pub fn drain(&self) -> Result<Vec<PendingExtrinsic>, TxPoolError> {
		Ok(std::mem::take(
			&mut *self.pending.write().map_err(|err| TxPoolError::Lock(err.to_string()))?,
		))
	}

	/// Queued extrinsics, without removing them.
	pub fn pending(&self) -> Result<Vec<PendingExtrinsic>, TxPoolError> {
		Ok(self.pending.read().map_err(|err| TxPoolError::Lock(err.to_string()))?.clone())
	}

	/// Whether an extrinsic with `hash` is queued.
	pub fn contains(&self, hash: &H256) -> Result<bool, TxPoolError> {
		Ok(self
			.pending
			.read()
			.map_err(|err| TxPoolError::Lock(err.to_string()))?
			.iter()
			.any(|extrinsic| &extrinsic.hash == hash))
	}

	pub fn len(&self) -> Result<usize, TxPoolError> {
		Ok(self.pending.read().map_err(|err| TxPoolError::Lock(err.to_string()))?.len())
	}

	pub fn is_empty(&self) -> Result<bool, TxPoolError> {
		Ok(self.len()? == 0)
	}

	/// Drop everything queued.
	pub fn clear(&self) -> Result<(), TxPoolError> {
		self.drain().map(|_| ())
	}
}
