// SPDX-License-Identifier: GPL-3.0

//! Committed blocks of a forked chain.
//!
//! A [`Block`] is immutable once committed. It owns a [`StateStore`] snapshot of the
//! chain's storage after the block, and the ordered extrinsics, events, consumed
//! inbound messages and produced outbound messages.
//!
//! The fork point is a [`Block`] too: it carries the remote block's number and hash
//! and an empty override layer over the remote state.

use crate::{
	StateStore,
	message::{Channel, Message, OutboundChannel},
	runtime::Event,
};
use scale::{Compact, Encode};
use std::collections::BTreeMap;
use subxt::config::substrate::H256;

/// Reference to a committed block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockRef {
	Number(u32),
	Hash(H256),
}

impl From<u32> for BlockRef {
	fn from(number: u32) -> Self {
		Self::Number(number)
	}
}

impl From<H256> for BlockRef {
	fn from(hash: H256) -> Self {
		Self::Hash(hash)
	}
}

impl std::fmt::Display for BlockRef {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			BlockRef::Number(number) => write!(f, "#{number}"),
			BlockRef::Hash(hash) => write!(f, "{hash:?}"),
		}
	}
}

/// Summary of a committed block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
	pub number: u32,
	pub hash: H256,
	pub parent_hash: H256,
	pub state_root: H256,
	/// Timestamp inherent value in milliseconds.
	pub timestamp: u64,
}

/// Outcome of one extrinsic in a committed block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtrinsicRecord {
	/// Blake2-256 of the encoded extrinsic.
	pub hash: H256,
	/// Position in the block.
	pub index: u32,
	/// `Err` with the dispatch error if the call failed.
	pub result: Result<(), String>,
}

/// A committed block.
#[derive(Clone, Debug)]
pub struct Block {
	/// The block number (height).
	pub number: u32,
	/// The block hash.
	pub hash: H256,
	/// The parent block hash.
	pub parent_hash: H256,
	/// Commitment to the state after this block.
	pub state_root: H256,
	/// Timestamp inherent value in milliseconds.
	pub timestamp: u64,
	/// The extrinsics included in this block, in application order.
	pub extrinsics: Vec<Vec<u8>>,
	/// Dispatch outcome of each extrinsic.
	pub records: Vec<ExtrinsicRecord>,
	/// Events emitted while building the block, in execution order.
	pub events: Vec<Event>,
	/// Inbound messages consumed by this block, per channel.
	pub inbound: BTreeMap<Channel, Vec<Message>>,
	/// Outbound messages produced by this block, per channel, in emission order.
	pub outbound: BTreeMap<OutboundChannel, Vec<Message>>,
	/// Storage after this block.
	state: StateStore,
}

impl Block {
	/// The fork point: the remote block with no local changes.
	pub fn fork_point(
		number: u32,
		hash: H256,
		parent_hash: H256,
		timestamp: u64,
		state: StateStore,
	) -> Self {
		let state_root = state.state_root();
		Self {
			number,
			hash,
			parent_hash,
			state_root,
			timestamp,
			extrinsics: vec![],
			records: vec![],
			events: vec![],
			inbound: BTreeMap::new(),
			outbound: BTreeMap::new(),
			state,
		}
	}

	/// Assemble a child block. The hash is derived from the contents.
	#[allow(clippy::too_many_arguments)]
	pub(crate) fn child(
		parent: &Block,
		timestamp: u64,
		extrinsics: Vec<Vec<u8>>,
		records: Vec<ExtrinsicRecord>,
		events: Vec<Event>,
		inbound: BTreeMap<Channel, Vec<Message>>,
		outbound: BTreeMap<OutboundChannel, Vec<Message>>,
		state: StateStore,
	) -> Self {
		let number = parent.number + 1;
		let state_root = state.state_root();
		let hash = block_hash(parent.hash, number, state_root, timestamp, &extrinsics);
		Self {
			number,
			hash,
			parent_hash: parent.hash,
			state_root,
			timestamp,
			extrinsics,
			records,
			events,
			inbound,
			outbound,
			state,
		}
	}

	/// Summary of this block.
	pub fn header(&self) -> BlockHeader {
		BlockHeader {
			number: self.number,
			hash: self.hash,
			parent_hash: self.parent_hash,
			state_root: self.state_root,
			timestamp: self.timestamp,
		}
	}

	/// Storage after this block.
	pub fn state(&self) -> &StateStore {
		&self.state
	}

	/// All outbound messages, in channel order then emission order.
	pub fn outbound_messages(&self) -> impl Iterator<Item = &Message> {
		self.outbound.values().flatten()
	}
}

fn block_hash(
	parent_hash: H256,
	number: u32,
	state_root: H256,
	timestamp: u64,
	extrinsics: &[Vec<u8>],
) -> H256 {
	let extrinsics_root = sp_core::blake2_256(&extrinsics.encode());
	let preimage = (
		parent_hash.as_bytes(),
		Compact(number),
		state_root.as_bytes(),
		extrinsics_root,
		timestamp,
	)
		.encode();
	H256::from(sp_core::blake2_256(&preimage))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{RemoteStorageLayer, StorageCache, testing::InMemorySource};
	use std::sync::Arc;

	async fn fork_point() -> Block {
		let source = Arc::new(InMemorySource::new("relay"));
		let hash = source.genesis_hash();
		let cache = StorageCache::in_memory().await.unwrap();
		let state = StateStore::new(Arc::new(RemoteStorageLayer::new(source, cache, hash)), 7);
		Block::fork_point(7, hash, H256::zero(), 1_000, state)
	}

	fn child(parent: &Block, timestamp: u64, extrinsics: Vec<Vec<u8>>) -> Block {
		let mut state = parent.state().snapshot();
		state.set_block_height(parent.number + 1);
		Block::child(
			parent,
			timestamp,
			extrinsics,
			vec![],
			vec![],
			BTreeMap::new(),
			BTreeMap::new(),
			state,
		)
	}

	#[tokio::test]
	async fn child_links_to_parent() {
		let parent = fork_point().await;
		let block = child(&parent, 7_000, vec![]);
		assert_eq!(block.number, 8);
		assert_eq!(block.parent_hash, parent.hash);
		assert_ne!(block.hash, parent.hash);
		assert_eq!(block.header().timestamp, 7_000);
	}

	#[tokio::test]
	async fn hash_is_deterministic_in_contents() {
		let parent = fork_point().await;
		let a = child(&parent, 7_000, vec![vec![1]]);
		let b = child(&parent, 7_000, vec![vec![1]]);
		let c = child(&parent, 7_000, vec![vec![2]]);
		let d = child(&parent, 8_000, vec![vec![1]]);
		assert_eq!(a.hash, b.hash);
		assert_ne!(a.hash, c.hash);
		assert_ne!(a.hash, d.hash);
	}

	#[test]
	fn block_ref_conversions() {
		assert_eq!(BlockRef::from(3u32), BlockRef::Number(3));
		assert_eq!(BlockRef::from(H256::zero()), BlockRef::Hash(H256::zero()));
	}
}
