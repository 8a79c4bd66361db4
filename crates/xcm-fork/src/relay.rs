// SPDX-License-Identifier: GPL-3.0

//! Message routing between forks.
//!
//! [`MessageRelay`] watches every fork it links and, after each committed block,
//! appends the block's outbound messages to the pending-inbound queue of the
//! destination fork. It never builds blocks itself: a message is consumed only
//! when the destination builds its next block.
//!
//! ```text
//!   relay fork ──Downward(para)──► para fork      (vertical)
//!   para fork  ──Upward─────────► relay fork     (vertical)
//!   para A     ◄─Horizontal─────► para B         (horizontal)
//! ```
//!
//! Links are directed pairs of [`ChainId`]s. A message without a link, or whose
//! destination fork has been torn down, stays in the sender's outbound log and is
//! recorded in [`undelivered`](MessageRelay::undelivered).

use crate::{
	Block, ChainFork, ChainId,
	error::RelayError,
	fork::BlockObserver,
	message::{Channel, ChannelState, Message},
	strings::relay::links,
};
use std::{
	collections::{HashMap, HashSet},
	sync::{Arc, Mutex, MutexGuard, Weak},
};

/// How two forks are linked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkMode {
	/// Relay chain parent and parachain child: downward and upward channels.
	Vertical,
	/// Sibling parachains: horizontal channels in both directions.
	Horizontal,
}

/// A message the relay could not deliver.
#[derive(Clone, Debug, PartialEq)]
pub struct Undelivered {
	pub message: Message,
	pub error: RelayError,
}

#[derive(Default)]
struct RelayInner {
	forks: Mutex<HashMap<ChainId, Weak<ChainFork>>>,
	/// Directed `(from, to)` pairs.
	links: Mutex<HashSet<(ChainId, ChainId)>>,
	undelivered: Mutex<Vec<Undelivered>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RelayError> {
	mutex.lock().map_err(|e| RelayError::Lock(e.to_string()))
}

impl RelayInner {
	fn deliver(&self, message: &Message) -> Result<Channel, RelayError> {
		let destination = message.target().ok_or(RelayError::UnregisteredChannel {
			origin: message.origin,
			destination: message.destination.unwrap_or(ChainId::Relay),
		})?;
		if !lock(&self.links)?.contains(&(message.origin, destination)) {
			return Err(RelayError::UnregisteredChannel { origin: message.origin, destination });
		}
		let fork = lock(&self.forks)?
			.get(&destination)
			.and_then(Weak::upgrade)
			.ok_or(RelayError::DestinationGone(destination))?;
		fork.enqueue_inbound(message.clone())
	}
}

impl BlockObserver for RelayInner {
	fn on_block_committed(&self, chain: ChainId, block: &Block) {
		for message in block.outbound_messages() {
			match self.deliver(message) {
				Ok(channel) => log::debug!(
					"Relayed message #{} from {chain} block #{} to {:?} ({channel})",
					message.sequence,
					block.number,
					message.target(),
				),
				Err(error) => {
					log::warn!("Undelivered message #{} from {chain}: {error}", message.sequence);
					self.undelivered
						.lock()
						.unwrap_or_else(|e| e.into_inner())
						.push(Undelivered { message: message.clone(), error });
				},
			}
		}
	}
}

/// Routes outbound messages between linked forks.
///
/// Cheap to clone; clones share links and the undelivered log. Forks are held
/// weakly, so the relay never keeps a torn down or dropped fork alive.
#[derive(Clone, Default)]
pub struct MessageRelay {
	inner: Arc<RelayInner>,
}

impl std::fmt::Debug for MessageRelay {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let links = self.inner.links.lock().map(|links| links.len()).unwrap_or_default();
		f.debug_struct("MessageRelay").field("links", &links).finish_non_exhaustive()
	}
}

impl MessageRelay {
	pub fn new() -> Self {
		Self::default()
	}

	/// Link two forks.
	///
	/// For [`LinkMode::Vertical`], `a` must be the relay chain and `b` a parachain.
	/// For [`LinkMode::Horizontal`], both must be parachains. Linking the same pair
	/// again is a no-op.
	pub fn connect(
		&self,
		a: &Arc<ChainFork>,
		b: &Arc<ChainFork>,
		mode: LinkMode,
	) -> Result<(), RelayError> {
		let (from, to) = (a.chain(), b.chain());
		if from == to {
			return Err(RelayError::InvalidLink(from, to, links::SAME_CHAIN));
		}
		match mode {
			LinkMode::Vertical => {
				if from != ChainId::Relay {
					return Err(RelayError::InvalidLink(from, to, links::NOT_RELAY));
				}
				if to.para_id().is_none() {
					return Err(RelayError::InvalidLink(from, to, links::NOT_PARACHAIN));
				}
			},
			LinkMode::Horizontal =>
				if from.para_id().is_none() || to.para_id().is_none() {
					return Err(RelayError::InvalidLink(from, to, links::NOT_PARACHAIN));
				},
		}

		self.register(a)?;
		self.register(b)?;
		let mut links = lock(&self.inner.links)?;
		links.insert((from, to));
		links.insert((to, from));
		log::info!("Linked {} ({from}) and {} ({to}) {mode:?}", a.name(), b.name());
		Ok(())
	}

	/// Link a relay chain fork with one of its parachains.
	pub fn connect_vertical(
		&self,
		relay: &Arc<ChainFork>,
		para: &Arc<ChainFork>,
	) -> Result<(), RelayError> {
		self.connect(relay, para, LinkMode::Vertical)
	}

	/// Link every pair of `paras` horizontally.
	pub fn connect_parachains(&self, paras: &[Arc<ChainFork>]) -> Result<(), RelayError> {
		for (i, a) in paras.iter().enumerate() {
			for b in &paras[i + 1..] {
				self.connect(a, b, LinkMode::Horizontal)?;
			}
		}
		Ok(())
	}

	/// Track `fork` and observe its blocks, once per fork.
	fn register(&self, fork: &Arc<ChainFork>) -> Result<(), RelayError> {
		let mut forks = lock(&self.inner.forks)?;
		let known = forks
			.get(&fork.chain())
			.is_some_and(|known| std::ptr::eq(known.as_ptr(), Arc::as_ptr(fork)));
		if !known {
			forks.insert(fork.chain(), Arc::downgrade(fork));
			fork.add_observer(self.inner.clone());
		}
		Ok(())
	}

	/// Whether messages from `from` are delivered to `to`.
	pub fn is_linked(&self, from: ChainId, to: ChainId) -> bool {
		self.inner
			.links
			.lock()
			.map(|links| links.contains(&(from, to)))
			.unwrap_or_default()
	}

	/// Messages that could not be delivered, oldest first.
	pub fn undelivered(&self) -> Vec<Undelivered> {
		self.inner.undelivered.lock().unwrap_or_else(|e| e.into_inner()).clone()
	}

	/// Whether `channel` of the linked fork `chain` has messages waiting.
	pub fn channel_state(
		&self,
		chain: ChainId,
		channel: Channel,
	) -> Result<ChannelState, RelayError> {
		let fork = lock(&self.inner.forks)?
			.get(&chain)
			.and_then(Weak::upgrade)
			.filter(|fork| !fork.is_torn_down())
			.ok_or(RelayError::DestinationGone(chain))?;
		fork.inbound_state(channel).map_err(|e| RelayError::Lock(e.to_string()))
	}
}
