// SPDX-License-Identifier: GPL-3.0

//! Cross-chain messages, channels and pending-inbound queues.
//!
//! Channels are named from one side only:
//!
//! - [`OutboundChannel`] is where a sending chain's block puts a message
//!   (`Downward(para)` from the relay chain, `Upward` and `Horizontal(sibling)` from a
//!   parachain).
//! - [`Channel`] is the pending-inbound queue of the receiving chain
//!   (`Downward`, `Upward(from_para)`, `Horizontal(from_para)`).
//!
//! [`InboundQueues`] keeps one FIFO per inbound channel and enforces strictly
//! increasing sequence numbers per channel.

use crate::error::{ConfigError, RelayError};
use scale::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Default message cap per channel per block.
pub const DEFAULT_MAX_MESSAGES: usize = 10;

/// Default payload byte cap per channel per block.
pub const DEFAULT_MAX_BYTES: usize = 100 * 1024;

/// Identifier of a simulated chain.
#[derive(
	Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode, Serialize, Deserialize,
)]
pub enum ChainId {
	/// The relay chain.
	Relay,
	/// A parachain with its para id.
	Para(u32),
}

impl ChainId {
	/// Para id, if this is a parachain.
	pub fn para_id(&self) -> Option<u32> {
		match self {
			ChainId::Relay => None,
			ChainId::Para(id) => Some(*id),
		}
	}
}

impl std::fmt::Display for ChainId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ChainId::Relay => write!(f, "relay"),
			ChainId::Para(id) => write!(f, "para({id})"),
		}
	}
}

/// Direction class of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
	/// Relay chain to parachain.
	Downward,
	/// Parachain to relay chain.
	Upward,
	/// Parachain to sibling parachain.
	Horizontal,
}

/// Pending-inbound channel, from the receiver's side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
	/// Messages from the relay chain.
	Downward,
	/// Messages from the given parachain to the relay chain.
	Upward(u32),
	/// Messages from the given sibling parachain.
	Horizontal(u32),
}

impl Channel {
	/// Kind of messages this channel carries.
	pub fn kind(&self) -> MessageKind {
		match self {
			Channel::Downward => MessageKind::Downward,
			Channel::Upward(_) => MessageKind::Upward,
			Channel::Horizontal(_) => MessageKind::Horizontal,
		}
	}
}

impl std::fmt::Display for Channel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Channel::Downward => write!(f, "downward"),
			Channel::Upward(from) => write!(f, "upward from {from}"),
			Channel::Horizontal(from) => write!(f, "horizontal from {from}"),
		}
	}
}

/// Outbound channel, from the sender's side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutboundChannel {
	/// To the given parachain.
	Downward(u32),
	/// To the relay chain.
	Upward,
	/// To the given sibling parachain.
	Horizontal(u32),
}

impl OutboundChannel {
	/// Destination chain of this channel.
	pub fn destination(&self) -> ChainId {
		match self {
			OutboundChannel::Downward(para) | OutboundChannel::Horizontal(para) =>
				ChainId::Para(*para),
			OutboundChannel::Upward => ChainId::Relay,
		}
	}
}

/// A cross-chain message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
	/// Direction class.
	pub kind: MessageKind,
	/// Sending chain.
	pub origin: ChainId,
	/// Receiving chain; `None` for upward messages, which always go to the relay chain.
	pub destination: Option<ChainId>,
	/// Position on the channel, strictly increasing.
	pub sequence: u64,
	/// Opaque payload.
	pub payload: Vec<u8>,
	/// Number of the sending chain's block that produced the message.
	pub sent_at: u32,
}

impl Message {
	/// The receiver's inbound channel, or `None` if kind and origin disagree.
	pub fn inbound_channel(&self) -> Option<Channel> {
		match (self.kind, self.origin) {
			(MessageKind::Downward, ChainId::Relay) => Some(Channel::Downward),
			(MessageKind::Upward, ChainId::Para(from)) => Some(Channel::Upward(from)),
			(MessageKind::Horizontal, ChainId::Para(from)) => Some(Channel::Horizontal(from)),
			_ => None,
		}
	}

	/// The sender's outbound channel, or `None` if the message is malformed.
	pub fn outbound_channel(&self) -> Option<OutboundChannel> {
		match (self.kind, self.destination) {
			(MessageKind::Downward, Some(ChainId::Para(to))) => Some(OutboundChannel::Downward(to)),
			(MessageKind::Upward, _) => Some(OutboundChannel::Upward),
			(MessageKind::Horizontal, Some(ChainId::Para(to))) =>
				Some(OutboundChannel::Horizontal(to)),
			_ => None,
		}
	}

	/// The chain this message must be delivered to.
	pub fn target(&self) -> Option<ChainId> {
		self.outbound_channel().map(|channel| channel.destination())
	}
}

/// A manually scripted downward message: relay block number and payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownwardMessage {
	/// Relay chain block the message claims to be sent at.
	pub sent_at: u32,
	/// Opaque payload.
	pub msg: Vec<u8>,
}

/// Per-block cap for one channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLimit {
	/// Maximum number of messages.
	pub max_messages: usize,
	/// Maximum total payload bytes.
	pub max_bytes: usize,
}

impl Default for ChannelLimit {
	fn default() -> Self {
		Self { max_messages: DEFAULT_MAX_MESSAGES, max_bytes: DEFAULT_MAX_BYTES }
	}
}

/// Per-block caps for every channel kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLimits {
	pub downward: ChannelLimit,
	pub upward: ChannelLimit,
	pub horizontal: ChannelLimit,
}

impl ChannelLimits {
	/// The same limit for every channel kind.
	pub fn uniform(limit: ChannelLimit) -> Self {
		Self { downward: limit, upward: limit, horizontal: limit }
	}

	/// Limit of the channel.
	pub fn for_channel(&self, channel: Channel) -> ChannelLimit {
		match channel.kind() {
			MessageKind::Downward => self.downward,
			MessageKind::Upward => self.upward,
			MessageKind::Horizontal => self.horizontal,
		}
	}

	/// Reject limits that would never let a channel drain.
	pub fn validate(&self) -> Result<(), ConfigError> {
		for limit in [self.downward, self.upward, self.horizontal] {
			if limit.max_messages == 0 {
				return Err(ConfigError::ZeroLimit("max_messages"));
			}
			if limit.max_bytes == 0 {
				return Err(ConfigError::ZeroLimit("max_bytes"));
			}
		}
		Ok(())
	}
}

/// Whether a channel has messages waiting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
	Idle,
	HasPending,
}

/// FIFO pending-inbound queues of one chain.
#[derive(Debug, Default)]
pub struct InboundQueues {
	queues: BTreeMap<Channel, VecDeque<Message>>,
	last_sequence: HashMap<Channel, u64>,
}

impl InboundQueues {
	/// Append a message to the back of its channel.
	pub fn push(&mut self, message: Message) -> Result<Channel, RelayError> {
		let channel = message.inbound_channel().ok_or(RelayError::UnregisteredChannel {
			origin: message.origin,
			destination: message.destination.unwrap_or(ChainId::Relay),
		})?;
		if let Some(&last) = self.last_sequence.get(&channel) &&
			message.sequence <= last
		{
			return Err(RelayError::OutOfOrder { channel, last, sequence: message.sequence });
		}
		self.last_sequence.insert(channel, message.sequence);
		self.queues.entry(channel).or_default().push_back(message);
		Ok(channel)
	}

	/// Messages the next block would consume, without removing them.
	///
	/// Each channel yields its front messages up to its limit. A single message
	/// larger than the byte cap is still taken alone, so a channel always drains.
	/// Empty channels are omitted.
	pub fn peek_drain(&self, limits: &ChannelLimits) -> BTreeMap<Channel, Vec<Message>> {
		let mut drained = BTreeMap::new();
		for (channel, queue) in &self.queues {
			let limit = limits.for_channel(*channel);
			let mut bytes = 0usize;
			let mut taken = Vec::new();
			for message in queue {
				if taken.len() == limit.max_messages {
					break;
				}
				let size = message.payload.len();
				if !taken.is_empty() && bytes + size > limit.max_bytes {
					break;
				}
				bytes += size;
				taken.push(message.clone());
			}
			if !taken.is_empty() {
				drained.insert(*channel, taken);
			}
		}
		drained
	}

	/// Remove the messages returned by [`peek_drain`](Self::peek_drain) once the block is
	/// committed.
	pub fn commit_drain(&mut self, drained: &BTreeMap<Channel, Vec<Message>>) {
		for (channel, messages) in drained {
			if let Some(queue) = self.queues.get_mut(channel) {
				for message in messages {
					if queue.front() == Some(message) {
						queue.pop_front();
					}
				}
				if queue.is_empty() {
					self.queues.remove(channel);
				}
			}
		}
	}

	/// Messages waiting on `channel`, oldest first.
	pub fn pending(&self, channel: Channel) -> Vec<Message> {
		self.queues.get(&channel).map(|q| q.iter().cloned().collect()).unwrap_or_default()
	}

	/// All channels with waiting messages.
	pub fn channels(&self) -> Vec<Channel> {
		self.queues.keys().copied().collect()
	}

	/// State of `channel`.
	pub fn state(&self, channel: Channel) -> ChannelState {
		match self.queues.get(&channel) {
			Some(queue) if !queue.is_empty() => ChannelState::HasPending,
			_ => ChannelState::Idle,
		}
	}

	/// Whether every channel is idle.
	pub fn is_empty(&self) -> bool {
		self.queues.is_empty()
	}

	/// Drop every waiting message. Sequence tracking is kept.
	pub fn clear(&mut self) {
		self.queues.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn hrmp(from: u32, sequence: u64, size: usize) -> Message {
		Message {
			kind: MessageKind::Horizontal,
			origin: ChainId::Para(from),
			destination: Some(ChainId::Para(2000)),
			sequence,
			payload: vec![0; size],
			sent_at: 1,
		}
	}

	#[test]
	fn channels_are_derived_from_kind_and_ends() {
		let message = hrmp(1000, 1, 1);
		assert_eq!(message.inbound_channel(), Some(Channel::Horizontal(1000)));
		assert_eq!(message.outbound_channel(), Some(OutboundChannel::Horizontal(2000)));
		assert_eq!(message.target(), Some(ChainId::Para(2000)));

		let bad = Message { origin: ChainId::Relay, ..message };
		assert_eq!(bad.inbound_channel(), None);
	}

	#[test]
	fn out_of_order_sequences_are_rejected() {
		let mut queues = InboundQueues::default();
		queues.push(hrmp(1000, 1, 1)).unwrap();
		queues.push(hrmp(1000, 2, 1)).unwrap();
		assert!(matches!(queues.push(hrmp(1000, 2, 1)), Err(RelayError::OutOfOrder { .. })));
		// Other channels keep their own numbering.
		queues.push(hrmp(1001, 1, 1)).unwrap();
	}

	#[test]
	fn drain_respects_message_cap_and_keeps_order() {
		let mut queues = InboundQueues::default();
		for sequence in 1..=5 {
			queues.push(hrmp(1000, sequence, 1)).unwrap();
		}
		let limits = ChannelLimits::uniform(ChannelLimit { max_messages: 2, max_bytes: 1024 });

		let mut seen = Vec::new();
		while !queues.is_empty() {
			let drained = queues.peek_drain(&limits);
			let batch = &drained[&Channel::Horizontal(1000)];
			assert!(batch.len() <= 2);
			seen.extend(batch.iter().map(|m| m.sequence));
			queues.commit_drain(&drained);
		}
		assert_eq!(seen, vec![1, 2, 3, 4, 5]);
	}

	#[test]
	fn oversized_message_drains_alone() {
		let mut queues = InboundQueues::default();
		queues.push(hrmp(1000, 1, 50)).unwrap();
		queues.push(hrmp(1000, 2, 5)).unwrap();
		let limits = ChannelLimits::uniform(ChannelLimit { max_messages: 10, max_bytes: 10 });

		let drained = queues.peek_drain(&limits);
		assert_eq!(drained[&Channel::Horizontal(1000)].len(), 1);
		queues.commit_drain(&drained);
		assert_eq!(queues.pending(Channel::Horizontal(1000))[0].sequence, 2);
	}

	#[test]
	fn peek_does_not_consume() {
		let mut queues = InboundQueues::default();
		queues.push(hrmp(1000, 1, 1)).unwrap();
		let _ = queues.peek_drain(&ChannelLimits::default());
		assert_eq!(queues.state(Channel::Horizontal(1000)), ChannelState::HasPending);
		assert_eq!(queues.state(Channel::Downward), ChannelState::Idle);
	}

	#[test]
	fn zero_limits_are_invalid() {
		let limits = ChannelLimits::uniform(ChannelLimit { max_messages: 0, max_bytes: 1 });
		assert!(limits.validate().is_err());
		assert!(ChannelLimits::default().validate().is_ok());
	}
}
