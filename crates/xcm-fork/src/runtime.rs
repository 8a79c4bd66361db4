// SPDX-License-Identifier: GPL-3.0

//! The runtime collaborator contract.
//!
//! State transitions are opaque to the engine. A [`Runtime`] receives the block's
//! working [`StateStore`] and applies inherents and extrinsics to it, returning the
//! events it emitted. The engine only interprets events whose `(section, method)`
//! is listed in [`MessageTags`]: those announce an outbound cross-chain message.

use crate::{
	ChainId, StateStore,
	message::{Channel, Message, MessageKind},
	strings::{inherent::messages, relay::tags},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc};
use subxt::config::substrate::H256;
use thiserror::Error;

/// Fatal runtime failure. Aborts the block build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct RuntimeFault(pub String);

/// When an event was emitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
	/// While applying the inherent at this index.
	Inherent(u32),
	/// While applying the extrinsic at this index.
	ApplyExtrinsic(u32),
}

/// An event emitted by the runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
	pub phase: Phase,
	/// Pallet name, e.g. `XcmpQueue`.
	pub section: String,
	/// Event name, e.g. `XcmpMessageSent`.
	pub method: String,
	pub data: serde_json::Value,
}

impl Event {
	/// Event with a placeholder phase; the builder assigns the real one.
	pub fn new(section: &str, method: &str, data: serde_json::Value) -> Self {
		Self {
			phase: Phase::Inherent(0),
			section: section.to_string(),
			method: method.to_string(),
			data,
		}
	}

	/// Whether the event matches `section.method`.
	pub fn is(&self, section: &str, method: &str) -> bool {
		self.section == section && self.method == method
	}
}

/// Block-level input supplied by the author.
#[derive(Clone, Debug, PartialEq)]
pub enum Inherent {
	/// Set the block timestamp (milliseconds).
	Timestamp(u64),
	/// Inbound messages of one channel, oldest first.
	InboundMessages { channel: Channel, messages: Vec<Message> },
}

impl Inherent {
	/// Identifier for logging and fault reports.
	pub fn identifier(&self) -> &'static str {
		match self {
			Inherent::Timestamp(_) => crate::strings::inherent::timestamp::IDENTIFIER,
			Inherent::InboundMessages { channel, .. } => match channel.kind() {
				MessageKind::Downward => messages::DOWNWARD_IDENTIFIER,
				MessageKind::Upward => messages::UPWARD_IDENTIFIER,
				MessageKind::Horizontal => messages::HORIZONTAL_IDENTIFIER,
			},
		}
	}
}

/// What the runtime knows about the block being built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockContext {
	pub chain: ChainId,
	pub number: u32,
	pub parent_hash: H256,
	pub timestamp: u64,
}

/// Result of executing one extrinsic.
#[derive(Clone, Debug, PartialEq)]
pub struct ApplyOutcome {
	/// Events emitted, in order. Kept even when dispatch failed.
	pub events: Vec<Event>,
	/// `Err` with the dispatch error when the call ran but failed.
	pub result: Result<(), String>,
}

/// State-transition function of a chain.
#[async_trait]
pub trait Runtime: Send + Sync {
	/// Identifier for logging.
	fn identifier(&self) -> &str;

	/// Apply an inherent to `state`.
	async fn apply_inherent(
		&self,
		state: &mut StateStore,
		context: &BlockContext,
		inherent: &Inherent,
	) -> Result<Vec<Event>, RuntimeFault>;

	/// Apply an encoded extrinsic to `state`.
	///
	/// A dispatch failure is reported in [`ApplyOutcome::result`]; `state` may then
	/// contain partial writes, which the builder discards.
	async fn apply_extrinsic(
		&self,
		state: &mut StateStore,
		context: &BlockContext,
		extrinsic: &[u8],
	) -> Result<ApplyOutcome, RuntimeFault>;
}

/// Where the runtime code came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodeSource {
	/// The `:code` storage of the fork block.
	OnChain,
	/// A local file given as override.
	Override(PathBuf),
}

/// Runtime code handed to a [`RuntimeFactory`].
#[derive(Clone, Debug)]
pub struct RuntimeCode {
	pub code: Vec<u8>,
	pub source: CodeSource,
}

/// Options for instantiating a runtime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
	/// Accept any signature.
	pub mock_signature_host: bool,
	/// Runtime log verbosity, 0 (off) to 5 (trace).
	pub log_level: u32,
}

/// Creates a [`Runtime`] from code.
pub trait RuntimeFactory: Send + Sync {
	/// Instantiate `code` for `chain`.
	fn create(
		&self,
		chain: ChainId,
		code: RuntimeCode,
		config: RuntimeConfig,
	) -> Result<Arc<dyn Runtime>, String>;
}

/// `(section, method)` tags of events announcing a queued outbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageTags {
	tags: Vec<(String, String, MessageKind)>,
}

impl Default for MessageTags {
	fn default() -> Self {
		Self::empty()
			.with(tags::HORIZONTAL.0, tags::HORIZONTAL.1, MessageKind::Horizontal)
			.with(tags::UPWARD.0, tags::UPWARD.1, MessageKind::Upward)
			.with(tags::DOWNWARD.0, tags::DOWNWARD.1, MessageKind::Downward)
	}
}

impl MessageTags {
	/// No recognised events.
	pub fn empty() -> Self {
		Self { tags: Vec::new() }
	}

	/// Recognise `section.method` as a message of `kind`.
	pub fn with(mut self, section: &str, method: &str, kind: MessageKind) -> Self {
		self.tags.push((section.to_string(), method.to_string(), kind));
		self
	}

	/// Kind of message `event` announces, if any.
	pub fn recognise(&self, event: &Event) -> Option<MessageKind> {
		self.tags
			.iter()
			.find(|(section, method, _)| event.is(section, method))
			.map(|(_, _, kind)| *kind)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn default_tags_recognise_message_events() {
		let tags = MessageTags::default();
		let sent = Event::new("XcmpQueue", "XcmpMessageSent", json!({}));
		let ump = Event::new("ParachainSystem", "UpwardMessageSent", json!({}));
		let other = Event::new("Balances", "Transfer", json!({}));

		assert_eq!(tags.recognise(&sent), Some(MessageKind::Horizontal));
		assert_eq!(tags.recognise(&ump), Some(MessageKind::Upward));
		assert_eq!(tags.recognise(&other), None);
		assert_eq!(MessageTags::empty().recognise(&sent), None);
	}

	#[test]
	fn inherent_identifiers_follow_channel_kind() {
		let inherent = Inherent::InboundMessages { channel: Channel::Upward(1000), messages: vec![] };
		assert_eq!(inherent.identifier(), messages::UPWARD_IDENTIFIER);
		assert_eq!(Inherent::Timestamp(1).identifier(), "Timestamp");
	}
}
