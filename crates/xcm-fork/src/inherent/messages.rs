// SPDX-License-Identifier: GPL-3.0

//! Inbound message inherent provider.

use crate::{
	Block, BuildError,
	inherent::InherentProvider,
	message::{Channel, Message},
	runtime::Inherent,
	strings::inherent::messages,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Delivers a fixed set of inbound messages, one inherent per non-empty channel.
#[derive(Debug, Clone, Default)]
pub struct InboundMessageInherent {
	messages: BTreeMap<Channel, Vec<Message>>,
}

impl InboundMessageInherent {
	pub fn new(messages: BTreeMap<Channel, Vec<Message>>) -> Self {
		Self { messages }
	}
}

#[async_trait]
impl InherentProvider for InboundMessageInherent {
	fn identifier(&self) -> &'static str {
		messages::INBOUND_IDENTIFIER
	}

	async fn provide(&self, _parent: &Block) -> Result<Vec<Inherent>, BuildError> {
		Ok(self
			.messages
			.iter()
			.filter(|(_, messages)| !messages.is_empty())
			.map(|(channel, messages)| Inherent::InboundMessages {
				channel: *channel,
				messages: messages.clone(),
			})
			.collect())
	}
}
