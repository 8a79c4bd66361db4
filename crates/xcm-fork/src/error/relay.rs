// SPDX-License-Identifier: GPL-3.0

//! Message relay error types.

use crate::{ChainId, message::Channel};
use thiserror::Error;

/// Errors that can occur when routing cross-chain messages.
///
/// Delivery failures are recorded by the relay and surfaced through
/// [`MessageRelay::undelivered`](crate::MessageRelay::undelivered) rather than returned,
/// since many scenarios intentionally assert on non-delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
	/// No link connects the origin to the destination.
	#[error("No relay link from {origin} to {destination}")]
	UnregisteredChannel {
		/// The chain that sent the message.
		origin: ChainId,
		/// The chain the message was addressed to.
		destination: ChainId,
	},

	/// The destination fork is no longer alive.
	#[error("Destination {0} is no longer registered with the relay")]
	DestinationGone(ChainId),

	/// A message arrived with a sequence number not above the last one on its channel.
	#[error("Out-of-order message on {channel}: sequence {sequence} after {last}")]
	OutOfOrder {
		/// The inbound channel.
		channel: Channel,
		/// The last enqueued sequence number.
		last: u64,
		/// The rejected sequence number.
		sequence: u64,
	},

	/// The requested link cannot exist between these chains.
	#[error("Invalid link between {0} and {1}: {2}")]
	InvalidLink(ChainId, ChainId, &'static str),

	/// The pending-inbound queue lock was poisoned.
	#[error("Inbound queue acquire error: {0}")]
	Lock(String),
}
