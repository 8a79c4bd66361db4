// SPDX-License-Identifier: GPL-3.0

//! Inherent providers for block building.
//!
//! Inherents are block-level inputs supplied by the author rather than submitted by
//! users. They are applied before any extrinsic.
//!
//! ```text
//!                 InherentProvider
//!                        │
//!          ┌─────────────┴─────────────┐
//!          ▼                           ▼
//!    ┌───────────┐             ┌────────────────┐
//!    │ Timestamp │             │ InboundMessage │
//!    │ Inherent  │             │   Inherent     │
//!    └───────────┘             └────────────────┘
//! ```

mod messages;
mod timestamp;

pub use messages::InboundMessageInherent;
pub use timestamp::{TimestampInherent, read_timestamp, timestamp_now_key};

use crate::{Block, BuildError, runtime::Inherent};
use async_trait::async_trait;

/// Creates the inherents of a new block.
///
/// Implementations return an empty `Vec` when they have nothing to contribute.
#[async_trait]
pub trait InherentProvider: Send + Sync {
	/// Identifier for this inherent provider (for debugging/logging).
	fn identifier(&self) -> &'static str;

	/// Inherents for the child of `parent`.
	async fn provide(&self, parent: &Block) -> Result<Vec<Inherent>, BuildError>;
}
