// SPDX-License-Identifier: GPL-3.0

//! Deterministic multi-chain fork-and-relay simulation for cross-chain message tests.
//!
//! This crate forks live Polkadot SDK chains at a block, lazily fetching their state,
//! then lets a scenario build blocks on demand, inject storage, move the head and
//! relay cross-chain messages between the forks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        NetworkRegistry                          │
//! │        (named forks, layered config, scoped teardown)           │
//! └─────────────────────────────────────────────────────────────────┘
//!                │                                   │
//!                ▼                                   ▼
//! ┌─────────────────────────────┐     ┌─────────────────────────────┐
//! │          ChainFork          │◄───►│        MessageRelay         │
//! │ head, txpool, inbound queues│     │  links, outbound delivery   │
//! └─────────────────────────────┘     └─────────────────────────────┘
//!                │
//!                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         BlockBuilder                            │
//! │  initialize ─► inherents ─► extrinsics ─► finalize (outbound)   │
//! └─────────────────────────────────────────────────────────────────┘
//!                │
//!                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          StateStore                             │
//! │  ┌──────────────┐  ┌─────────────┐  ┌─────────────────────────┐ │
//! │  │  Overrides   │─▶│ Cache Layer │─▶│ Remote Layer (Live RPC) │ │
//! │  │(copy-on-write)│ │  (SQLite)   │  │      (lazy fetch)       │ │
//! │  └──────────────┘  └─────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The runtime itself is a collaborator behind the [`Runtime`] trait; the
//! [`testing`] module provides a small deterministic one.

mod block;
mod builder;
mod cache;
pub mod config;
pub mod dev;
pub mod error;
mod fork;
pub mod inherent;
pub mod injection;
pub mod logging;
pub mod message;
mod models;
mod registry;
mod relay;
mod remote;
mod rpc;
pub mod runtime;
mod schema;
mod state;
pub mod storage;
mod strings;
pub mod testing;
mod txpool;

pub use block::{Block, BlockHeader, BlockRef, ExtrinsicRecord};
pub use builder::{ApplyExtrinsicResult, BlockBuilder, BuilderPhase};
pub use cache::{BlockInfo, StorageCache};
pub use config::{ForkOptions, ForkParams, ForkPoint, NetworkProfile};
pub use error::{
	BuildError, CacheError, ConfigError, FetchError, ForkError, LoggingError, RelayError,
	RpcClientError, SchemaError, SetupError, TxPoolError,
};
pub use fork::{
	BlockObserver, ChainFork, ChainForkBuilder, ExtrinsicInclusion, InboundOverride,
	NewBlockOptions, detect_chain,
};
pub use injection::{StorageSchema, StorageValues};
pub use message::{ChainId, Channel, ChannelLimits, DownwardMessage, Message, MessageKind};
pub use registry::{NetworkRegistry, NetworkStatus};
pub use relay::{LinkMode, MessageRelay, Undelivered};
pub use remote::RemoteStorageLayer;
pub use rpc::{ForkRpcClient, RpcConnector};
pub use runtime::{Event, Runtime, RuntimeFactory};
pub use state::{StateStore, StorageChange};
pub use txpool::{PendingExtrinsic, TxPool, extrinsic_hash};
