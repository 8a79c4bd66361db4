// SPDX-License-Identifier: GPL-3.0

//! Error types for fork and relay operations.
//!
//! One error enum per context, mirroring the layers of the engine:
//!
//! - [`rpc::RpcClientError`] - Transport errors from a remote chain source.
//! - [`cache::CacheError`] - Errors from the SQLite storage cache.
//! - [`fetch::FetchError`] - A base-snapshot read failed.
//! - [`builder::BuildError`] - A block could not be built (runtime fault, bad phase).
//! - [`relay::RelayError`] - A message could not be routed to a peer.
//! - [`setup::SetupError`] - A fork could not be created.
//! - [`schema::SchemaError`] - Storage injection could not be encoded.
//! - [`config::ConfigError`] - Explicit configuration is invalid.
//! - [`logging::LoggingError`] - The logger could not be installed.
//! - [`fork::ForkError`] - Umbrella error for [`ChainFork`](crate::ChainFork) operations.

pub mod builder;
pub mod cache;
pub mod config;
pub mod fetch;
pub mod fork;
pub mod logging;
pub mod relay;
pub mod rpc;
pub mod schema;
pub mod setup;
pub mod txpool;

pub use builder::BuildError;
pub use cache::CacheError;
pub use config::ConfigError;
pub use fetch::FetchError;
pub use fork::ForkError;
pub use logging::LoggingError;
pub use relay::RelayError;
pub use rpc::RpcClientError;
pub use schema::SchemaError;
pub use setup::SetupError;
pub use txpool::TxPoolError;
