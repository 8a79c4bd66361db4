// SPDX-License-Identifier: GPL-3.0

//! Configuration error types.

use thiserror::Error;

/// Errors that can occur when an explicitly supplied option is invalid.
///
/// Invalid environment values never produce this error: they fall back to the
/// next configuration layer.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// An endpoint is not a valid URL.
	#[error("Invalid endpoint `{endpoint}`: {message}")]
	InvalidEndpoint {
		/// The offending endpoint.
		endpoint: String,
		/// Parse failure.
		message: String,
	},

	/// Both a fork block number and a fork block hash were given.
	#[error("Fork point given as both block number and block hash")]
	AmbiguousForkPoint,

	/// A channel limit of zero would never drain the channel.
	#[error("Channel limit `{0}` must be greater than zero")]
	ZeroLimit(&'static str),
}
