// SPDX-License-Identifier: GPL-3.0

//! Error types for block builder operations.

use super::FetchError;
use thiserror::Error;

/// Errors that can occur during block building.
///
/// A "dispatched but failed" extrinsic is not an error: it is reported through
/// [`ApplyExtrinsicResult::DispatchFailed`](crate::ApplyExtrinsicResult::DispatchFailed).
#[derive(Debug, Error)]
pub enum BuildError {
	/// The runtime faulted while executing an inherent or extrinsic.
	#[error("Runtime fault in `{call}`: {message}")]
	RuntimeFault {
		/// What was being executed (inherent identifier or extrinsic index).
		call: String,
		/// The fault description returned by the runtime.
		message: String,
	},

	/// Reading state during the build failed.
	#[error("Storage error: {0}")]
	Fetch(#[from] FetchError),

	/// Error decoding data.
	#[error("Codec error: {0}")]
	Codec(String),

	/// Block has not been initialized yet.
	#[error("Block not initialized - call initialize() first")]
	NotInitialized,

	/// Block has already been initialized.
	#[error("Block already initialized - initialize() can only be called once")]
	AlreadyInitialized,

	/// Inherents have not been applied yet.
	#[error("Inherents not applied - call apply_inherents() before apply_extrinsic()")]
	InherentsNotApplied,

	/// Inherents have already been applied.
	#[error("Inherents already applied - apply_inherents() can only be called once")]
	InherentsAlreadyApplied,

	/// Inherent provider failed.
	#[error("Inherent provider `{provider}` failed: {message}")]
	InherentProvider {
		/// The identifier of the provider that failed.
		provider: String,
		/// The error message.
		message: String,
	},
}
