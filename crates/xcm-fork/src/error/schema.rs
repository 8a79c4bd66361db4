// SPDX-License-Identifier: GPL-3.0

//! Storage injection schema error types.

use thiserror::Error;

/// Errors that can occur when encoding human-authored storage values.
#[derive(Debug, Error)]
pub enum SchemaError {
	/// Two codecs were registered for the same storage item.
	#[error("Duplicate schema entry for {module}::{item}")]
	Duplicate {
		/// Module (pallet) name.
		module: String,
		/// Storage item name.
		item: String,
	},

	/// A schema entry has an empty module or item name.
	#[error("Schema entry with empty name")]
	EmptyName,

	/// No codec is registered for the storage item.
	#[error("Unknown storage item {module}::{item}")]
	UnknownItem {
		/// Module (pallet) name.
		module: String,
		/// Storage item name.
		item: String,
	},

	/// The value does not have the shape the codec expects.
	#[error("Invalid value for {module}::{item}: {message}")]
	InvalidValue {
		/// Module (pallet) name.
		module: String,
		/// Storage item name.
		item: String,
		/// What was wrong.
		message: String,
	},
}
