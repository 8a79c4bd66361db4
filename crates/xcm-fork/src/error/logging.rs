// SPDX-License-Identifier: GPL-3.0

//! Logger installation error types.

use thiserror::Error;

/// Errors that can occur when installing the logger.
#[derive(Debug, Error)]
pub enum LoggingError {
	/// The log file could not be opened.
	#[error("Failed to open log file: {0}")]
	Io(#[from] std::io::Error),

	/// A global logger is already installed.
	#[error("A logger is already installed: {0}")]
	AlreadyInitialized(#[from] log::SetLoggerError),
}
