// SPDX-License-Identifier: GPL-3.0

//! String constants for the logging module.

/// Default file every log record is mirrored to.
pub const DEFAULT_LOG_FILE: &str = "test-output.log";

/// Environment variable holding the console filter.
pub const FILTER_ENV: &str = "RUST_LOG";
