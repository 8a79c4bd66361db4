// SPDX-License-Identifier: GPL-3.0

//! Scenario logging.
//!
//! [`init`] installs a global [`log`] backend that appends every record to a file as
//! `[<RFC3339 timestamp>] [<LEVEL>] <message>` and forwards it to an
//! [`env_logger`] console logger filtered by `RUST_LOG`.

use crate::{
	error::LoggingError,
	strings::logging::{DEFAULT_LOG_FILE, FILTER_ENV},
};
use log::{LevelFilter, Log, Metadata, Record};
use std::{
	fs::{File, OpenOptions},
	io::Write,
	path::Path,
	sync::Mutex,
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Format one log line.
pub fn format_line(timestamp: OffsetDateTime, record: &Record) -> String {
	format!(
		"[{}] [{}] {}",
		timestamp.format(&Rfc3339).unwrap_or_default(),
		record.level(),
		record.args()
	)
}

/// Mirrors records to a file and the console.
pub struct FileLogger {
	file: Mutex<File>,
	file_level: LevelFilter,
	console: env_logger::Logger,
}

impl FileLogger {
	/// Append records up to `file_level` to `path`, creating it if needed.
	pub fn new(path: &Path, file_level: LevelFilter) -> Result<Self, LoggingError> {
		let file = OpenOptions::new().create(true).append(true).open(path)?;
		let console =
			env_logger::Builder::from_env(env_logger::Env::default().filter(FILTER_ENV)).build();
		Ok(Self { file: Mutex::new(file), file_level, console })
	}

	/// Most verbose level either sink accepts.
	pub fn max_level(&self) -> LevelFilter {
		self.file_level.max(self.console.filter())
	}
}

impl Log for FileLogger {
	fn enabled(&self, metadata: &Metadata) -> bool {
		metadata.level() <= self.file_level || self.console.enabled(metadata)
	}

	fn log(&self, record: &Record) {
		if record.level() <= self.file_level {
			let line = format_line(OffsetDateTime::now_utc(), record);
			let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
			// Nowhere to report a failed write.
			let _ = writeln!(file, "{line}");
		}
		if self.console.matches(record) {
			self.console.log(record);
		}
	}

	fn flush(&self) {
		let _ = self.file.lock().unwrap_or_else(|e| e.into_inner()).flush();
		self.console.flush();
	}
}

/// Install the logger, mirroring debug records to `test-output.log` in the working
/// directory.
///
/// # Errors
///
/// Fails if the file cannot be opened or a logger is already installed, so a
/// second call never panics.
pub fn init() -> Result<(), LoggingError> {
	init_with(Path::new(DEFAULT_LOG_FILE), LevelFilter::Debug)
}

/// Install the logger, mirroring records up to `file_level` to `path`.
pub fn init_with(path: &Path, file_level: LevelFilter) -> Result<(), LoggingError> {
	let logger = FileLogger::new(path, file_level)?;
	let max_level = logger.max_level();
	log::set_boxed_logger(Box::new(logger))?;
	log::set_max_level(max_level);
	Ok(())
}
