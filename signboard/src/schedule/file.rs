//! Schedule file persistence.
//!
//! The schedule XML lives at a configured path and is replaced wholesale by
//! the downloader whenever the CMS publishes a new schedule. The resolver
//! reads it at startup and on refresh; a missing file is not an error, it
//! simply means "no schedule yet" and yields the empty document. Callers
//! serialise reads and writes through the resolver lock so neither side
//! observes a half-written file.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

/// The document used when no schedule file exists yet.
pub const EMPTY_SCHEDULE: &str = "<schedule/>";

/// Errors raised by schedule file persistence.
#[derive(Debug, Error)]
pub enum ScheduleFileError {
    /// Reading the schedule file failed for a reason other than absence.
    #[error("failed to read schedule file: {0}")]
    Read(#[source] io::Error),

    /// Writing the schedule file failed.
    #[error("failed to write schedule file: {0}")]
    Write(#[source] io::Error),
}

/// Read the schedule XML, or the empty document when the file is missing.
///
/// # Errors
///
/// Only I/O failures other than `NotFound` are errors.
pub fn read_schedule_xml(path: &Path) -> Result<String, ScheduleFileError> {
    match fs::read_to_string(path) {
        Ok(xml) => Ok(xml),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no schedule file yet, using empty document");
            Ok(EMPTY_SCHEDULE.to_string())
        }
        Err(e) => Err(ScheduleFileError::Read(e)),
    }
}

/// Persist the received schedule document verbatim, UTF-8.
///
/// The parent directory is created on demand so a fresh install can write
/// before anything else touches the library.
///
/// # Errors
///
/// Write failures propagate to the caller; there is no retry here.
pub fn write_schedule_xml(path: &Path, xml: &str) -> Result<(), ScheduleFileError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(ScheduleFileError::Write)?;
    }
    fs::write(path, xml.as_bytes()).map_err(ScheduleFileError::Write)
}
