// The directory tree of a session.
//
// The layout is this:
//
//    <pbench_run>/<script>_<config>_<timestamp>/iter-<i>/sample-<s>
//
// where i and s are 1-based, or, for a single collector that is driven by an outside benchmark,
//
//    <pbench_run>/<script>_<config>_<timestamp>/collected-samples/sample-<s>
//
// Every directory is created exactly once.  An existing directory is an error, there is no merging
// with earlier data.

use crate::error::{Result, SessionError};
use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%m-%d-%Y_%H-%M-%S";
pub const COLLECTED_DIR: &str = "collected-samples";

/// Create the directory `path`, whose parent must exist.  `purpose` names the directory in error
/// messages.

pub fn create_dir(path: &Path, purpose: &str) -> Result<PathBuf> {
    match fs::create_dir(path) {
        Ok(()) => Ok(path.to_path_buf()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(SessionError::DirectoryConflict {
            path: path.to_path_buf(),
            purpose: purpose.to_string(),
        }),
        Err(e) => Err(SessionError::Io {
            path: path.to_path_buf(),
            purpose: purpose.to_string(),
            source: e,
        }),
    }
}

pub fn run_dir_name<Tz>(script: &str, config: &str, timestamp: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("{script}_{config}_{}", timestamp.format(TIMESTAMP_FORMAT))
}

pub fn iteration_dir(root: &Path, iteration: usize) -> PathBuf {
    root.join(format!("iter-{iteration}"))
}

pub fn sample_dir(parent: &Path, sample: usize) -> PathBuf {
    parent.join(format!("sample-{sample}"))
}

pub fn collected_dir(root: &Path) -> PathBuf {
    root.join(COLLECTED_DIR)
}
