//! Error and Result types for connection log operations.

use std::io;
use std::num::ParseIntError;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for connection log operations.
pub type Result<T> = std::result::Result<T, ConnLogError>;

/// The error type for engine operations.
///
/// Each variant is a distinct failure kind so callers can choose a fallback
/// per kind: an aborted seek can fall back to a full scan, an I/O failure
/// cannot.
#[derive(Debug, Error)]
pub enum ConnLogError {
    /// The log file could not be opened, created or read.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File the operation was working on.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A line could not be parsed into an event.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The timestamp binary search exceeded its iteration bound.
    #[error("Seek aborted after {iterations} iterations looking for timestamp {target} in {path}")]
    SeekAborted {
        /// Timestamp that was being searched for.
        target: i64,
        /// File that was being searched.
        path: PathBuf,
        /// Iterations performed before giving up.
        iterations: u32,
    },

    /// Invalid user supplied option or option combination.
    #[error("Invalid input: {0}")]
    UserInput(String),

    /// A reader, window or shard thread could not be started.
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(#[source] io::Error),

    /// A shard worker thread panicked while scanning.
    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),
}

impl ConnLogError {
    /// Wraps an I/O error together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for the seek-aborted kind.
    pub fn is_seek_aborted(&self) -> bool {
        matches!(self, Self::SeekAborted { .. })
    }
}

/// The error type for a line that is not a well-formed connection record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The line does not split into exactly three space separated fields.
    #[error("Expected format <timestamp> <sourceHost> <targetHost>, got {found} fields in line: {line:?}")]
    FieldCount {
        /// Number of fields found.
        found: usize,
        /// The offending line.
        line: String,
    },

    /// The first field is not a base-10 integer.
    #[error("First field must be an epoch millis timestamp in line {line:?}: {source}")]
    Timestamp {
        /// The offending line.
        line: String,
        /// Integer parse failure.
        #[source]
        source: ParseIntError,
    },
}
