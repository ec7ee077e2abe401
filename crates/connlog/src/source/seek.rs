//! Approximate timestamp seeking.
//!
//! For a file whose timestamps grow with the offset, [`TimestampSeeker`]
//! binary searches for a line aligned offset whose line is at or before a
//! target timestamp. The result is a lower bound to start scanning from, not
//! the nearest line: the search stops once the candidate span is smaller
//! than the minimum fragment size.
//!
//! # Ties
//!
//! Midpoint reads compare with `>=`, so on a run of equal timestamps the upper bound
//! keeps moving down and the result lands before the first line of the run.

use crate::config::EngineConfig;
use crate::error::{ConnLogError, Result};
use crate::event::{Event, Timestamp};
use crate::source::lines::{open_file, read_raw_line, skip_line_at};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, trace, warn};

/// Bounded binary search over a log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampSeeker {
    min_fragment_size: u64,
    max_iterations: u32,
}

impl Default for TimestampSeeker {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl TimestampSeeker {
    /// Creates a seeker with explicit limits.
    pub fn new(min_fragment_size: u64, max_iterations: u32) -> Self {
        Self {
            min_fragment_size,
            max_iterations,
        }
    }

    /// Creates a seeker with the limits of `config`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.min_fragment_size, config.max_seek_iterations)
    }

    /// Returns a line aligned offset at or before the first line with
    /// timestamp `>= target`.
    ///
    /// Returns 0 when no better bound is found.
    ///
    /// # Errors
    ///
    /// Returns [`ConnLogError::SeekAborted`] once the iteration bound is
    /// exceeded and [`ConnLogError::Io`] if the file cannot be read.
    pub fn seek(&self, path: impl AsRef<Path>, target: Timestamp) -> Result<u64> {
        let path = path.as_ref();
        let file = open_file(path)?;
        let len = file
            .metadata()
            .map_err(|e| ConnLogError::io(path, e))?
            .len();
        let mut reader = BufReader::new(file);

        let mut lo = 0u64;
        let mut hi = len;
        let mut iterations = 0u32;

        while hi - lo > self.min_fragment_size {
            if iterations >= self.max_iterations {
                return Err(ConnLogError::SeekAborted {
                    target,
                    path: path.to_path_buf(),
                    iterations,
                });
            }
            iterations += 1;

            let mid = lo + (hi - lo) / 2;
            let Some(timestamp) = timestamp_after(&mut reader, path, mid)? else {
                break;
            };
            trace!(lo, mid, hi, timestamp, "seek step");

            if timestamp >= target {
                hi = mid;
            } else {
                lo = mid;
            }
        }

        let offset = if lo == 0 {
            0
        } else {
            skip_line_at(&mut reader, lo).map_err(|e| ConnLogError::io(path, e))?
        };
        debug!(path = %path.display(), target, offset, iterations, "seek finished");
        Ok(offset)
    }
}

/// Seeks `path` for `target` with the default limits. See [`TimestampSeeker::seek`].
pub fn seek_timestamp(path: impl AsRef<Path>, target: Timestamp) -> Result<u64> {
    TimestampSeeker::default().seek(path, target)
}

/// Timestamp of the first parsable line after the line touching `offset`.
///
/// Returns `None` at EOF.
fn timestamp_after(
    reader: &mut BufReader<File>,
    path: &Path,
    offset: u64,
) -> Result<Option<Timestamp>> {
    skip_line_at(reader, offset).map_err(|e| ConnLogError::io(path, e))?;

    let mut buf = Vec::new();
    loop {
        buf.clear();
        if read_raw_line(reader, &mut buf)
            .map_err(|e| ConnLogError::io(path, e))?
            .is_none()
        {
            return Ok(None);
        }
        if buf.is_empty() {
            continue;
        }
        let line = String::from_utf8_lossy(&buf);
        match Event::parse_line(&line) {
            Ok(event) => return Ok(Some(event.timestamp)),
            Err(e) => warn!(error = %e, "ignoring line during seek"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn monotonic_file(lines: i64) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for ts in 0..lines {
            writeln!(file, "{ts} src{ts} dst").unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn timestamp_at(path: &Path, offset: u64) -> Timestamp {
        let content = std::fs::read_to_string(path).unwrap();
        let line = content[offset as usize..].lines().next().unwrap();
        Event::parse_line(line).unwrap().timestamp
    }

    #[test]
    fn test_small_file_returns_zero() {
        let file = monotonic_file(2);
        assert_eq!(seek_timestamp(file.path(), 1).unwrap(), 0);
    }

    #[test]
    fn test_seek_lower_bound() {
        let file = monotonic_file(2_000);
        let seeker = TimestampSeeker::new(64, 1000);

        for target in [0, 1, 500, 1_234, 1_999] {
            let offset = seeker.seek(file.path(), target).unwrap();
            assert!(timestamp_at(file.path(), offset) <= target, "target {target}");
        }
    }

    #[test]
    fn test_seek_moves_forward() {
        let file = monotonic_file(2_000);
        let seeker = TimestampSeeker::new(64, 1000);
        assert!(seeker.seek(file.path(), 1_500).unwrap() > 0);
    }

    #[test]
    fn test_seek_aborts_on_iteration_bound() {
        let file = monotonic_file(2_000);
        let err = TimestampSeeker::new(1, 2)
            .seek(file.path(), 1_000)
            .unwrap_err();
        match err {
            ConnLogError::SeekAborted { target, iterations, .. } => {
                assert_eq!(target, 1_000);
                assert_eq!(iterations, 2);
            }
            other => panic!("expected SeekAborted, got {other:?}"),
        }
    }

    #[test]
    fn test_seek_skips_blank_and_malformed_lines() {
        let mut file = NamedTempFile::new().unwrap();
        for ts in 0..1_000 {
            writeln!(file, "{ts} a b").unwrap();
            writeln!(file).unwrap();
            writeln!(file, "garbage").unwrap();
        }
        file.flush().unwrap();

        let offset = TimestampSeeker::new(64, 1000).seek(file.path(), 700).unwrap();
        let content = std::fs::read_to_string(file.path()).unwrap();
        let first = content[offset as usize..]
            .lines()
            .find_map(|line| Event::parse_line(line).ok())
            .unwrap();
        assert!(first.timestamp <= 700);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            seek_timestamp(dir.path().join("nope"), 0),
            Err(ConnLogError::Io { .. })
        ));
    }
}
