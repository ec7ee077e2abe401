//! Line aligned split planning for parallel scans.

use crate::error::{ConnLogError, Result};
use crate::source::lines::{open_file, skip_line_at};
use crate::source::range::ByteRange;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// Splits `path` into at most `splits` contiguous, line aligned ranges.
///
/// The first range starts at 0, the last one ends at the file length and
/// every inner boundary is the start of a line. Fewer ranges than requested
/// are returned when the file has too few lines. An empty file yields the
/// single range `[0, 0)`.
///
/// # Errors
///
/// Returns [`ConnLogError::UserInput`] when `splits` is 0 and
/// [`ConnLogError::Io`] if the file cannot be read.
pub fn plan_splits(path: impl AsRef<Path>, splits: usize) -> Result<Vec<ByteRange>> {
    if splits == 0 {
        return Err(ConnLogError::UserInput(
            "number of splits must be at least 1".to_string(),
        ));
    }

    let path = path.as_ref();
    let file = open_file(path)?;
    let len = file
        .metadata()
        .map_err(|e| ConnLogError::io(path, e))?
        .len();
    let mut reader = BufReader::new(file);

    let target = len / splits as u64;
    let mut ranges = Vec::with_capacity(splits);
    let mut from = 0u64;

    for i in 0..splits {
        let to = if i + 1 == splits {
            len
        } else {
            // Consume through the next delimiter even on an exact line
            // start, matching how a reader skips the line touching `from`.
            let candidate = (target * (i as u64 + 1)).max(from);
            skip_line_at(&mut reader, candidate).map_err(|e| ConnLogError::io(path, e))?
        };
        ranges.push(ByteRange::new(from, to.min(len)));
        if to >= len {
            break;
        }
        from = to;
    }

    if let Some(last) = ranges.last_mut() {
        last.to = len;
    }

    debug!(
        path = %path.display(),
        len,
        requested = splits,
        planned = ranges.len(),
        boundaries = ?ranges.iter().map(|r| r.to).collect::<Vec<_>>(),
        "planned splits"
    );
    Ok(ranges)
}
