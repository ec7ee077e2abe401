//! Bounded line reading over a byte range of a file.
//!
//! Lines end with `\n`, `\r` or `\r\n`; the delimiter is not part of the
//! returned line. Every read tracks the exact number of bytes consumed so
//! callers can turn "skip to the next line" into a byte offset.

use crate::error::{ConnLogError, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bytes consumed by one [`read_raw_line`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawLine {
    /// Bytes consumed, delimiter included.
    pub consumed: u64,
    /// False when the line ran into EOF without a delimiter.
    pub terminated: bool,
    /// True when the delimiter is a `\r` at the very end of the available
    /// data, so a `\n` completing it may still be appended.
    pub trailing_cr: bool,
}

/// Reads one line into `buf`, without its delimiter.
///
/// Returns `None` at EOF. A `\r` immediately followed by `\n` counts as one
/// delimiter; a `\r` at the very end of the available data is taken as a
/// complete delimiter and flagged in [`RawLine::trailing_cr`].
pub(crate) fn read_raw_line<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> io::Result<Option<RawLine>> {
    let mut consumed = 0u64;
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok((consumed > 0).then_some(RawLine {
                consumed,
                terminated: false,
                trailing_cr: false,
            }));
        }

        match available.iter().position(|&b| b == b'\n' || b == b'\r') {
            Some(idx) => {
                let delimiter = available[idx];
                buf.extend_from_slice(&available[..idx]);
                reader.consume(idx + 1);
                consumed += idx as u64 + 1;

                let mut trailing_cr = false;
                if delimiter == b'\r' {
                    match reader.fill_buf()?.first() {
                        Some(b'\n') => {
                            reader.consume(1);
                            consumed += 1;
                        }
                        Some(_) => {}
                        None => trailing_cr = true,
                    }
                }
                return Ok(Some(RawLine {
                    consumed,
                    terminated: true,
                    trailing_cr,
                }));
            }
            None => {
                let len = available.len();
                buf.extend_from_slice(available);
                reader.consume(len);
                consumed += len as u64;
            }
        }
    }
}

/// Positions `reader` at `offset` and consumes the line touching it.
///
/// Returns the offset of the first byte after that line's delimiter, or the
/// EOF offset if the line has no delimiter.
pub(crate) fn skip_line_at<R: BufRead + Seek>(reader: &mut R, offset: u64) -> io::Result<u64> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut scratch = Vec::new();
    let consumed = read_raw_line(reader, &mut scratch)?.map_or(0, |raw| raw.consumed);
    Ok(offset + consumed)
}

/// Opens `path` for reading, attaching the path to any error.
pub(crate) fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| ConnLogError::io(path, e))
}

/// Lazy, finite sequence of the lines of one byte range.
///
/// The reader owns its file handle; dropping the reader closes it.
///
/// When `from > 0` the line touching `from` is discarded, even if `from` is
/// already a line start. Lines are read while they start at or before the
/// `to` limit, and a line that starts in range is read to its end even when it
/// extends past `to`.
pub struct LineReader {
    path: PathBuf,
    reader: BufReader<File>,
    /// Offset of the next unread byte, always a line start.
    position: u64,
    limit: Option<u64>,
    buf: Vec<u8>,
    finished: bool,
}

impl LineReader {
    /// Opens a reader over `path` starting at `from`.
    ///
    /// `to` of `None` reads until EOF.
    ///
    /// # Errors
    ///
    /// Returns [`ConnLogError::Io`] if the file cannot be opened or the
    /// initial partial line cannot be skipped.
    pub fn open(path: impl AsRef<Path>, from: u64, to: Option<u64>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = BufReader::new(open_file(&path)?);

        let position = if from > 0 {
            skip_line_at(&mut reader, from).map_err(|e| ConnLogError::io(&path, e))?
        } else {
            0
        };
        debug!(path = %path.display(), from, ?to, position, "opened line reader");

        Ok(Self {
            path,
            reader,
            position,
            limit: to,
            buf: Vec::with_capacity(128),
            finished: false,
        })
    }

    /// Offset of the next line this reader would return.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Path being read.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for LineReader {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.limit.is_some_and(|limit| self.position > limit) {
            self.finished = true;
            return None;
        }

        self.buf.clear();
        match read_raw_line(&mut self.reader, &mut self.buf) {
            Ok(Some(raw)) => {
                self.position += raw.consumed;
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(ConnLogError::io(&self.path, e)))
            }
        }
    }
}

/// Reads the lines of `path` in `[from, to)`. See [`LineReader`].
pub fn read_lines(path: impl AsRef<Path>, from: u64, to: Option<u64>) -> Result<LineReader> {
    LineReader::open(path, from, to)
}

/// Returns the first complete line after the byte at `fraction` of the file.
///
/// Returns `None` when no complete line follows that byte.
///
/// # Errors
///
/// Returns [`ConnLogError::UserInput`] unless `0 <= fraction < 1`, and
/// [`ConnLogError::Io`] if the file cannot be read.
pub fn line_at_fraction(path: impl AsRef<Path>, fraction: f64) -> Result<Option<String>> {
    if !(0.0..1.0).contains(&fraction) {
        return Err(ConnLogError::UserInput(format!(
            "fraction must be in [0, 1), got {fraction}"
        )));
    }

    let path = path.as_ref();
    let len = open_file(path)?
        .metadata()
        .map_err(|e| ConnLogError::io(path, e))?
        .len();
    let offset = (len as f64 * fraction) as u64;

    let mut reader = BufReader::new(open_file(path)?);
    skip_line_at(&mut reader, offset).map_err(|e| ConnLogError::io(path, e))?;

    let mut buf = Vec::new();
    match read_raw_line(&mut reader, &mut buf).map_err(|e| ConnLogError::io(path, e))? {
        Some(raw) if raw.terminated => Ok(Some(String::from_utf8_lossy(&buf).into_owned())),
        _ => Ok(None),
    }
}
