//! Following a growing file, in the manner of `tail -f`.
//!
//! A dedicated tailer thread polls the file at a fixed interval and pushes
//! every complete new line into a bounded channel. The consumer side is
//! [`FollowLines`], a blocking iterator. Dropping it signals the tailer,
//! waits for the thread to exit and thereby closes the file handle, so no
//! thread or descriptor outlives the subscription.
//!
//! # Truncation
//!
//! If the file becomes shorter than the current read position it is assumed
//! to have been truncated or replaced, and reading restarts at byte 0.
//!
//! # Line endings
//!
//! A line whose `\r` delimiter is the last byte of the file is held back
//! until more data arrives, so a `\r\n` split across two writes yields one
//! line rather than a line and an empty one.

use crate::error::{ConnLogError, Result};
use crate::source::lines::read_raw_line;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Starts following `path`.
///
/// With `from_end` only lines appended after this call are emitted,
/// otherwise the existing content comes first. A missing file is created
/// empty.
///
/// # Errors
///
/// Returns [`ConnLogError::Io`] if the file cannot be created or opened and
/// [`ConnLogError::ThreadSpawn`] if the tailer thread cannot be started.
/// Read failures after a successful start arrive as the last item of the
/// returned sequence.
pub fn follow(
    path: impl AsRef<Path>,
    from_end: bool,
    poll_interval: Duration,
    capacity: usize,
) -> Result<FollowLines> {
    let path = path.as_ref().to_path_buf();

    if !path.exists() {
        OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| ConnLogError::io(&path, e))?;
        info!(path = %path.display(), "created missing file to follow");
    }

    let file = File::open(&path).map_err(|e| ConnLogError::io(&path, e))?;
    let position = if from_end {
        file.metadata().map_err(|e| ConnLogError::io(&path, e))?.len()
    } else {
        0
    };

    let (lines_tx, lines_rx) = bounded(capacity.max(1));
    let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

    let tailer = Tailer {
        path: path.clone(),
        reader: BufReader::new(file),
        position,
        lines: lines_tx,
        shutdown: shutdown_rx,
        poll_interval,
        buf: Vec::new(),
    };
    let worker = thread::Builder::new()
        .name("connlog-tail".to_string())
        .spawn(move || tailer.run())
        .map_err(ConnLogError::ThreadSpawn)?;

    debug!(path = %path.display(), from_end, position, "following file");
    Ok(FollowLines {
        path,
        lines: lines_rx,
        shutdown: Some(shutdown_tx),
        worker: Some(worker),
    })
}

/// Unbounded sequence of lines appended to a followed file.
///
/// `next()` blocks until a line is available. The sequence ends after an
/// I/O error item, or never on its own otherwise; drop it to cancel.
pub struct FollowLines {
    path: PathBuf,
    lines: Receiver<Result<String>>,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl FollowLines {
    /// Path being followed.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Channel end the tailer pushes into, for `select!` based consumers.
    pub(crate) fn receiver(&self) -> &Receiver<Result<String>> {
        &self.lines
    }
}

impl Iterator for FollowLines {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lines.recv().ok()
    }
}

impl Drop for FollowLines {
    fn drop(&mut self) {
        // Disconnecting both channels wakes the tailer whether it sleeps
        // between polls or blocks on a full channel.
        self.shutdown.take();
        self.lines = crossbeam_channel::never();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(path = %self.path.display(), "tailer thread panicked");
            }
        }
        debug!(path = %self.path.display(), "stopped following file");
    }
}

struct Tailer {
    path: PathBuf,
    reader: BufReader<File>,
    /// Offset just past the last emitted line.
    position: u64,
    lines: Sender<Result<String>>,
    shutdown: Receiver<()>,
    poll_interval: Duration,
    buf: Vec<u8>,
}

/// Whether the tailer keeps polling after a pass.
enum Poll {
    Continue,
    Stop,
}

impl Tailer {
    fn run(mut self) {
        loop {
            match self.poll() {
                Ok(Poll::Continue) => {}
                Ok(Poll::Stop) => return,
                Err(e) => {
                    let _ = self.lines.send(Err(e));
                    return;
                }
            }
            match self.shutdown.recv_timeout(self.poll_interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                // Explicit signal or consumer dropped.
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    /// Emits every complete line past `position`.
    fn poll(&mut self) -> Result<Poll> {
        let len = self
            .reader
            .get_ref()
            .metadata()
            .map_err(|e| ConnLogError::io(&self.path, e))?
            .len();

        if len < self.position {
            warn!(
                path = %self.path.display(),
                len,
                position = self.position,
                "followed file shrank, reading from start"
            );
            self.position = 0;
        }
        if len == self.position {
            return Ok(Poll::Continue);
        }

        self.reader
            .seek(SeekFrom::Start(self.position))
            .map_err(|e| ConnLogError::io(&self.path, e))?;

        loop {
            self.buf.clear();
            let raw = read_raw_line(&mut self.reader, &mut self.buf)
                .map_err(|e| ConnLogError::io(&self.path, e))?;
            let Some(raw) = raw else {
                return Ok(Poll::Continue);
            };
            // A line still being written is picked up again next poll, as is
            // a final `\r` that may be the first half of `\r\n`.
            if !raw.terminated || raw.trailing_cr {
                return Ok(Poll::Continue);
            }
            self.position += raw.consumed;

            let line = String::from_utf8_lossy(&self.buf).into_owned();
            if self.lines.send(Ok(line)).is_err() {
                return Ok(Poll::Stop);
            }
        }
    }
}
