//! Parallel bounded scans over line aligned shards.
//!
//! Each scan builds its own rayon pool of at most `workers` threads and
//! spawns one job per shard on it, so shards of one query never wait behind
//! another query's jobs. Jobs push their events into one bounded channel that
//! [`ShardedEvents`] drains; within a shard file order is kept while shards
//! interleave freely.
//!
//! # Teardown
//!
//! Every job holds a clone of a `done` sender and drops it when it returns.
//! Dropping [`ShardedEvents`] raises the cancel flag, disconnects the event
//! channel so blocked jobs wake up, then waits for the `done` channel to
//! disconnect. When drop returns no job is running, every shard file is
//! closed and the pool is shut down.

use crate::config::EngineConfig;
use crate::error::{ConnLogError, Result};
use crate::event::Event;
use crate::query::scan::EventScan;
use crate::query::BoundedQuery;
use crate::source::{ByteRange, LineReader};
use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Merged events of a parallel bounded query.
///
/// Order across shards is unspecified. The first shard failure is yielded as
/// an error item and ends the sequence: the remaining shards are cancelled
/// and `next` returns `None` from then on.
pub struct ShardedEvents {
    events: Receiver<Result<Event>>,
    cancelled: Arc<AtomicBool>,
    finished: bool,
    done: Receiver<()>,
    _workers: ThreadPool,
}

impl ShardedEvents {
    /// Starts one scan job per range on a pool of
    /// `min(ranges, config.workers)` threads.
    pub(crate) fn start(
        path: &Path,
        ranges: Vec<ByteRange>,
        query: &BoundedQuery,
        config: &EngineConfig,
    ) -> Result<Self> {
        let threads = ranges.len().min(config.workers).max(1);
        let workers = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("connlog-shard-{i}"))
            .panic_handler(|_| warn!("shard job panicked outside its scan"))
            .build()
            .map_err(|e| ConnLogError::ThreadSpawn(io::Error::other(e)))?;

        let (events_tx, events_rx) = bounded(config.channel_capacity.max(1));
        let (done_tx, done_rx) = bounded::<()>(0);
        let cancelled = Arc::new(AtomicBool::new(false));

        for (shard, range) in ranges.into_iter().enumerate() {
            let job = ShardJob {
                shard,
                path: path.to_path_buf(),
                range,
                query: query.clone(),
                events: events_tx.clone(),
                cancelled: cancelled.clone(),
                _done: done_tx.clone(),
            };
            workers.spawn(move || job.run());
        }
        debug!(threads, "shard pool started");

        Ok(Self {
            events: events_rx,
            cancelled,
            finished: false,
            done: done_rx,
            _workers: workers,
        })
    }

    /// Cancels the remaining shards and ends the sequence.
    fn stop(&mut self) {
        self.finished = true;
        self.cancelled.store(true, Ordering::SeqCst);
        self.events = crossbeam_channel::never();
    }
}

impl Iterator for ShardedEvents {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.events.recv() {
            Ok(Ok(event)) => Some(Ok(event)),
            Ok(Err(e)) => {
                warn!(error = %e, "shard failed, cancelling scan");
                self.stop();
                Some(Err(e))
            }
            Err(_) => {
                self.finished = true;
                None
            }
        }
    }
}

impl Drop for ShardedEvents {
    fn drop(&mut self) {
        self.stop();
        // Disconnects once every job has dropped its sender.
        let _ = self.done.recv();
        debug!("sharded scan released");
    }
}

struct ShardJob {
    shard: usize,
    path: PathBuf,
    range: ByteRange,
    query: BoundedQuery,
    events: Sender<Result<Event>>,
    cancelled: Arc<AtomicBool>,
    _done: Sender<()>,
}

impl ShardJob {
    fn run(self) {
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        debug!(shard = self.shard, range = %self.range, "shard started");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.scan()));
        if outcome.is_err() {
            let _ = self.events.send(Err(ConnLogError::WorkerPanicked(format!(
                "shard {} over {}",
                self.shard, self.range
            ))));
        }
        debug!(shard = self.shard, "shard finished");
    }

    fn scan(&self) {
        let lines = match LineReader::open(&self.path, self.range.from, Some(self.range.to)) {
            Ok(lines) => lines,
            Err(e) => {
                let _ = self.events.send(Err(e));
                return;
            }
        };

        for item in EventScan::new(lines, self.query.clone()) {
            if self.cancelled.load(Ordering::Relaxed) || self.events.send(item).is_err() {
                return;
            }
        }
    }
}
