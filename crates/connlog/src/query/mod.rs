//! Query orchestration.
//!
//! [`QueryEngine`] composes the line sources, the parser, the seeker and the
//! window aggregator into three queries:
//!
//! - sequential bounded query: one reader from the start offset to the
//!   upper bound ([`BoundedEvents`])
//! - parallel bounded query: one job per planned shard on a pool owned by the
//!   query, merged into one channel ([`ShardedEvents`])
//! - live query: tail the file, bucket events into wall-clock windows and
//!   emit one [`WindowStats`](crate::WindowStats) per window ([`LiveStats`])
//!
//! Every returned sequence owns its resources and releases them on drop,
//! whether it was drained, failed or abandoned half way.
//!
//! # Bounds
//!
//! A bounded query includes events of the target host with timestamps in
//! `[init - tolerance, end + tolerance]` and stops reading at the first event
//! past `end + tolerance`, relying on the file being roughly time ordered.

mod live;
mod scan;
mod sharded;

pub use live::LiveStats;
pub use scan::BoundedEvents;
pub use sharded::ShardedEvents;

use crate::config::EngineConfig;
use crate::error::{ConnLogError, Result};
use crate::event::{Event, Timestamp};
use crate::source::{follow, plan_splits, ByteRange, LineReader, TimestampSeeker};
use crate::window::StatsFilter;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Default order tolerance (5 minutes).
pub const DEFAULT_TOLERANCE_MILLIS: i64 = 5 * 60 * 1000;

/// Parameters of a bounded historical query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedQuery {
    /// Only events to this host are returned.
    pub target_host: String,
    /// Start of the queried interval, epoch millis.
    pub init_timestamp: Timestamp,
    /// End of the queried interval, epoch millis.
    pub end_timestamp: Timestamp,
    /// Slack added on both sides of the interval for out of order lines.
    pub tolerance_millis: i64,
    /// Seek near the lower bound instead of scanning from byte 0.
    pub presearch: bool,
}

impl BoundedQuery {
    /// Creates a query with the default tolerance and no presearch.
    pub fn new(
        target_host: impl Into<String>,
        init_timestamp: Timestamp,
        end_timestamp: Timestamp,
    ) -> Self {
        Self {
            target_host: target_host.into(),
            init_timestamp,
            end_timestamp,
            tolerance_millis: DEFAULT_TOLERANCE_MILLIS,
            presearch: false,
        }
    }

    /// Sets the tolerance. Negative values count as 0.
    pub fn with_tolerance(mut self, tolerance_millis: i64) -> Self {
        self.tolerance_millis = tolerance_millis.max(0);
        self
    }

    /// Enables or disables the presearch seek.
    pub fn with_presearch(mut self, presearch: bool) -> Self {
        self.presearch = presearch;
        self
    }

    /// Smallest included timestamp.
    pub fn lower_bound(&self) -> Timestamp {
        self.init_timestamp.saturating_sub(self.tolerance_millis)
    }

    /// Largest included timestamp; reading stops past it.
    pub fn upper_bound(&self) -> Timestamp {
        self.end_timestamp.saturating_add(self.tolerance_millis)
    }

    /// Returns true if `event` belongs to the result.
    pub fn matches(&self, event: &Event) -> bool {
        event.target_host == self.target_host
            && event.timestamp >= self.lower_bound()
            && event.timestamp <= self.upper_bound()
    }
}

/// Result of [`QueryEngine::run_bounded_query`].
pub enum EventStream {
    /// Single reader, file order.
    Sequential(BoundedEvents),
    /// Merged shards, order unspecified across shards.
    Parallel(ShardedEvents),
}

impl Iterator for EventStream {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Sequential(events) => events.next(),
            Self::Parallel(events) => events.next(),
        }
    }
}

/// Entry point for bounded and live queries over connection logs.
pub struct QueryEngine {
    config: EngineConfig,
}

impl QueryEngine {
    /// Creates an engine. Threads are started per query, not here.
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns a seeker using the engine limits.
    pub fn seeker(&self) -> TimestampSeeker {
        TimestampSeeker::from_config(&self.config)
    }

    /// Byte offset a bounded query starts reading at.
    ///
    /// Without presearch this is 0. With presearch an aborted seek falls back
    /// to 0; I/O errors are returned.
    pub fn start_offset(&self, path: impl AsRef<Path>, query: &BoundedQuery) -> Result<u64> {
        if !query.presearch {
            return Ok(0);
        }
        match self.seeker().seek(path, query.lower_bound()) {
            Ok(offset) => Ok(offset),
            Err(e) if e.is_seek_aborted() => {
                warn!(error = %e, "presearch aborted, scanning from start");
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Runs a sequential bounded query.
    ///
    /// # Errors
    ///
    /// Returns [`ConnLogError::Io`] if the file cannot be opened or searched.
    pub fn scan(&self, path: impl AsRef<Path>, query: &BoundedQuery) -> Result<BoundedEvents> {
        let path = path.as_ref();
        let offset = self.start_offset(path, query)?;
        let lines = LineReader::open(path, resume_point(offset), None)?;
        debug!(path = %path.display(), offset, "sequential scan started");
        Ok(BoundedEvents::new(lines, query.clone()))
    }

    /// Runs a parallel bounded query over at most `splits` shards.
    ///
    /// # Errors
    ///
    /// Returns [`ConnLogError::UserInput`] for 0 splits, [`ConnLogError::Io`]
    /// if the file cannot be planned or searched and
    /// [`ConnLogError::ThreadSpawn`] if the shard pool cannot be started.
    pub fn scan_parallel(
        &self,
        path: impl AsRef<Path>,
        query: &BoundedQuery,
        splits: usize,
    ) -> Result<ShardedEvents> {
        let path = path.as_ref();
        let offset = self.start_offset(path, query)?;
        let ranges = clamp_ranges(plan_splits(path, splits)?, resume_point(offset));
        debug!(
            path = %path.display(),
            offset,
            shards = ranges.len(),
            "parallel scan started"
        );
        ShardedEvents::start(path, ranges, query, &self.config)
    }

    /// Runs a bounded query, sequentially for 0 splits, in parallel otherwise.
    ///
    /// # Errors
    ///
    /// See [`scan`](Self::scan) and [`scan_parallel`](Self::scan_parallel).
    pub fn run_bounded_query(
        &self,
        path: impl AsRef<Path>,
        query: &BoundedQuery,
        splits: usize,
    ) -> Result<EventStream> {
        if splits == 0 {
            self.scan(path, query).map(EventStream::Sequential)
        } else {
            self.scan_parallel(path, query, splits)
                .map(EventStream::Parallel)
        }
    }

    /// Follows `path` from its current end and emits stats per window.
    ///
    /// # Errors
    ///
    /// Returns [`ConnLogError::UserInput`] for a zero window,
    /// [`ConnLogError::Io`] if the file cannot be created or opened and
    /// [`ConnLogError::ThreadSpawn`] if a thread cannot be started.
    pub fn run_live_query(
        &self,
        path: impl AsRef<Path>,
        filter: StatsFilter,
        window: Duration,
    ) -> Result<LiveStats> {
        if window.is_zero() {
            return Err(ConnLogError::UserInput(
                "window duration must be positive".to_string(),
            ));
        }
        let lines = follow(
            path,
            true,
            self.config.poll_interval,
            self.config.channel_capacity,
        )?;
        debug!(path = %lines.path().display(), ?window, ?filter, "live query started");
        LiveStats::start(lines, filter, window)
    }
}

/// Collects the distinct source hosts of an event sequence.
///
/// # Errors
///
/// Returns the first error item of `events`.
pub fn unique_sources<I>(events: I) -> Result<BTreeSet<String>>
where
    I: IntoIterator<Item = Result<Event>>,
{
    events
        .into_iter()
        .map(|event| event.map(|e| e.source_host))
        .collect()
}

/// Reader start offset that keeps the line starting at `offset`.
///
/// A reader discards the line touching its start, so start on the last byte
/// of the previous line.
fn resume_point(offset: u64) -> u64 {
    offset.saturating_sub(1)
}

/// Drops ranges ending before `start` and clamps the first remaining one.
fn clamp_ranges(ranges: Vec<ByteRange>, start: u64) -> Vec<ByteRange> {
    if start == 0 {
        return ranges;
    }
    ranges
        .into_iter()
        .filter_map(|range| range.starting_at(start))
        .collect()
}
