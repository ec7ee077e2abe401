//! Alopex ConnLog - streaming analytics over connection event logs
//!
//! This crate reads append-only logs of `<timestamp> <sourceHost> <targetHost>`
//! lines and answers two kinds of queries:
//!
//! - bounded: which hosts connected to a target between two timestamps,
//!   sequentially or over parallel line aligned shards, optionally starting
//!   near the lower bound found by binary search
//! - live: follow the growing file and emit per-window statistics (top
//!   talkers, optional source and target filters)
//!
//! # Components
//!
//! - [`LineReader`] / [`FollowLines`]: bounded and tailing line sources
//! - [`plan_splits`]: line aligned byte ranges for parallel scans
//! - [`TimestampSeeker`]: lower-bound byte offset for a timestamp
//! - [`Event`]: one parsed line
//! - [`WindowAggregator`]: per-window statistics with tie-aware top tracking
//! - [`QueryEngine`]: composes the above into bounded and live queries
//!
//! # Example
//!
//! ```rust,no_run
//! use alopex_connlog::{BoundedQuery, EngineConfig, QueryEngine};
//!
//! let engine = QueryEngine::new(EngineConfig::default());
//! let query = BoundedQuery::new("db-1", 1_609_459_200_000, 1_609_462_800_000)
//!     .with_tolerance(60_000)
//!     .with_presearch(true);
//!
//! for event in engine.run_bounded_query("connections.log", &query, 4)? {
//!     let event = event?;
//!     println!("{} connected to {}", event.source_host, event.target_host);
//! }
//! # Ok::<(), alopex_connlog::ConnLogError>(())
//! ```

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod event;
pub mod options;
pub mod query;
pub mod source;
pub mod window;

pub use config::EngineConfig;
pub use error::{ConnLogError, ParseError, Result};
pub use event::{Event, Timestamp};
pub use options::{parse_datetime_millis, parse_window_duration, QueryOptions, WorkingMode};
pub use query::{
    unique_sources, BoundedEvents, BoundedQuery, EventStream, LiveStats, QueryEngine,
    ShardedEvents,
};
pub use source::{
    follow, line_at_fraction, plan_splits, read_lines, seek_timestamp, ByteRange, FollowLines,
    LineReader, TimestampSeeker,
};
pub use window::{StatsFilter, WindowAggregator, WindowStats};
