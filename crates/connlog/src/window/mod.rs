//! Per-window connection statistics.
//!
//! A [`WindowAggregator`] accumulates the events of exactly one time window
//! and is consumed when the window closes, producing an immutable
//! [`WindowStats`]. A new aggregator is created for every window.
//!
//! # Top tracking
//!
//! Every source host has a connection counter. The aggregator keeps the
//! current maximum count and the set of hosts at that count: a host that
//! reaches the maximum joins the set, a host that exceeds it replaces the
//! set. Once any event is accepted the set is non-empty and each member has
//! exactly the maximum count.

use crate::event::{Event, Timestamp};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::trace;

/// Optional host filters of a live query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsFilter {
    /// Collect the targets this host connects to.
    pub source_host: Option<String>,
    /// Collect the sources connecting to this host.
    pub target_host: Option<String>,
}

impl StatsFilter {
    /// Creates a filter.
    pub fn new(source_host: Option<String>, target_host: Option<String>) -> Self {
        Self {
            source_host,
            target_host,
        }
    }
}

/// Statistics of one closed window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowStats {
    /// Window start in epoch milliseconds.
    pub window_start: Timestamp,
    /// Window length.
    pub window_duration: Duration,
    /// Source host filter, if configured.
    pub source_host_filter: Option<String>,
    /// Targets reached by the filtered source; `Some` iff the filter is set.
    pub targets_reached_by_filtered_source: Option<BTreeSet<String>>,
    /// Target host filter, if configured.
    pub target_host_filter: Option<String>,
    /// Sources reaching the filtered target; `Some` iff the filter is set.
    pub sources_reaching_filtered_target: Option<BTreeSet<String>>,
    /// Source hosts with the most connections in the window.
    pub top_source_hosts: BTreeSet<String>,
    /// Connection count of every host in `top_source_hosts`.
    pub top_connection_count: u64,
}

impl WindowStats {
    /// Window end (exclusive) in epoch milliseconds.
    pub fn window_end(&self) -> Timestamp {
        let millis = i64::try_from(self.window_duration.as_millis()).unwrap_or(i64::MAX);
        self.window_start.saturating_add(millis)
    }
}

/// Accumulator for one window.
#[derive(Debug)]
pub struct WindowAggregator {
    stats: WindowStats,
    connections_per_source: HashMap<String, u64>,
}

impl WindowAggregator {
    /// Creates an empty aggregator for the window starting at `window_start`.
    pub fn new(window_start: Timestamp, window_duration: Duration, filter: &StatsFilter) -> Self {
        Self {
            stats: WindowStats {
                window_start,
                window_duration,
                source_host_filter: filter.source_host.clone(),
                targets_reached_by_filtered_source: filter
                    .source_host
                    .as_ref()
                    .map(|_| BTreeSet::new()),
                target_host_filter: filter.target_host.clone(),
                sources_reaching_filtered_target: filter
                    .target_host
                    .as_ref()
                    .map(|_| BTreeSet::new()),
                top_source_hosts: BTreeSet::new(),
                top_connection_count: 0,
            },
            connections_per_source: HashMap::new(),
        }
    }

    /// Adds one event to the window.
    pub fn accept(&mut self, event: &Event) {
        let count = self
            .connections_per_source
            .entry(event.source_host.clone())
            .or_insert(0);
        *count += 1;
        let count = *count;

        let stats = &mut self.stats;
        match count.cmp(&stats.top_connection_count) {
            std::cmp::Ordering::Equal => {
                stats.top_source_hosts.insert(event.source_host.clone());
            }
            std::cmp::Ordering::Greater => {
                stats.top_connection_count = count;
                stats.top_source_hosts.clear();
                stats.top_source_hosts.insert(event.source_host.clone());
            }
            std::cmp::Ordering::Less => {}
        }

        if stats.source_host_filter.as_deref() == Some(event.source_host.as_str()) {
            if let Some(targets) = stats.targets_reached_by_filtered_source.as_mut() {
                targets.insert(event.target_host.clone());
            }
        }
        if stats.target_host_filter.as_deref() == Some(event.target_host.as_str()) {
            if let Some(sources) = stats.sources_reaching_filtered_target.as_mut() {
                sources.insert(event.source_host.clone());
            }
        }
        trace!(source = %event.source_host, count, "window accepted event");
    }

    /// Number of distinct source hosts seen so far.
    pub fn distinct_sources(&self) -> usize {
        self.connections_per_source.len()
    }

    /// Returns the statistics accumulated so far.
    pub fn snapshot(&self) -> WindowStats {
        self.stats.clone()
    }

    /// Closes the window and returns its statistics.
    pub fn finish(self) -> WindowStats {
        self.stats
    }
}
