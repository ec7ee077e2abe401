//! Live windowed statistics over a followed file.
//!
//! A window thread owns the [`FollowLines`] subscription and one
//! [`WindowAggregator`] at a time. Windows are consecutive wall-clock spans:
//! when the current window's deadline passes, its stats are pushed to an
//! unbounded channel and a fresh aggregator starts the next window. Since
//! the channel is unbounded, a slow consumer never holds back accumulation,
//! and emission order is window order.
//!
//! # States
//!
//! `Following` until either the consumer drops [`LiveStats`] (cancelled) or
//! the tailer reports an I/O error, which is yielded as the last item
//! (failed). There is no restart.

use crate::error::{ConnLogError, Result};
use crate::event::{Event, Timestamp};
use crate::source::FollowLines;
use crate::window::{StatsFilter, WindowAggregator, WindowStats};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Stats of consecutive windows of a live query.
///
/// `next()` blocks until the next window closes. Dropping the value stops
/// the window thread and the tailer and closes the file.
pub struct LiveStats {
    stats: Receiver<Result<WindowStats>>,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl LiveStats {
    /// Starts the window thread over `lines`.
    pub(crate) fn start(
        lines: FollowLines,
        filter: StatsFilter,
        window: Duration,
    ) -> Result<Self> {
        let (stats_tx, stats_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let windows = Windows {
            lines,
            filter,
            window,
            stats: stats_tx,
            shutdown: shutdown_rx,
        };
        let worker = thread::Builder::new()
            .name("connlog-window".to_string())
            .spawn(move || windows.run())
            .map_err(ConnLogError::ThreadSpawn)?;

        Ok(Self {
            stats: stats_rx,
            shutdown: Some(shutdown_tx),
            worker: Some(worker),
        })
    }
}

impl Iterator for LiveStats {
    type Item = Result<WindowStats>;

    fn next(&mut self) -> Option<Self::Item> {
        self.stats.recv().ok()
    }
}

impl Drop for LiveStats {
    fn drop(&mut self) {
        self.shutdown.take();
        self.stats = crossbeam_channel::never();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("window thread panicked");
            }
        }
        debug!("live query cancelled");
    }
}

struct Windows {
    lines: FollowLines,
    filter: StatsFilter,
    window: Duration,
    stats: Sender<Result<WindowStats>>,
    shutdown: Receiver<()>,
}

impl Windows {
    fn run(self) {
        let window_millis = i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX);
        let mut window_start = epoch_millis();
        let mut deadline = Instant::now() + self.window;
        let mut aggregator = WindowAggregator::new(window_start, self.window, &self.filter);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                window_start = window_start.saturating_add(window_millis);
                deadline += self.window;
                let closed = std::mem::replace(
                    &mut aggregator,
                    WindowAggregator::new(window_start, self.window, &self.filter),
                )
                .finish();

                debug!(
                    window_start = closed.window_start,
                    top_count = closed.top_connection_count,
                    "window closed"
                );
                if self.stats.send(Ok(closed)).is_err() {
                    return;
                }
                continue;
            }

            select! {
                recv(self.shutdown) -> _ => return,
                recv(self.lines.receiver()) -> msg => match msg {
                    Ok(Ok(line)) => accept_line(&mut aggregator, &line),
                    Ok(Err(e)) => {
                        let _ = self.stats.send(Err(e));
                        return;
                    }
                    // Tailer gone without an error item.
                    Err(_) => return,
                },
                default(remaining) => {}
            }
        }
    }
}

fn accept_line(aggregator: &mut WindowAggregator, line: &str) {
    if line.is_empty() {
        return;
    }
    match Event::parse_line(line) {
        Ok(event) => aggregator.accept(&event),
        Err(e) => warn!(error = %e, "ignoring line"),
    }
}

/// Current wall-clock time in epoch milliseconds.
fn epoch_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}
