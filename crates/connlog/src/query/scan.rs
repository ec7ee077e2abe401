//! Sequential bounded scans.

use crate::error::Result;
use crate::event::Event;
use crate::query::BoundedQuery;
use crate::source::LineReader;
use tracing::{trace, warn};

/// Parses and filters a line sequence for one bounded query.
///
/// Empty lines are skipped, malformed lines are skipped with a warning. The
/// scan finishes at the first event past the query's upper bound or at the
/// first I/O error, which is yielded as the last item.
pub(crate) struct EventScan<I> {
    lines: I,
    query: BoundedQuery,
    finished: bool,
}

impl<I> EventScan<I>
where
    I: Iterator<Item = Result<String>>,
{
    pub(crate) fn new(lines: I, query: BoundedQuery) -> Self {
        Self {
            lines,
            query,
            finished: false,
        }
    }
}

impl<I> Iterator for EventScan<I>
where
    I: Iterator<Item = Result<String>>,
{
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    return None;
                }
            };
            if line.is_empty() {
                continue;
            }

            let event = match Event::parse_line(&line) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "ignoring line");
                    continue;
                }
            };
            if event.timestamp > self.query.upper_bound() {
                trace!(timestamp = event.timestamp, "scan passed upper bound");
                self.finished = true;
                return None;
            }
            if self.query.matches(&event) {
                return Some(Ok(event));
            }
        }
        None
    }
}

/// Events of a sequential bounded query, in file order.
///
/// Holds one open file handle, released on drop.
pub struct BoundedEvents {
    scan: EventScan<LineReader>,
}

impl BoundedEvents {
    pub(crate) fn new(lines: LineReader, query: BoundedQuery) -> Self {
        Self {
            scan: EventScan::new(lines, query),
        }
    }
}

impl Iterator for BoundedEvents {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        self.scan.next()
    }
}
