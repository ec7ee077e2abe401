//! Line sources over a log file.
//!
//! - [`LineReader`]: bounded, lazy reading of one byte range
//! - [`FollowLines`]: unbounded tailing of a growing file
//! - [`plan_splits`]: line aligned ranges for parallel scans
//! - [`TimestampSeeker`]: lower-bound offset for a timestamp

pub mod lines;
pub mod range;
pub mod seek;
pub mod split;
pub mod tail;

pub use lines::{line_at_fraction, read_lines, LineReader};
pub use range::ByteRange;
pub use seek::{seek_timestamp, TimestampSeeker};
pub use split::plan_splits;
pub use tail::{follow, FollowLines};
