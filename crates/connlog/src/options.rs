//! User supplied query options.
//!
//! [`QueryOptions`] mirrors what a command line or properties layer hands to
//! the engine. Validation happens here, synchronously, before any file is
//! touched, and every failure is [`ConnLogError::UserInput`].

use crate::error::{ConnLogError, Result};
use crate::event::Timestamp;
use crate::query::{BoundedQuery, DEFAULT_TOLERANCE_MILLIS};
use crate::window::StatsFilter;
use chrono::{DateTime, NaiveDateTime};
use std::str::FromStr;
use std::time::Duration;

/// Default live query window as an ISO-8601 duration.
pub const DEFAULT_STATS_WINDOW: &str = "PT1H";

/// What the engine does with the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkingMode {
    /// Bounded historical query.
    #[default]
    Parse,
    /// Live windowed statistics.
    Follow,
}

impl FromStr for WorkingMode {
    type Err = ConnLogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "parse" => Ok(Self::Parse),
            "follow" => Ok(Self::Follow),
            other => Err(ConnLogError::UserInput(format!(
                "unknown working mode {other:?}, expected \"parse\" or \"follow\""
            ))),
        }
    }
}

/// Options of one engine run.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    /// Bounded query or live statistics.
    pub mode: WorkingMode,
    /// Target host of a bounded query, or target filter of a live query.
    pub target_host: Option<String>,
    /// Source filter of a live query.
    pub source_host: Option<String>,
    /// Interval start, epoch millis. Takes precedence over `init_datetime`.
    pub init_timestamp: Option<Timestamp>,
    /// Interval end, epoch millis. Takes precedence over `end_datetime`.
    pub end_timestamp: Option<Timestamp>,
    /// Interval start as ISO-8601 datetime.
    pub init_datetime: Option<String>,
    /// Interval end as ISO-8601 datetime.
    pub end_datetime: Option<String>,
    /// Live window length as ISO-8601 duration. Default: `PT1H`.
    pub stats_window: String,
    /// Parallel shards of a bounded query; 0 scans sequentially.
    pub splits: usize,
    /// Order tolerance in milliseconds. Default: 5 minutes.
    pub tolerance_millis: i64,
    /// Seek near the interval start before scanning.
    pub presearch_timestamp: bool,
    /// Report distinct source hosts instead of events.
    pub unique_hosts: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            mode: WorkingMode::Parse,
            target_host: None,
            source_host: None,
            init_timestamp: None,
            end_timestamp: None,
            init_datetime: None,
            end_datetime: None,
            stats_window: DEFAULT_STATS_WINDOW.to_string(),
            splits: 0,
            tolerance_millis: DEFAULT_TOLERANCE_MILLIS,
            presearch_timestamp: false,
            unique_hosts: false,
        }
    }
}

impl QueryOptions {
    /// Resolves the interval start from the timestamp or the datetime.
    pub fn init_millis(&self) -> Result<Option<Timestamp>> {
        resolve_millis(self.init_timestamp, self.init_datetime.as_deref())
    }

    /// Resolves the interval end from the timestamp or the datetime.
    pub fn end_millis(&self) -> Result<Option<Timestamp>> {
        resolve_millis(self.end_timestamp, self.end_datetime.as_deref())
    }

    /// Builds the bounded query these options describe.
    ///
    /// # Errors
    ///
    /// Returns [`ConnLogError::UserInput`] when the target host or either
    /// interval end is missing or malformed, when `init > end`, or when the
    /// tolerance is negative.
    pub fn bounded_query(&self) -> Result<BoundedQuery> {
        let target = self
            .target_host
            .as_deref()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ConnLogError::UserInput("target host is required".to_string()))?;
        let init = self.init_millis()?.ok_or_else(|| {
            ConnLogError::UserInput("init timestamp or datetime is required".to_string())
        })?;
        let end = self.end_millis()?.ok_or_else(|| {
            ConnLogError::UserInput("end timestamp or datetime is required".to_string())
        })?;

        if init > end {
            return Err(ConnLogError::UserInput(format!(
                "init timestamp {init} is after end timestamp {end}"
            )));
        }
        if self.tolerance_millis < 0 {
            return Err(ConnLogError::UserInput(format!(
                "tolerance must not be negative, got {}",
                self.tolerance_millis
            )));
        }

        Ok(BoundedQuery::new(target, init, end)
            .with_tolerance(self.tolerance_millis)
            .with_presearch(self.presearch_timestamp))
    }

    /// Host filters of a live query.
    pub fn stats_filter(&self) -> StatsFilter {
        StatsFilter::new(self.source_host.clone(), self.target_host.clone())
    }

    /// Parsed live window length.
    pub fn window_duration(&self) -> Result<Duration> {
        parse_window_duration(&self.stats_window)
    }
}

fn resolve_millis(millis: Option<Timestamp>, datetime: Option<&str>) -> Result<Option<Timestamp>> {
    match (millis, datetime) {
        (Some(millis), _) => Ok(Some(millis)),
        (None, Some(datetime)) => parse_datetime_millis(datetime).map(Some),
        (None, None) => Ok(None),
    }
}

/// Parses an ISO-8601 datetime into epoch milliseconds.
///
/// Accepts RFC 3339 (`2011-12-03T10:15:30Z`, `2011-12-03T10:15:30+01:00`)
/// and local datetimes without offset (`2011-12-03T10:15:30`), which are
/// taken as UTC.
pub fn parse_datetime_millis(value: &str) -> Result<Timestamp> {
    let value = value.trim();
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Ok(datetime.timestamp_millis());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .map(|naive| naive.and_utc().timestamp_millis())
        .map_err(|e| ConnLogError::UserInput(format!("invalid datetime {value:?}: {e}")))
}

/// Parses an ISO-8601 duration of the form `PnDTnHnMnS`.
///
/// Years, months and weeks are rejected since their length in time is not
/// fixed. Seconds may carry a fraction (`PT0.5S`). The duration must be
/// positive.
pub fn parse_window_duration(value: &str) -> Result<Duration> {
    let invalid = |reason: &str| {
        ConnLogError::UserInput(format!("invalid window duration {value:?}: {reason}"))
    };

    let upper = value.trim().to_ascii_uppercase();
    let rest = upper
        .strip_prefix('P')
        .ok_or_else(|| invalid("must start with 'P'"))?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => {
            if time.is_empty() {
                return Err(invalid("empty time part"));
            }
            (date, time)
        }
        None => (rest, ""),
    };
    if date_part.is_empty() && time_part.is_empty() {
        return Err(invalid("no components"));
    }

    let mut seconds = 0f64;
    for (number, unit) in components(date_part).map_err(|r| invalid(&r))? {
        match unit {
            'D' => seconds += number * 86_400.0,
            _ => return Err(invalid("only days are supported before 'T'")),
        }
    }
    for (number, unit) in components(time_part).map_err(|r| invalid(&r))? {
        seconds += match unit {
            'H' => number * 3_600.0,
            'M' => number * 60.0,
            'S' => number,
            _ => return Err(invalid("expected H, M or S after 'T'")),
        };
    }

    let duration =
        Duration::try_from_secs_f64(seconds).map_err(|_| invalid("out of range"))?;
    if duration.is_zero() {
        return Err(invalid("must be positive"));
    }
    Ok(duration)
}

/// Splits `1H30M` into `[(1.0, 'H'), (30.0, 'M')]`.
fn components(part: &str) -> std::result::Result<Vec<(f64, char)>, String> {
    let mut out = Vec::new();
    let mut number = String::new();
    for c in part.chars() {
        if c.is_ascii_digit() || c == '.' || c == ',' {
            number.push(if c == ',' { '.' } else { c });
        } else {
            let value = number
                .parse::<f64>()
                .map_err(|_| format!("missing number before '{c}'"))?;
            out.push((value, c));
            number.clear();
        }
    }
    if !number.is_empty() {
        return Err(format!("trailing number {number:?} without unit"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_mode_from_str() {
        assert_eq!("parse".parse::<WorkingMode>().unwrap(), WorkingMode::Parse);
        assert_eq!("FOLLOW".parse::<WorkingMode>().unwrap(), WorkingMode::Follow);
        assert!(matches!(
            "tail".parse::<WorkingMode>(),
            Err(ConnLogError::UserInput(_))
        ));
    }

    #[test]
    fn test_parse_window_duration() {
        assert_eq!(parse_window_duration("PT1H").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_window_duration("PT15M").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_window_duration("pt30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_window_duration("PT0.5S").unwrap(), Duration::from_millis(500));
        assert_eq!(
            parse_window_duration("P1DT2H3M4S").unwrap(),
            Duration::from_secs(86_400 + 7_200 + 180 + 4)
        );
        assert_eq!(parse_window_duration("P2D").unwrap(), Duration::from_secs(172_800));
    }

    #[test]
    fn test_parse_window_duration_rejects() {
        for value in ["", "1H", "P", "PT", "PT0S", "P1M", "PT1X", "PT5", "PTH", "P1W"] {
            assert!(
                matches!(parse_window_duration(value), Err(ConnLogError::UserInput(_))),
                "{value:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_datetime_millis() {
        assert_eq!(
            parse_datetime_millis("2021-01-01T00:00:00Z").unwrap(),
            1_609_459_200_000
        );
        assert_eq!(
            parse_datetime_millis("2021-01-01T01:00:00+01:00").unwrap(),
            1_609_459_200_000
        );
        assert_eq!(
            parse_datetime_millis("2021-01-01T00:00:00.250").unwrap(),
            1_609_459_200_250
        );
        assert_eq!(parse_datetime_millis("2021-01-01T00:01").unwrap(), 1_609_459_260_000);
        assert!(matches!(
            parse_datetime_millis("yesterday"),
            Err(ConnLogError::UserInput(_))
        ));
    }

    #[test]
    fn test_bounded_query_from_options() {
        let options = QueryOptions {
            target_host: Some("db".to_string()),
            init_timestamp: Some(1_000),
            end_datetime: Some("1970-01-01T00:00:02Z".to_string()),
            tolerance_millis: 10,
            presearch_timestamp: true,
            ..Default::default()
        };

        let query = options.bounded_query().unwrap();
        assert_eq!(query.target_host, "db");
        assert_eq!(query.init_timestamp, 1_000);
        assert_eq!(query.end_timestamp, 2_000);
        assert_eq!(query.tolerance_millis, 10);
        assert!(query.presearch);
    }

    #[test]
    fn test_timestamp_wins_over_datetime() {
        let options = QueryOptions {
            init_timestamp: Some(5),
            init_datetime: Some("not a date".to_string()),
            ..Default::default()
        };
        assert_eq!(options.init_millis().unwrap(), Some(5));
    }

    #[test]
    fn test_bounded_query_validation() {
        let valid = QueryOptions {
            target_host: Some("db".to_string()),
            init_timestamp: Some(1),
            end_timestamp: Some(2),
            ..Default::default()
        };
        assert!(valid.bounded_query().is_ok());

        let cases = [
            QueryOptions { target_host: None, ..valid.clone() },
            QueryOptions { target_host: Some(String::new()), ..valid.clone() },
            QueryOptions { init_timestamp: None, ..valid.clone() },
            QueryOptions { end_timestamp: None, ..valid.clone() },
            QueryOptions { init_timestamp: Some(3), ..valid.clone() },
            QueryOptions { tolerance_millis: -1, ..valid.clone() },
        ];
        for options in cases {
            assert!(
                matches!(options.bounded_query(), Err(ConnLogError::UserInput(_))),
                "{options:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_defaults() {
        let options = QueryOptions::default();
        assert_eq!(options.mode, WorkingMode::Parse);
        assert_eq!(options.window_duration().unwrap(), Duration::from_secs(3600));
        assert_eq!(options.tolerance_millis, 300_000);
        assert_eq!(options.splits, 0);
        assert_eq!(options.stats_filter(), StatsFilter::default());
    }
}
