//! Connection events and the line format they are parsed from.
//!
//! A log line is three fields separated by a single space:
//!
//! ```text
//! <epoch millis> <sourceHost> <targetHost>
//! 1609459200000 alpha beta
//! ```
//!
//! Hostnames are opaque tokens. There is no header, no comment syntax and
//! no escaping.

use crate::error::ParseError;
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// Timestamp in milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Field separator of the log format.
pub const FIELD_SEPARATOR: char = ' ';

/// One parsed connection record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event {
    /// Connection time in epoch milliseconds.
    pub timestamp: Timestamp,
    /// Host that opened the connection.
    pub source_host: String,
    /// Host that received the connection.
    pub target_host: String,
}

impl Event {
    /// Creates a new event.
    pub fn new(
        timestamp: Timestamp,
        source_host: impl Into<String>,
        target_host: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            source_host: source_host.into(),
            target_host: target_host.into(),
        }
    }

    /// Parses one log line.
    ///
    /// The line must split on [`FIELD_SEPARATOR`] into exactly three fields
    /// and the first one must be a base-10 integer. Nothing else is checked.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::FieldCount`] for any other number of fields and
    /// [`ParseError::Timestamp`] when the first field is not an integer.
    pub fn parse_line(line: &str) -> std::result::Result<Self, ParseError> {
        let mut fields = line.split(FIELD_SEPARATOR);
        let (Some(timestamp), Some(source), Some(target), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(ParseError::FieldCount {
                found: line.split(FIELD_SEPARATOR).count(),
                line: line.to_string(),
            });
        };

        let timestamp = timestamp
            .parse::<Timestamp>()
            .map_err(|source| ParseError::Timestamp {
                line: line.to_string(),
                source,
            })?;

        let event = Self::new(timestamp, source, target);
        trace!(?event, "parsed line");
        Ok(event)
    }
}

impl FromStr for Event {
    type Err = ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse_line(s)
    }
}

/// Formats the event back into its log line form.
impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
            self.timestamp, self.source_host, self.target_host
        )
    }
}
