//! Common types used across seqgate
//!
//! The feed encodes everything the pipeline needs to know about a bundle in
//! its filename: `<PREFIX>_<YYYYMMDD>_<HHMM>_<SSSS>.zip`, where `SSSS` is a
//! zero-padded sequence number that restarts every calendar day.

use crate::error::{Result, SeqgateError};
use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

/// Number of distinct sequence values per stream (sequences are `0000`-`9999`)
pub const MAX_SEQUENCE: u32 = 10_000;

/// First sequence value issued after a daily reset
pub const FIRST_SEQUENCE: u32 = 1;

/// Width of the zero-padded sequence field in filenames and state files
pub const SEQUENCE_WIDTH: usize = 4;

static RAW_RE: OnceLock<Regex> = OnceLock::new();
static PARSED_RE: OnceLock<Regex> = OnceLock::new();
static STORED_RE: OnceLock<Regex> = OnceLock::new();
static FAILED_RE: OnceLock<Regex> = OnceLock::new();

/// A category of inbound bundle, distinguished by filename prefix.
///
/// Each stream type carries its own independent sequence numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamType {
    /// Original unparsed feed bundles, retained for replay
    Raw,
    /// Parsed message bundles, the main classification input
    Parsed,
    /// Bundles already stored upstream
    Stored,
    /// Bundles the upstream feed failed to process
    Failed,
}

impl StreamType {
    /// All stream types, in prefix order
    pub const ALL: [StreamType; 4] = [
        StreamType::Raw,
        StreamType::Parsed,
        StreamType::Stored,
        StreamType::Failed,
    ];

    /// Filename prefix for this stream type
    pub fn prefix(&self) -> &'static str {
        match self {
            StreamType::Raw => "RAW",
            StreamType::Parsed => "PARSED",
            StreamType::Stored => "STORED",
            StreamType::Failed => "FAILED",
        }
    }

    /// Terminal archive subdirectory name for this stream type
    pub fn archive_subdir(&self) -> &'static str {
        match self {
            StreamType::Raw => "raw",
            StreamType::Parsed => "parsed",
            StreamType::Stored => "stored",
            StreamType::Failed => "failed",
        }
    }

    /// Compiled filename pattern matching only bundles of this type
    pub fn pattern(&self) -> &'static Regex {
        let (cell, prefix) = match self {
            StreamType::Raw => (&RAW_RE, "RAW"),
            StreamType::Parsed => (&PARSED_RE, "PARSED"),
            StreamType::Stored => (&STORED_RE, "STORED"),
            StreamType::Failed => (&FAILED_RE, "FAILED"),
        };
        cell.get_or_init(|| {
            let pattern = format!(r"^{prefix}_[0-9]{{8}}_[0-9]{{4}}_[0-9]{{4}}.*\.zip$");
            #[allow(clippy::expect_used)]
            Regex::new(&pattern).expect("stream pattern is a valid literal regex")
        })
    }

    /// Determine the stream type of a filename, if it matches any pattern
    pub fn from_filename(filename: &str) -> Option<StreamType> {
        StreamType::ALL
            .into_iter()
            .find(|stream| stream.pattern().is_match(filename))
    }

    /// Whether a filename matches any stream-type pattern
    pub fn matches_any(filename: &str) -> bool {
        StreamType::from_filename(filename).is_some()
    }

    /// Next sequence value after `sequence`, wrapping at [`MAX_SEQUENCE`]
    pub fn next_sequence(&self, sequence: u32) -> u32 {
        (sequence + 1) % MAX_SEQUENCE
    }
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// Format a sequence number the way filenames and the state file carry it
pub fn format_sequence(sequence: u32) -> String {
    format!("{sequence:0width$}", width = SEQUENCE_WIDTH)
}

/// An inbound bundle admitted into the current run's working set.
///
/// Holds the fields parsed positionally from the filename. The `time` field
/// is carried for completeness but takes no part in sequence validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmittedItem {
    pub stream: StreamType,
    pub filename: String,
    pub date: NaiveDate,
    pub time: String,
    pub sequence: u32,
}

impl AdmittedItem {
    /// Parse a bundle filename into its admitted-item fields.
    ///
    /// Fails if the name matches no stream-type pattern or the embedded date
    /// is not a real calendar date.
    pub fn parse(filename: &str) -> Result<AdmittedItem> {
        let stream = StreamType::from_filename(filename)
            .ok_or_else(|| SeqgateError::InvalidFilename(filename.to_string()))?;

        // The pattern guarantees the positional layout below.
        let mut parts = filename.split('_');
        let _prefix = parts.next();
        let date_part = parts
            .next()
            .ok_or_else(|| SeqgateError::InvalidFilename(filename.to_string()))?;
        let time_part = parts
            .next()
            .ok_or_else(|| SeqgateError::InvalidFilename(filename.to_string()))?;
        let seq_part = parts
            .next()
            .ok_or_else(|| SeqgateError::InvalidFilename(filename.to_string()))?;

        let date = NaiveDate::parse_from_str(date_part, "%Y%m%d")
            .map_err(|_| SeqgateError::InvalidFilename(filename.to_string()))?;

        let sequence: u32 = seq_part
            .get(..SEQUENCE_WIDTH)
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| SeqgateError::InvalidFilename(filename.to_string()))?;

        Ok(AdmittedItem {
            stream,
            filename: filename.to_string(),
            date,
            time: time_part.to_string(),
            sequence,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_type_from_filename() {
        assert_eq!(
            StreamType::from_filename("PARSED_20240101_1000_0001.zip"),
            Some(StreamType::Parsed)
        );
        assert_eq!(
            StreamType::from_filename("RAW_20240101_2359_9999.zip"),
            Some(StreamType::Raw)
        );
        assert_eq!(StreamType::from_filename("OTHER_20240101_1000_0001.zip"), None);
        assert_eq!(StreamType::from_filename("PARSED_2024_1000_0001.zip"), None);
        assert_eq!(StreamType::from_filename("PARSED_20240101_1000_0001.txt"), None);
    }

    #[test]
    fn test_pattern_allows_suffix_before_extension() {
        assert_eq!(
            StreamType::from_filename("STORED_20240101_1000_0042_retry.zip"),
            Some(StreamType::Stored)
        );
    }

    #[test]
    fn test_admitted_item_parse() {
        let item = AdmittedItem::parse("PARSED_20240101_1000_0001.zip").unwrap();
        assert_eq!(item.stream, StreamType::Parsed);
        assert_eq!(item.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(item.time, "1000");
        assert_eq!(item.sequence, 1);
    }

    #[test]
    fn test_admitted_item_rejects_bad_date() {
        // Matches the pattern but is not a real calendar date
        assert!(AdmittedItem::parse("PARSED_20241332_1000_0001.zip").is_err());
    }

    #[test]
    fn test_admitted_item_rejects_unknown_prefix() {
        assert!(AdmittedItem::parse("UNKNOWN_20240101_1000_0001.zip").is_err());
    }

    #[test]
    fn test_sequence_wraparound() {
        assert_eq!(StreamType::Parsed.next_sequence(9999), 0);
        assert_eq!(StreamType::Parsed.next_sequence(0), 1);
        assert_eq!(StreamType::Parsed.next_sequence(41), 42);
    }

    #[test]
    fn test_format_sequence() {
        assert_eq!(format_sequence(1), "0001");
        assert_eq!(format_sequence(9999), "9999");
        assert_eq!(format_sequence(0), "0000");
    }
}
