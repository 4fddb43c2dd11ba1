//! Sequence validator
//!
//! Walks the admitted working set in ascending filename order and compares
//! each bundle's sequence number against the expected value derived from the
//! stream's persisted state. Sequence numbering restarts daily: a bundle
//! dated later than the stream's last update resets the expectation to the
//! first value before comparison. A mismatch is a reported, non-fatal
//! anomaly; the stream baseline always advances to the bundle's actual
//! values, so a single gap is reported once rather than cascading.

use chrono::Local;
use seqgate_common::types::{format_sequence, FIRST_SEQUENCE};
use seqgate_common::{AdmittedItem, Result, StreamType};
use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::state::SequenceState;

/// Dedicated append-only log of sequence anomalies.
///
/// Kept separate from the operational log so reconciliation tooling and
/// operators have one chronological file with nothing but gaps in it.
#[derive(Debug)]
pub struct AnomalyLog {
    path: PathBuf,
    file: File,
}

impl AnomalyLog {
    /// Open (or create) the anomaly log for appending
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    /// Append one anomaly line with enough context for manual reconciliation
    pub fn record(
        &mut self,
        stream: StreamType,
        filename: &str,
        expected: u32,
        actual: u32,
    ) -> Result<()> {
        let line = format!(
            "{}\t{}\tInvalid sequence: {}, expected {}, got {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            stream,
            filename,
            format_sequence(expected),
            format_sequence(actual),
        );
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Tallies from one validation pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ValidationSummary {
    /// Bundles checked
    pub checked: usize,
    /// Mismatches reported to the anomaly log
    pub anomalies: usize,
}

/// Validate the admitted items against per-stream state.
///
/// `items` must be sorted ascending by filename (admission guarantees this),
/// which for these filenames is chronological plus sequence order. State is
/// mutated in place; the caller persists it afterwards regardless of how many
/// anomalies were found.
pub fn validate(
    items: &[AdmittedItem],
    states: &mut BTreeMap<StreamType, SequenceState>,
    anomaly_log: &mut AnomalyLog,
) -> Result<ValidationSummary> {
    if items.is_empty() {
        info!("No source files");
        return Ok(ValidationSummary::default());
    }

    let mut expected: HashMap<StreamType, u32> = states
        .iter()
        .map(|(stream, state)| (*stream, state.expected_sequence(*stream)))
        .collect();

    let mut summary = ValidationSummary::default();

    for item in items {
        info!("{}", item.filename);
        let state = states.entry(item.stream).or_insert_with(SequenceState::unset);
        let stream_expected = expected.entry(item.stream).or_insert(FIRST_SEQUENCE);

        // Day rollover: sequence numbering restarts each calendar day. The
        // comparison is date-only on purpose; see the state-store docs.
        if item.date > state.last_updated {
            *stream_expected = FIRST_SEQUENCE;
        }

        if item.sequence == *stream_expected {
            debug!(
                "Expected {}, got {}",
                format_sequence(*stream_expected),
                format_sequence(item.sequence)
            );
        } else {
            warn!(
                "Expected {}, got {}",
                format_sequence(*stream_expected),
                format_sequence(item.sequence)
            );
            anomaly_log.record(item.stream, &item.filename, *stream_expected, item.sequence)?;
            summary.anomalies += 1;
        }

        // Advance the baseline to the actual values either way; no
        // reconciliation or reordering is attempted.
        state.last_sequence = Some(item.sequence);
        state.last_updated = item.date;
        *stream_expected = item.stream.next_sequence(item.sequence);
        summary.checked += 1;
    }

    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fresh_states() -> BTreeMap<StreamType, SequenceState> {
        StreamType::ALL
            .into_iter()
            .map(|stream| (stream, SequenceState::unset()))
            .collect()
    }

    fn log(dir: &Path) -> AnomalyLog {
        AnomalyLog::open(dir.join("invalid_sequences.log")).unwrap()
    }

    fn item(name: &str) -> AdmittedItem {
        AdmittedItem::parse(name).unwrap()
    }

    fn anomaly_lines(log: &AnomalyLog) -> Vec<String> {
        std::fs::read_to_string(log.path())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_first_bundle_bootstraps_without_anomaly() {
        let dir = tempfile::tempdir().unwrap();
        let mut anomaly_log = log(dir.path());
        let mut states = fresh_states();

        let items = vec![item("PARSED_20240101_1000_0001.zip")];
        let summary = validate(&items, &mut states, &mut anomaly_log).unwrap();

        assert_eq!(summary, ValidationSummary { checked: 1, anomalies: 0 });
        let state = states[&StreamType::Parsed];
        assert_eq!(state.last_sequence, Some(1));
        assert_eq!(state.last_updated, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!(anomaly_lines(&anomaly_log).is_empty());
    }

    #[test]
    fn test_gap_is_reported_and_baseline_advances() {
        let dir = tempfile::tempdir().unwrap();
        let mut anomaly_log = log(dir.path());
        let mut states = fresh_states();
        states.insert(
            StreamType::Parsed,
            SequenceState {
                last_sequence: Some(1),
                last_updated: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            },
        );

        let items = vec![item("PARSED_20240101_1030_0003.zip")];
        let summary = validate(&items, &mut states, &mut anomaly_log).unwrap();

        assert_eq!(summary.anomalies, 1);
        // Baseline advances to the actual value regardless
        assert_eq!(states[&StreamType::Parsed].last_sequence, Some(3));

        let lines = anomaly_lines(&anomaly_log);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("PARSED_20240101_1030_0003.zip"));
        assert!(lines[0].contains("expected 0002"));
        assert!(lines[0].contains("got 0003"));
    }

    #[test]
    fn test_gap_reported_once_not_cascading() {
        let dir = tempfile::tempdir().unwrap();
        let mut anomaly_log = log(dir.path());
        let mut states = fresh_states();

        let items = vec![
            item("PARSED_20240101_1000_0001.zip"),
            item("PARSED_20240101_1010_0003.zip"),
            item("PARSED_20240101_1020_0004.zip"),
        ];
        let summary = validate(&items, &mut states, &mut anomaly_log).unwrap();

        assert_eq!(summary, ValidationSummary { checked: 3, anomalies: 1 });
    }

    #[test]
    fn test_same_day_wraparound_is_in_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let mut anomaly_log = log(dir.path());
        let mut states = fresh_states();
        states.insert(
            StreamType::Stored,
            SequenceState {
                last_sequence: Some(9999),
                last_updated: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            },
        );

        let items = vec![item("STORED_20240101_2359_0000.zip")];
        let summary = validate(&items, &mut states, &mut anomaly_log).unwrap();
        assert_eq!(summary.anomalies, 0);
    }

    #[test]
    fn test_day_rollover_resets_expectation() {
        let dir = tempfile::tempdir().unwrap();
        let mut anomaly_log = log(dir.path());
        let mut states = fresh_states();
        states.insert(
            StreamType::Parsed,
            SequenceState {
                last_sequence: Some(1234),
                last_updated: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            },
        );

        // Next calendar day starts over at 0001 regardless of the prior value
        let items = vec![item("PARSED_20240102_0001_0001.zip")];
        let summary = validate(&items, &mut states, &mut anomaly_log).unwrap();

        assert_eq!(summary.anomalies, 0);
        assert_eq!(states[&StreamType::Parsed].last_sequence, Some(1));
        assert_eq!(
            states[&StreamType::Parsed].last_updated,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
    }

    #[test]
    fn test_multi_day_gap_does_not_raise_anomaly() {
        // Date-only rollover detection: a multi-day silence resets the
        // expectation the same way a single-day rollover does.
        let dir = tempfile::tempdir().unwrap();
        let mut anomaly_log = log(dir.path());
        let mut states = fresh_states();
        states.insert(
            StreamType::Parsed,
            SequenceState {
                last_sequence: Some(500),
                last_updated: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            },
        );

        let items = vec![item("PARSED_20240105_0800_0001.zip")];
        let summary = validate(&items, &mut states, &mut anomaly_log).unwrap();
        assert_eq!(summary.anomalies, 0);
    }

    #[test]
    fn test_streams_validate_independently() {
        let dir = tempfile::tempdir().unwrap();
        let mut anomaly_log = log(dir.path());
        let mut states = fresh_states();

        let items = vec![
            item("FAILED_20240101_1000_0005.zip"),
            item("PARSED_20240101_1000_0001.zip"),
        ];
        let summary = validate(&items, &mut states, &mut anomaly_log).unwrap();

        // FAILED starts at 0005 (anomaly), PARSED bootstraps cleanly
        assert_eq!(summary.anomalies, 1);
        assert_eq!(states[&StreamType::Failed].last_sequence, Some(5));
        assert_eq!(states[&StreamType::Parsed].last_sequence, Some(1));
    }
}
