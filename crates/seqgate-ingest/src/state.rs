//! Sequence state store
//!
//! Persists the last-seen sequence number and date per stream type in a small
//! sectioned key-value file (TOML, one table per stream). The store is read
//! once at the start of a run and written once after validation; the previous
//! canonical file is always moved to the archive directory before the new one
//! is promoted, so sequence history is never overwritten in place.

use chrono::NaiveDate;
use seqgate_common::types::format_sequence;
use seqgate_common::{Result, SeqgateError, StreamType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Sentinel stored before a stream has seen its first bundle
const UNSET_SENTINEL: &str = "N/A";

/// Date stored before a stream has seen its first bundle
const EPOCH_DATE: &str = "19000101";

const DATE_FORMAT: &str = "%Y%m%d";

/// Per-stream sequence tracking state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceState {
    /// Sequence of the most recently validated bundle, `None` until the
    /// stream's first bundle arrives
    pub last_sequence: Option<u32>,

    /// Date of the most recently validated bundle
    pub last_updated: NaiveDate,
}

impl SequenceState {
    /// Bootstrap state for a stream with no persisted history
    pub fn unset() -> Self {
        Self {
            last_sequence: None,
            last_updated: epoch(),
        }
    }

    /// The sequence the next same-day bundle should carry
    pub fn expected_sequence(&self, stream: StreamType) -> u32 {
        match self.last_sequence {
            None => seqgate_common::types::FIRST_SEQUENCE,
            Some(last) => stream.next_sequence(last),
        }
    }
}

/// Epoch date used for never-updated streams
pub fn epoch() -> NaiveDate {
    // The literal parses; keep the fallback total anyway.
    NaiveDate::parse_from_str(EPOCH_DATE, DATE_FORMAT).unwrap_or(NaiveDate::MIN)
}

/// On-disk form of one stream section
#[derive(Debug, Serialize, Deserialize)]
struct StateRecord {
    last_sequence: String,
    last_updated: String,
}

impl StateRecord {
    fn from_state(state: &SequenceState) -> Self {
        Self {
            last_sequence: match state.last_sequence {
                None => UNSET_SENTINEL.to_string(),
                Some(seq) => format_sequence(seq),
            },
            last_updated: state.last_updated.format(DATE_FORMAT).to_string(),
        }
    }

    fn to_state(&self, path: &Path) -> Result<SequenceState> {
        let last_sequence = match self.last_sequence.as_str() {
            UNSET_SENTINEL | "" => None,
            value => Some(value.parse::<u32>().map_err(|_| SeqgateError::StateParse {
                path: path.display().to_string(),
                detail: format!("invalid last_sequence '{value}'"),
            })?),
        };
        let last_updated = NaiveDate::parse_from_str(&self.last_updated, DATE_FORMAT).map_err(
            |_| SeqgateError::StateParse {
                path: path.display().to_string(),
                detail: format!("invalid last_updated '{}'", self.last_updated),
            },
        )?;
        Ok(SequenceState {
            last_sequence,
            last_updated,
        })
    }
}

/// Durable store for per-stream [`SequenceState`]
#[derive(Debug, Clone)]
pub struct SequenceStateStore {
    path: PathBuf,
    archive_dir: PathBuf,
}

impl SequenceStateStore {
    pub fn new(path: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            archive_dir: archive_dir.into(),
        }
    }

    /// Load state for every stream type.
    ///
    /// A missing or empty file bootstraps default state (and writes the
    /// template so operators can inspect it). A file that exists but fails to
    /// parse is fatal: silently resetting sequence tracking would mask a gap.
    pub fn load(&self) -> Result<BTreeMap<StreamType, SequenceState>> {
        let missing = !self.path.exists()
            || std::fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);

        if missing {
            info!("Sequence state file missing or empty, writing template: {}", self.path.display());
            let states: BTreeMap<StreamType, SequenceState> = StreamType::ALL
                .into_iter()
                .map(|stream| (stream, SequenceState::unset()))
                .collect();
            std::fs::write(&self.path, render(&states))?;
            return Ok(states);
        }

        let raw = std::fs::read_to_string(&self.path)?;
        let records: BTreeMap<String, StateRecord> =
            toml::from_str(&raw).map_err(|err| SeqgateError::StateParse {
                path: self.path.display().to_string(),
                detail: err.to_string(),
            })?;

        let mut states = BTreeMap::new();
        for stream in StreamType::ALL {
            let state = match records.get(stream.prefix()) {
                Some(record) => record.to_state(&self.path)?,
                None => SequenceState::unset(),
            };
            debug!("Loaded state for {}: {:?}", stream, state);
            states.insert(stream, state);
        }
        Ok(states)
    }

    /// Persist state: write a temp file, archive the previous canonical file,
    /// then promote the temp file to the canonical path.
    pub fn save(&self, states: &BTreeMap<StreamType, SequenceState>) -> Result<()> {
        let temp_path = self.path.with_extension("toml.tmp");
        std::fs::write(&temp_path, render(states))?;

        if self.path.exists() {
            std::fs::create_dir_all(&self.archive_dir)?;
            let backup = self.archive_dir.join(
                self.path
                    .file_name()
                    .ok_or_else(|| SeqgateError::Config("state_file has no filename".into()))?,
            );
            debug!("Backing up sequence state to {}", backup.display());
            crate::fsops::move_file(&self.path, &backup)?;
        }

        crate::fsops::move_file(&temp_path, &self.path)?;
        debug!("Sequence state saved to {}", self.path.display());
        Ok(())
    }
}

fn render(states: &BTreeMap<StreamType, SequenceState>) -> String {
    let records: BTreeMap<&str, StateRecord> = states
        .iter()
        .map(|(stream, state)| (stream.prefix(), StateRecord::from_state(state)))
        .collect();
    // StateRecord holds only strings; serialization cannot fail.
    toml::to_string(&records).unwrap_or_default()
}
