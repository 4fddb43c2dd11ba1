//! Pipeline configuration
//!
//! All directories, caps, and the reference-source settings for one run.
//! Values come from an optional TOML file merged over root-derived defaults,
//! with `SEQGATE_*` environment variables taking precedence.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default per-stream admission cap
pub const DEFAULT_MAX_BATCH_SIZE: usize = 200;

/// Default output-backlog threshold above which nothing is admitted
pub const DEFAULT_MAX_OUTPUT_BATCH_SIZE: usize = 1000;

/// Default worker-pool size for the extraction and classification stages
pub const DEFAULT_WORKERS: usize = 4;

/// Default reference snapshot time-to-live in hours
pub const DEFAULT_REFRESH_HOURS: u64 = 8;

/// Pipeline configuration for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root data directory the default layout hangs off
    pub root_dir: PathBuf,

    /// Inbound holding area filled by the upstream transfer
    pub landing_dir: PathBuf,

    /// Working set of admitted bundles for the current run
    pub source_dir: PathBuf,

    /// Staging area extraction unpacks into
    pub staging_dir: PathBuf,

    /// General output directory consumed downstream
    pub output_dir: PathBuf,

    /// Documents that failed to parse
    pub reject_dir: PathBuf,

    /// Intermediate holding area for matched documents
    pub matched_inprocess_dir: PathBuf,

    /// Final destination for matched documents
    pub matched_dir: PathBuf,

    /// Raw bundles retained for potential replay
    pub raw_inprocess_dir: PathBuf,

    /// Terminal archive, one subdirectory per stream type
    pub archive_dir: PathBuf,

    /// Optional mirror of all admitted bundles for an external feed
    #[serde(default)]
    pub mirror_dir: Option<PathBuf>,

    /// Canonical sequence state file
    pub state_file: PathBuf,

    /// Dedicated append-only anomaly log
    pub anomaly_log: PathBuf,

    /// On-disk carrier-code reference snapshot
    pub reference_snapshot: PathBuf,

    /// External reference source endpoint; without it the pipeline runs on
    /// the last-good snapshot alone
    #[serde(default)]
    pub reference_url: Option<String>,

    /// Reference snapshot time-to-live in hours
    pub refresh_hours: u64,

    /// Per-stream admission cap
    pub max_batch_size: usize,

    /// Output-backlog threshold for backpressure
    pub max_output_batch_size: usize,

    /// Worker-pool size for both parallel stages
    pub workers: usize,
}

/// Partial file form of [`PipelineConfig`]; anything absent falls back to the
/// root-derived default.
#[derive(Debug, Default, Deserialize)]
struct PipelineConfigFile {
    root_dir: Option<PathBuf>,
    landing_dir: Option<PathBuf>,
    source_dir: Option<PathBuf>,
    staging_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    reject_dir: Option<PathBuf>,
    matched_inprocess_dir: Option<PathBuf>,
    matched_dir: Option<PathBuf>,
    raw_inprocess_dir: Option<PathBuf>,
    archive_dir: Option<PathBuf>,
    mirror_dir: Option<PathBuf>,
    state_file: Option<PathBuf>,
    anomaly_log: Option<PathBuf>,
    reference_snapshot: Option<PathBuf>,
    reference_url: Option<String>,
    refresh_hours: Option<u64>,
    max_batch_size: Option<usize>,
    max_output_batch_size: Option<usize>,
    workers: Option<usize>,
}

impl PipelineConfig {
    /// Default directory layout under `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            landing_dir: root.join("landing"),
            source_dir: root.join("batch"),
            staging_dir: root.join("tmp"),
            output_dir: root.join("out"),
            reject_dir: root.join("reject"),
            matched_inprocess_dir: root.join("matched_inprocess"),
            matched_dir: root.join("matched"),
            raw_inprocess_dir: root.join("raw_inprocess"),
            archive_dir: root.join("archive"),
            mirror_dir: None,
            state_file: root.join("sequence_state.toml"),
            anomaly_log: root.join("log").join("invalid_sequences.log"),
            reference_snapshot: root.join("reference").join("carrier_codes.csv"),
            reference_url: None,
            refresh_hours: DEFAULT_REFRESH_HOURS,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_output_batch_size: DEFAULT_MAX_OUTPUT_BATCH_SIZE,
            workers: DEFAULT_WORKERS,
            root_dir: root,
        }
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file: PipelineConfigFile = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let mut config = Self::with_root(file.root_dir.unwrap_or_else(|| PathBuf::from("./data")));

        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = file.$field {
                    config.$field = value;
                })*
            };
        }
        merge!(
            landing_dir,
            source_dir,
            staging_dir,
            output_dir,
            reject_dir,
            matched_inprocess_dir,
            matched_dir,
            raw_inprocess_dir,
            archive_dir,
            state_file,
            anomaly_log,
            reference_snapshot,
            refresh_hours,
            max_batch_size,
            max_output_batch_size,
            workers,
        );
        if file.mirror_dir.is_some() {
            config.mirror_dir = file.mirror_dir;
        }
        if file.reference_url.is_some() {
            config.reference_url = file.reference_url;
        }

        config.apply_env()?;
        Ok(config)
    }

    /// Apply `SEQGATE_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(root) = std::env::var("SEQGATE_ROOT_DIR") {
            *self = Self {
                mirror_dir: self.mirror_dir.clone(),
                reference_url: self.reference_url.clone(),
                refresh_hours: self.refresh_hours,
                max_batch_size: self.max_batch_size,
                max_output_batch_size: self.max_output_batch_size,
                workers: self.workers,
                ..Self::with_root(root)
            };
        }
        if let Ok(url) = std::env::var("SEQGATE_REFERENCE_URL") {
            self.reference_url = Some(url);
        }
        if let Ok(workers) = std::env::var("SEQGATE_WORKERS") {
            self.workers = workers
                .parse()
                .context("SEQGATE_WORKERS must be a positive integer")?;
        }
        if let Ok(size) = std::env::var("SEQGATE_MAX_BATCH_SIZE") {
            self.max_batch_size = size
                .parse()
                .context("SEQGATE_MAX_BATCH_SIZE must be a positive integer")?;
        }
        Ok(())
    }

    /// Reject configurations the run cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }
        if self.max_batch_size == 0 {
            anyhow::bail!("max_batch_size must be at least 1");
        }
        if let Some(url) = &self.reference_url {
            if url.is_empty() {
                anyhow::bail!("reference_url must not be empty when set");
            }
        }
        Ok(())
    }

    /// Create every directory the run writes into
    pub fn ensure_directories(&self) -> Result<()> {
        let mut dirs = vec![
            &self.landing_dir,
            &self.source_dir,
            &self.staging_dir,
            &self.output_dir,
            &self.reject_dir,
            &self.matched_inprocess_dir,
            &self.matched_dir,
            &self.raw_inprocess_dir,
            &self.archive_dir,
        ];
        if let Some(mirror) = &self.mirror_dir {
            dirs.push(mirror);
        }
        for dir in dirs {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        for file in [&self.state_file, &self.anomaly_log, &self.reference_snapshot] {
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {}", parent.display()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_with_root_layout() {
        let config = PipelineConfig::with_root("/data");
        assert_eq!(config.landing_dir, PathBuf::from("/data/landing"));
        assert_eq!(config.staging_dir, PathBuf::from("/data/tmp"));
        assert_eq!(config.state_file, PathBuf::from("/data/sequence_state.toml"));
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert!(config.mirror_dir.is_none());
    }

    #[test]
    fn test_load_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seqgate.toml");
        std::fs::write(
            &path,
            r#"
root_dir = "/srv/feed"
max_batch_size = 25
reference_url = "http://reference.internal/carriers"
"#,
        )
        .unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.root_dir, PathBuf::from("/srv/feed"));
        assert_eq!(config.source_dir, PathBuf::from("/srv/feed/batch"));
        assert_eq!(config.max_batch_size, 25);
        assert_eq!(
            config.reference_url.as_deref(),
            Some("http://reference.internal/carriers")
        );
        assert_eq!(config.max_output_batch_size, DEFAULT_MAX_OUTPUT_BATCH_SIZE);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = PipelineConfig::with_root("/data");
        config.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ensure_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::with_root(dir.path());
        config.ensure_directories().unwrap();
        assert!(config.source_dir.is_dir());
        assert!(config.anomaly_log.parent().unwrap().is_dir());
    }
}
