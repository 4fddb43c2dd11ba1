//! Extraction stage
//!
//! Unpacks each admitted bundle into a per-bundle staging subdirectory named
//! after the bundle with its extension stripped. Units run on the shared
//! worker pool; a corrupt or unreadable bundle is reported as a failure and
//! left in place untouched, so the next scheduler invocation naturally
//! retries it.

use seqgate_common::AdmittedItem;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;
use zip::ZipArchive;

use crate::pool::{log_failures, map_tasks, TaskOutcome};

/// One unit of extraction work
#[derive(Debug, Clone)]
pub struct ExtractTask {
    /// Full path of the source bundle
    pub archive_path: PathBuf,
    /// Staging area the per-bundle subdirectory is created in
    pub staging_dir: PathBuf,
}

impl ExtractTask {
    pub fn new(source_dir: &Path, staging_dir: &Path, item: &AdmittedItem) -> Self {
        Self {
            archive_path: source_dir.join(&item.filename),
            staging_dir: staging_dir.to_path_buf(),
        }
    }
}

/// Tallies from one extraction pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractSummary {
    pub total: usize,
    pub errors: usize,
}

/// Outcome of one extraction unit, keyed by bundle filename so the archival
/// router can skip bundles whose contents never reached staging
#[derive(Debug, Clone)]
pub struct ExtractOutcome {
    pub filename: String,
    pub success: bool,
    pub detail: String,
}

impl TaskOutcome for ExtractOutcome {
    fn failed(detail: String) -> Self {
        Self {
            filename: String::new(),
            success: false,
            detail,
        }
    }

    fn is_success(&self) -> bool {
        self.success
    }

    fn detail(&self) -> &str {
        &self.detail
    }
}

/// Per-bundle results of the extraction stage
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub summary: ExtractSummary,
    /// Filenames of bundles whose extraction failed; these stay in the
    /// source dir and retry on the next scheduler invocation
    pub failed_bundles: HashSet<String>,
}

/// Unpack one bundle into `staging_dir/<stem>/`
pub fn extract_bundle(task: ExtractTask) -> ExtractOutcome {
    let name = task
        .archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| task.archive_path.display().to_string());
    let stem = name.strip_suffix(".zip").unwrap_or(&name);
    let dest = task.staging_dir.join(stem);

    let unpack = || -> Result<(), String> {
        std::fs::create_dir_all(&dest).map_err(|e| e.to_string())?;
        let file = File::open(&task.archive_path).map_err(|e| e.to_string())?;
        let mut archive = ZipArchive::new(file).map_err(|e| e.to_string())?;
        archive.extract(&dest).map_err(|e| e.to_string())?;
        Ok(())
    };

    match unpack() {
        Ok(()) => ExtractOutcome {
            filename: name.clone(),
            success: true,
            detail: name,
        },
        Err(detail) => ExtractOutcome {
            filename: name.clone(),
            success: false,
            detail: format!("{name}: {detail}"),
        },
    }
}

/// Run the extraction pool over the whole admitted working set
pub async fn run_extraction(
    items: &[AdmittedItem],
    source_dir: &Path,
    staging_dir: &Path,
    workers: usize,
) -> ExtractionReport {
    if items.is_empty() {
        info!("No source files");
        return ExtractionReport::default();
    }

    info!("Unzipping: starting ({} worker(s))", workers);
    let tasks: Vec<ExtractTask> = items
        .iter()
        .map(|item| ExtractTask::new(source_dir, staging_dir, item))
        .collect();
    let total = tasks.len();

    let outcomes = map_tasks(tasks, workers, extract_bundle).await;
    let errors = log_failures(&outcomes);
    info!("Unzipping: done ({} bundle(s) processed, {} error(s))", total, errors);

    ExtractionReport {
        summary: ExtractSummary { total, errors },
        failed_bundles: outcomes
            .into_iter()
            .filter(|outcome| !outcome.success)
            .map(|outcome| outcome.filename)
            .collect(),
    }
}
