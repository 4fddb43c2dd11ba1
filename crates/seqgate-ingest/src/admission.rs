//! Batch admission controller
//!
//! Decides how many inbound bundles enter the working set this run. Two caps
//! apply: if the downstream output backlog exceeds its threshold nothing is
//! admitted at all (backpressure), otherwise each stream type independently
//! tops up the source holding area from the landing zone, in lexicographic
//! filename order, until its per-stream batch cap is reached.

use anyhow::{Context, Result};
use seqgate_common::{AdmittedItem, StreamType};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Admission controller for one run
#[derive(Debug, Clone)]
pub struct AdmissionController {
    landing_dir: PathBuf,
    source_dir: PathBuf,
    output_dir: PathBuf,
    max_batch_size: usize,
    max_output_batch_size: usize,
}

impl AdmissionController {
    pub fn new(
        landing_dir: impl Into<PathBuf>,
        source_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        max_batch_size: usize,
        max_output_batch_size: usize,
    ) -> Self {
        Self {
            landing_dir: landing_dir.into(),
            source_dir: source_dir.into(),
            output_dir: output_dir.into(),
            max_batch_size,
            max_output_batch_size,
        }
    }

    /// Admit eligible bundles into the source holding area.
    ///
    /// Returns the total number of stream-matching files now in the source
    /// dir; zero short-circuits the rest of the run.
    pub fn admit(&self) -> Result<usize> {
        let output_backlog = count_entries(&self.output_dir)?;
        if output_backlog > self.max_output_batch_size {
            warn!(
                "Output batch size exceeded: {} file(s) in {}",
                output_backlog,
                self.output_dir.display()
            );
            return Ok(0);
        }
        info!(
            "Output batch size ok: {} file(s) in {}",
            output_backlog,
            self.output_dir.display()
        );

        for stream in StreamType::ALL {
            let mut eligible =
                list_matching(&self.landing_dir, |name| stream.pattern().is_match(name))?;
            // Lowest filenames first so a cap never skips over older bundles
            eligible.sort();
            let current = list_matching(&self.source_dir, |name| stream.pattern().is_match(name))?
                .len();

            if current >= self.max_batch_size {
                warn!("{} {} bundle(s) present - no files added", self.max_batch_size, stream);
                continue;
            }
            if eligible.is_empty() {
                info!("No {} files", stream);
                continue;
            }

            let mut moved = 0;
            for filename in eligible {
                crate::fsops::move_file(
                    &self.landing_dir.join(&filename),
                    &self.source_dir.join(&filename),
                )
                .with_context(|| format!("Failed to admit {filename}"))?;
                info!("Moved {}", filename);
                moved += 1;
                if moved + current >= self.max_batch_size {
                    info!("Batch limit reached: {} {} files", self.max_batch_size, stream);
                    break;
                }
            }
        }

        Ok(list_matching(&self.source_dir, StreamType::matches_any)?.len())
    }

    /// The admitted working set, sorted ascending by filename
    pub fn working_set(&self) -> Result<Vec<AdmittedItem>> {
        let mut filenames = list_matching(&self.source_dir, StreamType::matches_any)?;
        filenames.sort();
        filenames
            .into_iter()
            .map(|name| AdmittedItem::parse(&name).map_err(Into::into))
            .collect()
    }
}

/// Filenames in `dir` matching `keep`, unsorted
fn list_matching(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if keep(name) {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Number of directory entries (the downstream backlog measure)
fn count_entries(dir: &Path) -> Result<usize> {
    Ok(std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .count())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        controller: AdmissionController,
        landing: PathBuf,
        source: PathBuf,
        output: PathBuf,
    }

    fn fixture(max_batch_size: usize, max_output_batch_size: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let landing = dir.path().join("landing");
        let source = dir.path().join("batch");
        let output = dir.path().join("out");
        for d in [&landing, &source, &output] {
            std::fs::create_dir_all(d).unwrap();
        }
        let controller = AdmissionController::new(
            &landing,
            &source,
            &output,
            max_batch_size,
            max_output_batch_size,
        );
        Fixture {
            _dir: dir,
            controller,
            landing,
            source,
            output,
        }
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn test_admission_cap_takes_lowest_filenames() {
        let fx = fixture(5, 100);
        for seq in 1..=8 {
            touch(&fx.landing, &format!("PARSED_20240101_1000_{seq:04}.zip"));
        }

        let admitted = fx.controller.admit().unwrap();
        assert_eq!(admitted, 5);

        let set = fx.controller.working_set().unwrap();
        let sequences: Vec<u32> = set.iter().map(|item| item.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5]);

        // The remaining three stay behind for the next run
        assert_eq!(std::fs::read_dir(&fx.landing).unwrap().count(), 3);
    }

    #[test]
    fn test_admission_counts_existing_source_files() {
        let fx = fixture(5, 100);
        touch(&fx.source, "PARSED_20240101_0900_0001.zip");
        touch(&fx.source, "PARSED_20240101_0910_0002.zip");
        for seq in 3..=9 {
            touch(&fx.landing, &format!("PARSED_20240101_1000_{seq:04}.zip"));
        }

        let admitted = fx.controller.admit().unwrap();
        assert_eq!(admitted, 5);
    }

    #[test]
    fn test_backpressure_admits_nothing() {
        let fx = fixture(5, 2);
        for n in 0..3 {
            touch(&fx.output, &format!("backlog_{n}.xml"));
        }
        touch(&fx.landing, "PARSED_20240101_1000_0001.zip");

        assert_eq!(fx.controller.admit().unwrap(), 0);
        assert!(fx.landing.join("PARSED_20240101_1000_0001.zip").exists());
    }

    #[test]
    fn test_streams_admit_independently() {
        let fx = fixture(2, 100);
        for seq in 1..=3 {
            touch(&fx.landing, &format!("PARSED_20240101_1000_{seq:04}.zip"));
            touch(&fx.landing, &format!("RAW_20240101_1000_{seq:04}.zip"));
        }

        let admitted = fx.controller.admit().unwrap();
        assert_eq!(admitted, 4);
    }

    #[test]
    fn test_non_matching_files_ignored() {
        let fx = fixture(5, 100);
        touch(&fx.landing, "README.txt");
        touch(&fx.landing, "PARSED_20240101_1000_0001.zip");

        assert_eq!(fx.controller.admit().unwrap(), 1);
        assert!(fx.landing.join("README.txt").exists());
    }
}
