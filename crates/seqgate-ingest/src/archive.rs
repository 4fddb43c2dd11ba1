//! Archival router
//!
//! Terminal disposal of processed source bundles: each stream type's bundles
//! move to its per-type archive directory, except RAW bundles which move to a
//! separate in-process holding area for potential replay. Afterwards the
//! stream-prefixed staging subdirectories left behind by extraction are
//! removed unconditionally. Every move is idempotent: a source that is
//! already gone is skipped, never an error.

use anyhow::{Context, Result};
use seqgate_common::{AdmittedItem, StreamType};
use std::path::{Path, PathBuf};
use tracing::info;

/// Router for terminal bundle disposal and staging cleanup
#[derive(Debug, Clone)]
pub struct ArchivalRouter {
    source_dir: PathBuf,
    archive_dir: PathBuf,
    raw_inprocess_dir: PathBuf,
    staging_dir: PathBuf,
}

/// Tallies from one archival pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub archived: usize,
    pub raw_held: usize,
}

impl ArchivalRouter {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        archive_dir: impl Into<PathBuf>,
        raw_inprocess_dir: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            archive_dir: archive_dir.into(),
            raw_inprocess_dir: raw_inprocess_dir.into(),
            staging_dir: staging_dir.into(),
        }
    }

    /// Move every admitted-and-processed bundle to its terminal directory
    pub fn archive_bundles(&self, items: &[AdmittedItem]) -> Result<ArchiveSummary> {
        let mut summary = ArchiveSummary::default();

        for stream in StreamType::ALL {
            let target = match stream {
                StreamType::Raw => self.raw_inprocess_dir.clone(),
                other => self.archive_dir.join(other.archive_subdir()),
            };
            std::fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;

            let mut moved = 0;
            for item in items.iter().filter(|item| item.stream == stream) {
                let from = self.source_dir.join(&item.filename);
                if !from.exists() {
                    // Already disposed of (re-run or partial earlier failure)
                    continue;
                }
                crate::fsops::move_replace(&from, &target.join(&item.filename))
                    .with_context(|| format!("Failed to archive {}", item.filename))?;
                moved += 1;
            }
            info!("{} {} file(s) moved", moved, stream);
            match stream {
                StreamType::Raw => summary.raw_held += moved,
                _ => summary.archived += moved,
            }
        }

        Ok(summary)
    }

    /// Copy admitted bundles into the mirror directory for an external feed.
    ///
    /// Copies land in `<mirror>/tmp` first and are renamed into place so the
    /// feed consumer never observes a partial file. Runs before archival
    /// moves the sources away.
    pub fn mirror_bundles(&self, items: &[AdmittedItem], mirror_dir: &Path) -> Result<usize> {
        let tmp_dir = mirror_dir.join("tmp");
        std::fs::create_dir_all(&tmp_dir)
            .with_context(|| format!("Failed to create {}", tmp_dir.display()))?;

        let mut copied = 0;
        for item in items {
            let from = self.source_dir.join(&item.filename);
            if !from.exists() {
                continue;
            }
            let staged = tmp_dir.join(&item.filename);
            std::fs::copy(&from, &staged)
                .with_context(|| format!("Failed to mirror {}", item.filename))?;
            crate::fsops::move_replace(&staged, &mirror_dir.join(&item.filename))
                .with_context(|| format!("Failed to publish mirrored {}", item.filename))?;
            copied += 1;
        }
        info!("{} file(s) copied to {}", copied, mirror_dir.display());
        Ok(copied)
    }

    /// Remove stream-prefixed staging subdirectories left by extraction.
    ///
    /// Unconditional: extraction and classification have already consumed
    /// their contents by the time this runs.
    pub fn clean_staging(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.staging_dir)
            .with_context(|| format!("Failed to list {}", self.staging_dir.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if StreamType::ALL.iter().any(|stream| name.starts_with(stream.prefix())) {
                info!("Removing {}", name);
                std::fs::remove_dir_all(entry.path())
                    .with_context(|| format!("Failed to remove staging dir {name}"))?;
                removed += 1;
            }
        }
        if removed == 0 {
            info!("Nothing to cleanup");
        }
        Ok(removed)
    }
}
