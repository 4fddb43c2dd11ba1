//! Run coordinator
//!
//! Drives one complete batch run: admission, sequence validation against
//! durable state, parallel extraction, reference refresh, parallel
//! classification, optional mirroring, and terminal archival. The coordinator
//! is the only writer of the sequence state file and the reference snapshot;
//! worker pools never touch either.

use anyhow::{Context, Result};
use std::time::Instant;
use tracing::{info, warn};

use crate::admission::AdmissionController;
use crate::archive::{ArchivalRouter, ArchiveSummary};
use crate::classify::{run_classification, ClassifySummary, RoutingDirs};
use crate::config::PipelineConfig;
use crate::extract::{run_extraction, ExtractSummary};
use seqgate_common::AdmittedItem;
use crate::reference::{HttpReferenceSource, ReferenceCache, ReferenceSource};
use crate::state::SequenceStateStore;
use crate::validate::{validate, AnomalyLog, ValidationSummary};

/// Outcome of one pipeline run
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RunReport {
    /// Bundles in the working set this run
    pub admitted: usize,
    pub validation: ValidationSummary,
    pub extraction: ExtractSummary,
    pub classification: ClassifySummary,
    pub archival: ArchiveSummary,
    /// Wall-clock run duration in seconds
    pub elapsed_secs: f64,
}

/// One-shot batch pipeline
pub struct Pipeline {
    config: PipelineConfig,
    reference_source: Option<Box<dyn ReferenceSource>>,
}

impl Pipeline {
    /// Build a pipeline with the production HTTP reference source, when one
    /// is configured
    pub fn new(config: PipelineConfig) -> Self {
        let reference_source: Option<Box<dyn ReferenceSource>> = config
            .reference_url
            .as_deref()
            .map(|url| Box::new(HttpReferenceSource::new(url)) as Box<dyn ReferenceSource>);
        Self {
            config,
            reference_source,
        }
    }

    /// Build a pipeline with an explicit reference source (test seam)
    pub fn with_source(config: PipelineConfig, source: Box<dyn ReferenceSource>) -> Self {
        Self {
            config,
            reference_source: Some(source),
        }
    }

    /// Execute one complete run.
    ///
    /// Returns `Ok` once archival completes even if individual bundles or
    /// documents failed along the way; only the fatal conditions (corrupt
    /// state file, unusable configuration) surface as errors.
    pub async fn run(&self) -> Result<RunReport> {
        let start = Instant::now();
        info!("*** Run start ***");

        self.config.validate()?;
        self.config.ensure_directories()?;

        let mut report = RunReport::default();

        info!("PREPARING BATCH");
        let controller = AdmissionController::new(
            &self.config.landing_dir,
            &self.config.source_dir,
            &self.config.output_dir,
            self.config.max_batch_size,
            self.config.max_output_batch_size,
        );
        report.admitted = controller.admit()?;
        if report.admitted == 0 {
            info!("No files to process");
            report.elapsed_secs = start.elapsed().as_secs_f64();
            info!("*** Run complete *** (Elapsed time: {:.6})", report.elapsed_secs);
            return Ok(report);
        }

        info!("READING SEQUENCE STATE");
        let store = SequenceStateStore::new(&self.config.state_file, &self.config.archive_dir);
        let mut states = store.load().context("Sequence state is unreadable")?;
        for (stream, state) in &states {
            info!(
                "{}: Expected: {}, Current: {}",
                stream,
                seqgate_common::types::format_sequence(state.expected_sequence(*stream)),
                state
                    .last_sequence
                    .map(seqgate_common::types::format_sequence)
                    .unwrap_or_else(|| "N/A".to_string()),
            );
        }

        let items = controller.working_set()?;

        info!("CHECKING SEQUENCES");
        let mut anomaly_log = AnomalyLog::open(&self.config.anomaly_log)?;
        report.validation = validate(&items, &mut states, &mut anomaly_log)?;
        // Persisted even when the pass produced anomalies
        store.save(&states).context("Failed to persist sequence state")?;

        info!("EXTRACTING BUNDLES");
        let extraction = run_extraction(
            &items,
            &self.config.source_dir,
            &self.config.staging_dir,
            self.config.workers,
        )
        .await;
        report.extraction = extraction.summary;

        // Bundles that failed to unpack stay in the source dir so the next
        // run re-admits them; everything else proceeds to archival.
        let processed: Vec<AdmittedItem> = items
            .iter()
            .filter(|item| !extraction.failed_bundles.contains(&item.filename))
            .cloned()
            .collect();

        info!("READING REFERENCE DATA");
        let cache = ReferenceCache::new(&self.config.reference_snapshot, self.config.refresh_hours);
        match &self.reference_source {
            Some(source) => cache.ensure_fresh(source.as_ref()).await?,
            None => warn!("No reference source configured; relying on existing snapshot"),
        }
        let codes = cache.load()?;

        info!("CLASSIFYING DOCUMENTS");
        let routing = RoutingDirs {
            output_dir: self.config.output_dir.clone(),
            reject_dir: self.config.reject_dir.clone(),
            matched_inprocess_dir: self.config.matched_inprocess_dir.clone(),
        };
        report.classification = run_classification(
            &self.config.staging_dir,
            routing,
            &self.config.matched_dir,
            codes,
            self.config.workers,
        )
        .await?;

        let router = ArchivalRouter::new(
            &self.config.source_dir,
            &self.config.archive_dir,
            &self.config.raw_inprocess_dir,
            &self.config.staging_dir,
        );

        if let Some(mirror_dir) = &self.config.mirror_dir {
            info!("COPYING FILES FOR MIRROR FEED");
            router.mirror_bundles(&items, mirror_dir)?;
        }

        info!("ARCHIVING");
        report.archival = router.archive_bundles(&processed)?;

        info!("CLEANING UP");
        router.clean_staging()?;

        report.elapsed_secs = start.elapsed().as_secs_f64();
        info!("*** Run complete *** (Elapsed time: {:.6})", report.elapsed_secs);
        Ok(report)
    }
}
