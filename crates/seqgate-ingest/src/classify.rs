//! Classification/routing stage
//!
//! Walks every extracted XML document under the staging area and routes it:
//!
//! - parse failure: moved to the reject directory (the only case where a
//!   malformed item is physically relocated);
//! - no top-level `APIData` marker: a different message class, deleted
//!   outright and reported as no-match;
//! - marker present: the embedded flight identifiers decide. A reserved
//!   `_GA` prefix or a known carrier-code prefix makes a match; matches are
//!   copied to the matched in-process area before the staged copy moves to
//!   the output directory, non-matches move to output directly.
//!
//! A second pass migrates the matched in-process area to its final
//! destination in one go, so a partially-processed batch never leaves
//! matched output half-migrated.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use walkdir::WalkDir;

use crate::pool::{log_failures, map_tasks, TaskOutcome, WorkReport};
use crate::reference::CarrierCodes;

/// Identifier prefix that always classifies a document as a match
const RESERVED_PREFIX: &str = "_GA";

/// Top-level element marking the message class this stage handles
const MARKER_ELEMENT: &[u8] = b"APIData";

/// Element holding a candidate identifier
const IDENTIFIER_ELEMENT: &[u8] = b"flightId";

/// Terminal classification outcome for one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Match,
    NoMatch,
    Reject,
}

/// Outcome of processing one extracted document
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub success: bool,
    pub category: Category,
    pub detail: String,
}

impl TaskOutcome for ClassificationResult {
    fn failed(detail: String) -> Self {
        Self {
            success: false,
            category: Category::Reject,
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

/// Routing targets shared by every classification unit
#[derive(Debug, Clone)]
pub struct RoutingDirs {
    pub output_dir: PathBuf,
    pub reject_dir: PathBuf,
    pub matched_inprocess_dir: PathBuf,
}

/// One unit of classification work
#[derive(Clone)]
pub struct ClassifyTask {
    pub document_path: PathBuf,
    pub dirs: RoutingDirs,
    pub codes: Arc<CarrierCodes>,
}

/// Tallies from one classification pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClassifySummary {
    pub total: usize,
    pub errors: usize,
    pub matched: usize,
    pub no_match: usize,
}

/// What the XML parser extracted from one document
#[derive(Debug, Default)]
struct ParsedDocument {
    has_marker: bool,
    identifiers: Vec<String>,
}

impl ParsedDocument {
    fn is_match(&self, codes: &CarrierCodes) -> bool {
        self.identifiers
            .iter()
            .any(|id| id.starts_with(RESERVED_PREFIX) || codes.matches(id))
    }
}

/// Parse a document, collecting the marker flag and identifier texts
fn parse_document(path: &Path) -> anyhow::Result<ParsedDocument> {
    let mut reader = Reader::from_file(path)?;
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut doc = ParsedDocument::default();
    let mut depth = 0usize;
    let mut in_identifier = false;
    let mut saw_root = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) => {
                depth += 1;
                saw_root = true;
                let local = start.local_name();
                if depth == 2 && local.as_ref() == MARKER_ELEMENT {
                    doc.has_marker = true;
                }
                in_identifier = local.as_ref() == IDENTIFIER_ELEMENT;
            },
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                in_identifier = false;
            },
            Event::Empty(empty) => {
                saw_root = true;
                if depth == 1 && empty.local_name().as_ref() == MARKER_ELEMENT {
                    doc.has_marker = true;
                }
            },
            Event::Text(text) if in_identifier => {
                let value = text.unescape()?.trim().to_string();
                if !value.is_empty() {
                    doc.identifiers.push(value);
                }
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }

    if !saw_root {
        anyhow::bail!("no root element");
    }
    Ok(doc)
}

/// Classify and route one staged document
pub fn classify_document(task: ClassifyTask) -> ClassificationResult {
    let name = task
        .document_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| task.document_path.display().to_string());

    let doc = match parse_document(&task.document_path) {
        Ok(doc) => doc,
        Err(err) => {
            let reject_target = task.dirs.reject_dir.join(&name);
            return match crate::fsops::move_replace(&task.document_path, &reject_target) {
                Ok(()) => ClassificationResult {
                    success: false,
                    category: Category::Reject,
                    detail: format!("{name}: {err}"),
                },
                Err(move_err) => ClassificationResult::failed(format!(
                    "{name}: {err} (reject move failed: {move_err})"
                )),
            };
        },
    };

    if !doc.has_marker {
        // A different message class; it has no further use here.
        return match std::fs::remove_file(&task.document_path) {
            Ok(()) => ClassificationResult {
                success: true,
                category: Category::NoMatch,
                detail: name,
            },
            Err(err) => ClassificationResult::failed(format!("{name}: {err}")),
        };
    }

    let matched = doc.is_match(&task.codes);
    if matched {
        if let Err(err) =
            std::fs::copy(&task.document_path, task.dirs.matched_inprocess_dir.join(&name))
        {
            return ClassificationResult::failed(format!("{name}: {err}"));
        }
    }

    match crate::fsops::move_replace(&task.document_path, &task.dirs.output_dir.join(&name)) {
        Ok(()) => ClassificationResult {
            success: true,
            category: if matched { Category::Match } else { Category::NoMatch },
            detail: name,
        },
        Err(err) => ClassificationResult::failed(format!("{name}: {err}")),
    }
}

/// All `.xml` documents under the staging area, walked recursively
fn staged_documents(staging_dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(staging_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("xml"))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// Run the classification pool over the staging area, then migrate the
/// matched in-process area to its final destination.
pub async fn run_classification(
    staging_dir: &Path,
    dirs: RoutingDirs,
    matched_dir: &Path,
    codes: CarrierCodes,
    workers: usize,
) -> anyhow::Result<ClassifySummary> {
    let documents = staged_documents(staging_dir);
    if documents.is_empty() {
        info!("No source files");
        return Ok(ClassifySummary::default());
    }

    info!("Parsing: starting ({} worker(s))", workers);
    let codes = Arc::new(codes);
    let tasks: Vec<ClassifyTask> = documents
        .into_iter()
        .map(|document_path| ClassifyTask {
            document_path,
            dirs: dirs.clone(),
            codes: codes.clone(),
        })
        .collect();
    let total = tasks.len();

    let outcomes = map_tasks(tasks, workers, classify_document).await;

    let mut summary = ClassifySummary {
        total,
        ..Default::default()
    };
    for outcome in &outcomes {
        if !outcome.success {
            summary.errors += 1;
        } else {
            match outcome.category {
                Category::Match => summary.matched += 1,
                Category::NoMatch => summary.no_match += 1,
                Category::Reject => {},
            }
        }
    }
    log_failures(&outcomes);
    info!(
        "Parsing: done ({} document(s), {} matched, {} no-match, {} error(s))",
        summary.total, summary.matched, summary.no_match, summary.errors
    );

    finalize_matched(&dirs.matched_inprocess_dir, matched_dir, workers).await?;
    Ok(summary)
}

/// Second pass: move everything from the matched in-process area to its
/// final destination, replacing existing targets.
async fn finalize_matched(
    matched_inprocess_dir: &Path,
    matched_dir: &Path,
    workers: usize,
) -> anyhow::Result<usize> {
    let mut pending = Vec::new();
    for entry in std::fs::read_dir(matched_inprocess_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            pending.push(entry.path());
        }
    }
    if pending.is_empty() {
        info!("No matched files to migrate");
        return Ok(0);
    }

    info!("Moving matched files");
    let matched_dir = matched_dir.to_path_buf();
    let total = pending.len();
    let outcomes = map_tasks(pending, workers, move |path: PathBuf| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        match crate::fsops::move_replace(&path, &matched_dir.join(&name)) {
            Ok(()) => WorkReport::ok(name),
            Err(err) => WorkReport::failed(format!("{name}: {err}")),
        }
    })
    .await;

    let errors = log_failures(&outcomes);
    info!("Done ({} matched file(s) processed, {} error(s))", total, errors);
    Ok(total - errors)
}
