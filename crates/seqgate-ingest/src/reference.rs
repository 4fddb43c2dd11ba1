//! Carrier-code reference data cache
//!
//! Classification needs two small sets of carrier codes: 2-letter codes in
//! the IATA namespace and 3-letter codes in the ICAO namespace. They live in
//! an on-disk CSV snapshot of `(namespace, code)` rows that is refreshed from
//! an external source on a time-to-live basis. The external source being
//! unreachable is a soft failure: the run continues on the last-good
//! snapshot, or with empty sets if no snapshot has ever existed.

use async_trait::async_trait;
use seqgate_common::{Result, SeqgateError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Carrier-code namespace, distinguishing the 2- and 3-letter code spaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// 2-letter carrier codes
    Iata,
    /// 3-letter carrier codes
    Icao,
}

impl Namespace {
    pub fn label(&self) -> &'static str {
        match self {
            Namespace::Iata => "IATA",
            Namespace::Icao => "ICAO",
        }
    }

    pub fn from_label(label: &str) -> Option<Namespace> {
        match label {
            "IATA" => Some(Namespace::Iata),
            "ICAO" => Some(Namespace::Icao),
            _ => None,
        }
    }

    /// Code length carried by this namespace
    pub fn prefix_len(&self) -> usize {
        match self {
            Namespace::Iata => 2,
            Namespace::Icao => 3,
        }
    }
}

/// The two carrier-code sets loaded from the snapshot
#[derive(Debug, Default, Clone)]
pub struct CarrierCodes {
    iata: HashSet<String>,
    icao: HashSet<String>,
}

impl CarrierCodes {
    pub fn insert(&mut self, namespace: Namespace, code: impl Into<String>) {
        match namespace {
            Namespace::Iata => self.iata.insert(code.into()),
            Namespace::Icao => self.icao.insert(code.into()),
        };
    }

    pub fn is_empty(&self) -> bool {
        self.iata.is_empty() && self.icao.is_empty()
    }

    pub fn len(&self) -> usize {
        self.iata.len() + self.icao.len()
    }

    /// Whether an identifier's leading carrier-code prefix is a known code.
    ///
    /// Length-disambiguated: the character immediately after the candidate
    /// prefix must be an ASCII digit, so a 3-letter code is never misread
    /// from a 2-letter code plus the first digit of its numeric suffix.
    pub fn matches(&self, identifier: &str) -> bool {
        self.prefix_match(identifier, Namespace::Iata)
            || self.prefix_match(identifier, Namespace::Icao)
    }

    fn prefix_match(&self, identifier: &str, namespace: Namespace) -> bool {
        let len = namespace.prefix_len();
        let bytes = identifier.as_bytes();
        if bytes.len() <= len || !bytes[len].is_ascii_digit() {
            return false;
        }
        let set = match namespace {
            Namespace::Iata => &self.iata,
            Namespace::Icao => &self.icao,
        };
        identifier
            .get(..len)
            .map(|prefix| set.contains(prefix))
            .unwrap_or(false)
    }
}

/// A read-only source of `(namespace, code)` reference rows
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<(Namespace, String)>>;
}

/// Production reference source: fetches delimited rows over HTTP
pub struct HttpReferenceSource {
    url: String,
    client: reqwest::Client,
}

impl HttpReferenceSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ReferenceSource for HttpReferenceSource {
    async fn fetch(&self) -> Result<Vec<(Namespace, String)>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| SeqgateError::Reference(err.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|err| SeqgateError::Reference(err.to_string()))?;

        let mut rows = Vec::new();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(body.as_bytes());
        for record in reader.records() {
            let record = record.map_err(|err| SeqgateError::Reference(err.to_string()))?;
            let (Some(label), Some(code)) = (record.get(0), record.get(1)) else {
                continue;
            };
            // Rows in unknown namespaces are skipped, matching the snapshot
            // loader below.
            if let Some(namespace) = Namespace::from_label(label.trim()) {
                rows.push((namespace, code.trim().to_string()));
            }
        }
        Ok(rows)
    }
}

/// TTL-gated on-disk snapshot of the carrier-code reference data
#[derive(Debug, Clone)]
pub struct ReferenceCache {
    snapshot_path: PathBuf,
    ttl: Duration,
}

impl ReferenceCache {
    pub fn new(snapshot_path: impl Into<PathBuf>, refresh_hours: u64) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            ttl: Duration::from_secs(refresh_hours * 60 * 60),
        }
    }

    /// Whether the snapshot needs refreshing: missing, empty, or past TTL
    pub fn is_stale(&self) -> bool {
        let Ok(metadata) = std::fs::metadata(&self.snapshot_path) else {
            return true;
        };
        if metadata.len() == 0 {
            return true;
        }
        match metadata.modified() {
            Ok(modified) => match SystemTime::now().duration_since(modified) {
                Ok(age) => age > self.ttl,
                // Snapshot from the future (clock step); treat as fresh
                Err(_) => false,
            },
            Err(_) => true,
        }
    }

    /// Refresh the snapshot from `source` if it is stale.
    ///
    /// Source failure is soft: a warning is logged and the last-good snapshot
    /// (or nothing) remains in place. The rewrite is write-then-atomic-replace
    /// so readers never observe a partial snapshot.
    pub async fn ensure_fresh(&self, source: &dyn ReferenceSource) -> Result<()> {
        if !self.is_stale() {
            info!("Reference snapshot is fresh: {}", self.snapshot_path.display());
            return Ok(());
        }
        info!("Reference snapshot is stale or missing, refreshing");

        let rows = match source.fetch().await {
            Ok(rows) => rows,
            Err(err) => {
                warn!("Reference source unreachable, continuing on last-good snapshot: {}", err);
                return Ok(());
            },
        };

        if let Some(parent) = self.snapshot_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = self.snapshot_path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&temp_path)
                .map_err(|err| SeqgateError::Reference(err.to_string()))?;
            for (namespace, code) in &rows {
                writer
                    .write_record([namespace.label(), code])
                    .map_err(|err| SeqgateError::Reference(err.to_string()))?;
            }
            writer
                .flush()
                .map_err(|err| SeqgateError::Reference(err.to_string()))?;
        }
        std::fs::rename(&temp_path, &self.snapshot_path)?;
        info!("Reference snapshot refreshed: {} row(s)", rows.len());
        Ok(())
    }

    /// Load the carrier-code sets from the snapshot.
    ///
    /// A snapshot that never existed yields empty sets (every document then
    /// fails the carrier-code rules); a snapshot with malformed rows is an
    /// error, since it points at a broken refresh rather than a cold start.
    pub fn load(&self) -> Result<CarrierCodes> {
        let mut codes = CarrierCodes::default();
        if !self.snapshot_path.exists() {
            warn!(
                "No reference snapshot at {}; classifying with empty carrier-code sets",
                self.snapshot_path.display()
            );
            return Ok(codes);
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.snapshot_path)
            .map_err(|err| SeqgateError::Reference(err.to_string()))?;
        for record in reader.records() {
            let record = record.map_err(|err| SeqgateError::Reference(err.to_string()))?;
            let (label, code) = match (record.get(0), record.get(1)) {
                (Some(label), Some(code)) => (label.trim(), code.trim()),
                _ => {
                    return Err(SeqgateError::Reference(format!(
                        "malformed snapshot row in {}",
                        self.snapshot_path.display()
                    )))
                },
            };
            if let Some(namespace) = Namespace::from_label(label) {
                codes.insert(namespace, code);
            }
        }
        debug!("Loaded {} carrier code(s)", codes.len());
        Ok(codes)
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn codes(iata: &[&str], icao: &[&str]) -> CarrierCodes {
        let mut codes = CarrierCodes::default();
        for code in iata {
            codes.insert(Namespace::Iata, *code);
        }
        for code in icao {
            codes.insert(Namespace::Icao, *code);
        }
        codes
    }

    #[test]
    fn test_prefix_match_two_letter() {
        let codes = codes(&["AB"], &[]);
        assert!(codes.matches("AB1234"));
        assert!(!codes.matches("AB"));
        assert!(!codes.matches("ABX234"));
        assert!(!codes.matches("XY1234"));
    }

    #[test]
    fn test_prefix_match_three_letter_disambiguation() {
        let codes = codes(&[], &["ABC"]);
        assert!(codes.matches("ABC123"));
        // No digit after the 3-letter prefix
        assert!(!codes.matches("ABCX12"));
        // Too short for a suffix
        assert!(!codes.matches("ABC"));
    }

    #[test]
    fn test_unknown_short_identifier_is_no_match() {
        let codes = codes(&["AB"], &["ABC"]);
        assert!(!codes.matches("XY9"));
    }

    #[test]
    fn test_load_missing_snapshot_yields_empty_sets() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ReferenceCache::new(dir.path().join("carrier_codes.csv"), 8);
        let codes = cache.load().unwrap();
        assert!(codes.is_empty());
    }

    #[test]
    fn test_load_snapshot_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carrier_codes.csv");
        std::fs::write(&path, "IATA,AB\nICAO,ABC\nOTHER,ZZ\n").unwrap();

        let cache = ReferenceCache::new(&path, 8);
        let codes = cache.load().unwrap();
        assert_eq!(codes.len(), 2);
        assert!(codes.matches("AB1"));
        assert!(codes.matches("ABC1"));
        assert!(!codes.matches("ZZ1"));
    }

    #[test]
    fn test_staleness() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carrier_codes.csv");
        let cache = ReferenceCache::new(&path, 8);

        // Missing
        assert!(cache.is_stale());
        // Zero-byte
        std::fs::write(&path, b"").unwrap();
        assert!(cache.is_stale());
        // Freshly written
        std::fs::write(&path, "IATA,AB\n").unwrap();
        assert!(!cache.is_stale());
    }

    #[tokio::test]
    async fn test_ensure_fresh_rewrites_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/carriers"))
            .respond_with(ResponseTemplate::new(200).set_body_string("IATA,AB\nICAO,ABC\n"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = ReferenceCache::new(dir.path().join("carrier_codes.csv"), 8);
        let source = HttpReferenceSource::new(format!("{}/carriers", server.uri()));

        cache.ensure_fresh(&source).await.unwrap();
        let codes = cache.load().unwrap();
        assert!(codes.matches("AB1234"));
        assert!(codes.matches("ABC123"));
    }

    #[tokio::test]
    async fn test_unreachable_source_keeps_last_good_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carrier_codes.csv");
        std::fs::write(&path, "IATA,AB\n").unwrap();

        // Force a refresh attempt against a dead endpoint
        let cache = ReferenceCache::new(&path, 0);
        assert!(cache.is_stale());
        let source = HttpReferenceSource::new("http://127.0.0.1:9/carriers");

        cache.ensure_fresh(&source).await.unwrap();
        let codes = cache.load().unwrap();
        assert!(codes.matches("AB1"));
    }
}
