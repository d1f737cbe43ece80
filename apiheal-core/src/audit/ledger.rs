//! Ledger implementations: in-memory and JSON-lines file

use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{AuditError, AuditFilter, AuditRecord, AuditSink, Result};

/// Ledger state shared behind one lock: records plus seen identities
#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<AuditRecord>,
    seen: HashSet<String>,
}

/// In-memory ledger, primarily for tests and single-process runs
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditSink for MemoryLedger {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.seen.insert(record.proposal_id.clone()) {
            return Err(AuditError::Duplicate(record.proposal_id.clone()));
        }
        debug!("audit: {} {}", record.decision, record.proposal_id);
        state.records.push(record.clone());
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>> {
        let state = self.state.lock().await;
        Ok(state.records.iter().filter(|r| filter.matches(r)).cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.lock().await.records.len())
    }
}

/// Append-only ledger persisted as one JSON object per line
///
/// Existing records are scanned on open so duplicate detection survives
/// process restarts.
pub struct JsonlLedger {
    path: PathBuf,
    seen: Mutex<HashSet<String>>,
}

impl JsonlLedger {
    /// Open (or create) a ledger file, seeding duplicate detection from
    /// any records already present.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut seen = HashSet::new();
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                for line in content.lines().filter(|l| !l.trim().is_empty()) {
                    let record: AuditRecord = serde_json::from_str(line)?;
                    seen.insert(record.proposal_id);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!("opened audit ledger at {} ({} existing records)", path.display(), seen.len());
        Ok(Self { path, seen: Mutex::new(seen) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lazy, restartable read of the ledger. Each call re-reads from the
    /// start of the file; records failing to parse are skipped.
    pub fn iter(
        &self,
        filter: AuditFilter,
    ) -> Result<Box<dyn Iterator<Item = AuditRecord> + Send>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Box::new(std::iter::empty()));
            }
            Err(e) => return Err(e.into()),
        };

        let iter = BufReader::new(file)
            .lines()
            .filter_map(|line| line.ok())
            .filter_map(|line| serde_json::from_str::<AuditRecord>(&line).ok())
            .filter(move |record| filter.matches(record));
        Ok(Box::new(iter))
    }
}

#[async_trait]
impl AuditSink for JsonlLedger {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        let mut seen = self.seen.lock().await;
        if seen.contains(&record.proposal_id) {
            warn!("duplicate audit record rejected: {}", record.proposal_id);
            return Err(AuditError::Duplicate(record.proposal_id.clone()));
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        seen.insert(record.proposal_id.clone());
        debug!("audit: {} {}", record.decision, record.proposal_id);
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let record: AuditRecord = serde_json::from_str(line)?;
            if filter.matches(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.seen.lock().await.len())
    }
}
