use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::inspect::InspectionData;

pub mod file;

pub use file::FileReportCache;

/// Raw audit transcript as stored in the cache. Older entries hold a list of
/// streamed chunks instead of one string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuditText {
    Text(String),
    Chunks(Vec<String>),
}

impl AuditText {
    pub fn joined(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Chunks(chunks) => chunks.join("\n"),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Chunks(chunks) => chunks.iter().all(String::is_empty),
        }
    }
}

impl From<String> for AuditText {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Everything needed to rebuild a report without re-running the audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub inspect: InspectionData,
    pub audit: AuditText,
}

/// Key-value store of completed audits, keyed by report id.
///
/// `put` overwrites any existing entry for the id; a missing entry is
/// `Ok(None)`, never an error.
#[async_trait]
pub trait ReportCache: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<CacheEntry>, CacheError>;

    async fn put(&self, id: &str, entry: &CacheEntry) -> Result<(), CacheError>;
}

/// In-memory cache backed by a `HashMap<id, entry>`.
#[derive(Debug, Default)]
pub struct MemoryReportCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryReportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ReportCache for MemoryReportCache {
    async fn get(&self, id: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.lock().get(id).cloned())
    }

    async fn put(&self, id: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        self.lock().insert(id.to_string(), entry.clone());
        Ok(())
    }
}
