use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::debug;

use super::{CacheEntry, ReportCache};
use crate::backend::AuditSettings;
use crate::error::CacheError;

const MAX_KEY_LEN: usize = 128;

/// Filesystem cache storing one JSON document per report.
///
/// Layout: `<root>/<report id>.json`
#[derive(Debug, Clone)]
pub struct FileReportCache {
    root: PathBuf,
}

impl FileReportCache {
    /// Create the cache rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, CacheError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Open the cache at the configured `cache_dir`; `None` when caching is
    /// not configured.
    pub async fn from_settings(settings: &AuditSettings) -> Result<Option<Self>, CacheError> {
        match &settings.cache_dir {
            Some(dir) => Self::open(dir).await.map(Some),
            None => Ok(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, id: &str) -> Result<PathBuf, CacheError> {
        validate_key(id)?;
        Ok(self.root.join(format!("{id}.json")))
    }
}

/// Report ids become file names, so only a conservative character set passes.
fn validate_key(id: &str) -> Result<(), CacheError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_KEY_LEN
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(id.to_string()))
    }
}

#[async_trait]
impl ReportCache for FileReportCache {
    async fn get(&self, id: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(id)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn put(&self, id: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        let path = self.entry_path(id)?;
        let bytes = serde_json::to_vec_pretty(entry)?;

        let len = bytes.len();
        let dir = self.root.clone();
        let target = path.clone();

        // One temp file per writer; the target only ever holds a complete document.
        tokio::task::spawn_blocking(move || -> Result<(), CacheError> {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target).map_err(|err| err.error)?;
            Ok(())
        })
        .await
        .map_err(|err| CacheError::Io(std::io::Error::new(ErrorKind::Other, err)))??;
        debug!(path = %path.display(), bytes = len, "cache entry written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::AuditText;
    use crate::inspect::{InspectionData, ServerInfo};

    async fn make_cache() -> (tempfile::TempDir, FileReportCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileReportCache::open(dir.path().join("reports")).await.unwrap();
        (dir, cache)
    }

    fn entry(audit: AuditText) -> CacheEntry {
        CacheEntry {
            inspect: InspectionData {
                server_info: Some(ServerInfo {
                    server_spec: Some("npx fs-server".into()),
                    ..ServerInfo::default()
                }),
                transport_type: "stdio".into(),
                ..InspectionData::default()
            },
            audit,
        }
    }

    #[tokio::test]
    async fn entry_roundtrip_and_overwrite() {
        let (_dir, cache) = make_cache().await;
        let first = entry(AuditText::Text("first".into()));
        cache.put("report-1", &first).await.unwrap();
        assert_eq!(cache.get("report-1").await.unwrap(), Some(first));

        let second = entry(AuditText::Chunks(vec!["a".into(), "b".into()]));
        cache.put("report-1", &second).await.unwrap();
        assert_eq!(cache.get("report-1").await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn opens_configured_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = AuditSettings::new("http://localhost:8000");
        assert!(FileReportCache::from_settings(&settings).await.unwrap().is_none());

        settings.cache_dir = Some(dir.path().join("nested").join("reports"));
        let cache = FileReportCache::from_settings(&settings)
            .await
            .unwrap()
            .expect("cache dir configured");
        assert_eq!(cache.root(), dir.path().join("nested").join("reports"));
        assert!(cache.root().is_dir());
    }

    #[tokio::test]
    async fn missing_entry_is_none() {
        let (_dir, cache) = make_cache().await;
        assert!(cache.get("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_path_like_keys() {
        let (_dir, cache) = make_cache().await;
        for key in ["", "../escape", ".hidden", "a/b", "white space"] {
            assert!(matches!(
                cache.get(key).await,
                Err(CacheError::InvalidKey(_))
            ));
        }
    }

    #[tokio::test]
    async fn corrupt_entry_is_serde_error() {
        let (_dir, cache) = make_cache().await;
        fs::write(cache.root().join("broken.json"), b"{not json")
            .await
            .unwrap();
        assert!(matches!(cache.get("broken").await, Err(CacheError::Serde(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_puts_for_one_id_all_succeed() {
        let (_dir, cache) = make_cache().await;
        let cache = std::sync::Arc::new(cache);
        for round in 0..50 {
            let writers: Vec<_> = (0..8)
                .map(|writer| {
                    let cache = std::sync::Arc::clone(&cache);
                    tokio::spawn(async move {
                        let audit = AuditText::Text(format!("round {round} writer {writer}"));
                        cache.put("same-id", &entry(audit)).await
                    })
                })
                .collect();
            for result in futures::future::join_all(writers).await {
                result.unwrap().unwrap();
            }
            let stored = cache.get("same-id").await.unwrap().unwrap();
            assert!(stored.audit.joined().starts_with(&format!("round {round} ")));
        }

        let mut names = Vec::new();
        let mut dir = fs::read_dir(cache.root()).await.unwrap();
        while let Some(item) = dir.next_entry().await.unwrap() {
            names.push(item.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["same-id.json".to_string()]);
    }
}
