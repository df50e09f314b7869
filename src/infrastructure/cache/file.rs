//! Filesystem cache implementation
//!
//! Each entry is one JSON file named after the SHA-256 of its key. Every write
//! stages into its own temporary file and is renamed into place, so readers
//! never see partial data.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::DomainError;
use crate::domain::cache::{Cache, glob_to_regex};

const ENTRY_EXTENSION: &str = "json";

/// On-disk entry format
#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    key: String,
    data: String,
    /// Millis since epoch
    expires_at: Option<u64>,
}

impl FileEntry {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Cache persisted as files in one directory
#[derive(Debug, Clone)]
pub struct FileCache {
    directory: PathBuf,
}

impl FileCache {
    /// Opens (creating if needed) a cache rooted at `directory`
    pub async fn new(directory: impl Into<PathBuf>) -> Result<Self, DomainError> {
        let directory = directory.into();

        tokio::fs::create_dir_all(&directory).await.map_err(|e| {
            DomainError::cache(format!(
                "Failed to create cache directory '{}': {}",
                directory.display(),
                e
            ))
        })?;

        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let name = hex::encode(Sha256::digest(key.as_bytes()));
        self.directory.join(format!("{}.{}", name, ENTRY_EXTENSION))
    }

    fn current_time_millis() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Absolute expiry for `ttl`, saturating at the far future
    fn expires_at(ttl: Duration) -> u64 {
        let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        Self::current_time_millis().saturating_add(ttl_millis)
    }

    async fn read_entry(path: &Path) -> Result<Option<FileEntry>, DomainError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DomainError::cache(format!(
                    "Failed to read cache entry '{}': {}",
                    path.display(),
                    e
                )));
            }
        };

        let entry = serde_json::from_str(&content).map_err(|e| {
            DomainError::cache(format!(
                "Failed to parse cache entry '{}': {}",
                path.display(),
                e
            ))
        })?;

        Ok(Some(entry))
    }

    async fn remove_file(path: &Path) -> Result<bool, DomainError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DomainError::cache(format!(
                "Failed to remove cache entry '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    /// Reads the entry for `key`, removing it when expired
    async fn live_entry(&self, key: &str) -> Result<Option<FileEntry>, DomainError> {
        let path = self.entry_path(key);

        match Self::read_entry(&path).await? {
            Some(entry) if entry.key != key => Ok(None),
            Some(entry) if entry.is_expired(Self::current_time_millis()) => {
                Self::remove_file(&path).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Paths of every entry file in the directory
    async fn entry_paths(&self) -> Result<Vec<PathBuf>, DomainError> {
        let mut dir = tokio::fs::read_dir(&self.directory).await.map_err(|e| {
            DomainError::cache(format!(
                "Failed to list cache directory '{}': {}",
                self.directory.display(),
                e
            ))
        })?;

        let mut paths = Vec::new();

        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| DomainError::cache(format!("Failed to list cache directory: {}", e)))?
        {
            let path = item.path();

            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                paths.push(path);
            }
        }

        Ok(paths)
    }
}

#[async_trait]
impl Cache for FileCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError> {
        Ok(self.live_entry(key).await?.map(|entry| entry.data))
    }

    async fn set_raw(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), DomainError> {
        let entry = FileEntry {
            key: key.to_string(),
            data: value.to_string(),
            expires_at: ttl.map(Self::expires_at),
        };

        let content = serde_json::to_string(&entry).map_err(|e| {
            DomainError::serialization(format!("Failed to serialize cache entry: {}", e))
        })?;

        let path = self.entry_path(key);
        let directory = self.directory.clone();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut staging = tempfile::NamedTempFile::new_in(&directory)?;
            staging.write_all(content.as_bytes())?;
            staging.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| DomainError::cache(format!("Cache write task failed: {}", e)))?
        .map_err(|e| {
            DomainError::cache(format!("Failed to write cache entry for '{}': {}", key, e))
        })
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        let existed = self.live_entry(key).await?.is_some();
        Self::remove_file(&self.entry_path(key)).await?;
        Ok(existed)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize, DomainError> {
        let regex = glob_to_regex(pattern)?;
        let mut deleted = 0;

        for path in self.entry_paths().await? {
            match Self::read_entry(&path).await {
                Ok(Some(entry)) => {
                    if regex.is_match(&entry.key) && Self::remove_file(&path).await? {
                        deleted += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Skipping unreadable cache entry"
                    );
                }
            }
        }

        Ok(deleted)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, DomainError> {
        let now = Self::current_time_millis();

        Ok(self
            .live_entry(key)
            .await?
            .and_then(|entry| entry.expires_at)
            .map(|at| Duration::from_millis(at.saturating_sub(now))))
    }

    async fn clear(&self) -> Result<(), DomainError> {
        for path in self.entry_paths().await? {
            Self::remove_file(&path).await?;
        }
        Ok(())
    }

    async fn size(&self) -> Result<usize, DomainError> {
        Ok(self.entry_paths().await?.len())
    }
}
