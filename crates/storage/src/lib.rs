//! Storage layer: credential persistence.
//!
//! Holds the `TokenStore` seam plus a JSON file backend and an in-memory
//! backend used by tests and one-shot runs.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed token data in {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize token: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Load/save pair for a persisted credential of type `T`.
#[async_trait::async_trait]
pub trait TokenStore<T>: Send + Sync {
    async fn load_token(&self) -> Result<Option<T>, StorageError>;
    async fn save_token(&self, token: &T) -> Result<(), StorageError>;
    /// Removes the persisted credential. Missing data is not an error.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// Token persisted as pretty JSON at a fixed path.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_err(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait::async_trait]
impl<T> TokenStore<T> for TokenFile
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    async fn load_token(&self) -> Result<Option<T>, StorageError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        let token = serde_json::from_slice(&raw).map_err(|source| StorageError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "loaded token");
        Ok(Some(token))
    }

    async fn save_token(&self, token: &T) -> Result<(), StorageError> {
        let body = serde_json::to_vec_pretty(token)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_err(e))?;
            }
        }
        // Write next to the target, then rename, so a crash never leaves half a token.
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| self.io_err(e))?;
        restrict_permissions(&tmp).await.map_err(|e| self.io_err(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        debug!(path = %self.path.display(), "saved token");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Keeps the token in memory only.
#[derive(Debug, Default)]
pub struct MemoryTokenStore<T> {
    slot: Mutex<Option<T>>,
}

impl<T> MemoryTokenStore<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub fn with_token(token: T) -> Self {
        Self {
            slot: Mutex::new(Some(token)),
        }
    }
}

impl<T: Clone> MemoryTokenStore<T> {
    pub fn snapshot(&self) -> Option<T> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl<T> TokenStore<T> for MemoryTokenStore<T>
where
    T: Clone + Send + Sync,
{
    async fn load_token(&self) -> Result<Option<T>, StorageError> {
        Ok(self.snapshot())
    }

    async fn save_token(&self, token: &T) -> Result<(), StorageError> {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = Some(token.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = None;
        Ok(())
    }
}
