//! Storage for the original uploaded bytes.
//!
//! Each upload is written once under a fresh locator of the form
//! `<uuid-simple><.ext>`; locators are opaque to everything else.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{PcError, PcResult};

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `bytes` under a new unique locator and return it.
    async fn store(&self, bytes: &[u8], ext_hint: Option<&str>) -> PcResult<String>;

    /// Read a stored blob. `Ok(None)` when the locator is unknown.
    async fn load(&self, locator: &str) -> PcResult<Option<Vec<u8>>>;

    /// Delete a stored blob. Unknown locators are not an error.
    async fn remove(&self, locator: &str) -> PcResult<()>;
}

/// Blobs as plain files in one directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, locator: &str) -> PcResult<PathBuf> {
        // Locators are generated here; anything with a path component is foreign.
        if locator.is_empty()
            || locator.contains('/')
            || locator.contains('\\')
            || locator.starts_with('.')
        {
            return Err(PcError::Validation(format!(
                "invalid storage locator: {}",
                locator
            )));
        }
        Ok(self.root.join(locator))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn store(&self, bytes: &[u8], ext_hint: Option<&str>) -> PcResult<String> {
        tokio::fs::create_dir_all(&self.root).await?;

        let ext = ext_hint
            .map(|e| e.trim_start_matches('.'))
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        let locator = format!("{}{}", uuid::Uuid::new_v4().simple(), ext);

        tokio::fs::write(self.root.join(&locator), bytes).await?;
        tracing::debug!(locator = %locator, bytes = bytes.len(), "stored blob");
        Ok(locator)
    }

    async fn load(&self, locator: &str) -> PcResult<Option<Vec<u8>>> {
        let path = self.path_for(locator)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, locator: &str) -> PcResult<()> {
        let path = self.path_for(locator)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
