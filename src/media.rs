use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::error::{AppError, AppResult};

const ALLOWED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "heic", "mp4", "mov", "webm", "m4v",
];

/// Storage for uploaded media. Stored paths are opaque to clients; they only
/// ever see the result of [`AssetStore::url`].
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Persist `bytes` for `owner`, returning the stored path.
    async fn put(&self, owner: i64, filename: &str, bytes: &[u8]) -> AppResult<String>;

    /// Delete a stored asset. Missing files are not an error.
    async fn remove(&self, stored: &str) -> AppResult<()>;

    /// Contents of a stored asset, or `None` if there is no such asset.
    async fn read(&self, stored: &str) -> AppResult<Option<Vec<u8>>>;

    /// Absolute, directly fetchable URL for a stored path.
    fn url(&self, stored: &str) -> String;

    /// Resolve an optional stored reference; blank references resolve to `None`.
    fn resolve(&self, stored: Option<&str>) -> Option<String> {
        stored.filter(|s| !s.is_empty()).map(|s| self.url(s))
    }
}

/// Stores files under `<root>/finca_<uid>/` and serves them from `/media/`.
pub struct LocalAssetStore {
    root: PathBuf,
    public_url: String,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Map a stored path back to disk, rejecting anything that escapes the root.
    pub fn locate(&self, stored: &str) -> Option<PathBuf> {
        let relative = Path::new(stored);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if stored.is_empty() || !safe {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn put(&self, owner: i64, filename: &str, bytes: &[u8]) -> AppResult<String> {
        let dir = format!("finca_{owner}");
        let name = match safe_extension(filename) {
            Some(ext) => format!("{}.{}", uuid::Uuid::now_v7(), ext),
            None => uuid::Uuid::now_v7().to_string(),
        };

        let target_dir = self.root.join(&dir);
        tokio::fs::create_dir_all(&target_dir).await?;
        tokio::fs::write(target_dir.join(&name), bytes).await?;

        tracing::debug!(owner, size = bytes.len(), "Stored upload {}/{}", dir, name);
        Ok(format!("{dir}/{name}"))
    }

    async fn remove(&self, stored: &str) -> AppResult<()> {
        let path = self
            .locate(stored)
            .ok_or_else(|| AppError::BadRequest("Invalid asset path".into()))?;
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, stored: &str) -> AppResult<Option<Vec<u8>>> {
        let Some(path) = self.locate(stored) else {
            return Ok(None);
        };
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn url(&self, stored: &str) -> String {
        format!("{}/media/{}", self.public_url, stored)
    }
}

/// Lowercased extension of an uploaded filename, if it is one we accept.
fn safe_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}
