//! Object store capability and its local-disk implementation.
//!
//! The engines only ever see the narrow `ObjectStore` trait: list,
//! download, upload (with overwrite flag), remove, rename, and public-URL
//! resolution. `LocalStore` keeps payloads beneath
//! `base_path/{tier}/{slug}/{file}` with durable write-to-temp-then-rename
//! uploads.

use crate::services::naming::content_type_for;
use crate::services::{PipelineError, PipelineResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Listing entry for one stored object.
#[derive(Clone, Debug)]
pub struct ObjectInfo {
    /// Object path relative to the store root, e.g.
    /// `public/aman-tokyo/aman-tokyo_12345_01_1600w.webp`.
    pub path: String,
    pub size: u64,
    pub content_type: Option<String>,
}

/// Narrow blob-store contract the engines depend on.
///
/// `rename` may return `PipelineError::RenameUnsupported`; callers then go
/// through [`move_object`], which falls back to download → upload(overwrite)
/// → remove and surfaces partial failure mid-fallback rather than swallowing
/// it.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object whose path starts with `prefix`.
    async fn list(&self, prefix: &str) -> PipelineResult<Vec<ObjectInfo>>;

    /// Fetch an object's bytes, or `None` when it does not exist.
    async fn download(&self, path: &str) -> PipelineResult<Option<Bytes>>;

    /// Store bytes at `path`. With `overwrite = false` an occupied path is
    /// an error.
    async fn upload(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: Option<&str>,
        overwrite: bool,
    ) -> PipelineResult<()>;

    /// Delete the given objects. Missing objects are not an error.
    async fn remove(&self, paths: &[String]) -> PipelineResult<()>;

    /// Native move/rename. Implementations without one return
    /// `RenameUnsupported`.
    async fn rename(&self, from: &str, to: &str) -> PipelineResult<()>;

    /// Resolve the publicly servable URL for an object path.
    fn public_url(&self, path: &str) -> String;
}

/// Move an object, preferring the store's native rename and falling back to
/// download → upload(overwrite=true) → remove when rename is unsupported.
///
/// The three-step fallback is the unit of retry: a failure after the copy
/// has landed is surfaced to the caller, never swallowed.
pub async fn move_object(store: &dyn ObjectStore, from: &str, to: &str) -> PipelineResult<()> {
    match store.rename(from, to).await {
        Ok(()) => return Ok(()),
        Err(PipelineError::RenameUnsupported) => {}
        Err(err) => return Err(err),
    }

    let bytes = store
        .download(from)
        .await?
        .ok_or_else(|| PipelineError::ObjectNotFound(from.to_string()))?;
    store
        .upload(to, bytes, Some(content_type_for(to)), true)
        .await?;
    store.remove(&[from.to_string()]).await?;
    Ok(())
}

/// Local filesystem store rooted at `base_path`, serving public-tier files
/// under `public_base_url`.
#[derive(Clone, Debug)]
pub struct LocalStore {
    base_path: PathBuf,
    public_base_url: String,
}

impl LocalStore {
    pub fn new(base_path: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Resolve a relative object path beneath the store root, rejecting
    /// trivial traversal vectors the same way keys are validated upstream.
    fn resolve(&self, path: &str) -> PipelineResult<PathBuf> {
        if path.is_empty() || path.starts_with('/') || path.contains("..") {
            return Err(PipelineError::Validation(format!(
                "invalid object path `{}`",
                path
            )));
        }
        Ok(self.base_path.join(path))
    }

    fn relative_of(&self, absolute: &Path) -> Option<String> {
        absolute
            .strip_prefix(&self.base_path)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn list(&self, prefix: &str) -> PipelineResult<Vec<ObjectInfo>> {
        let root = self.resolve(prefix.trim_end_matches('/'))?;
        let mut pending = vec![root];
        let mut found = Vec::new();

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(PipelineError::Io(err)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    pending.push(entry.path());
                } else if let Some(path) = self.relative_of(&entry.path()) {
                    let content_type = Some(content_type_for(&path).to_string());
                    found.push(ObjectInfo {
                        path,
                        size: meta.len(),
                        content_type,
                    });
                }
            }
        }

        found.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(found)
    }

    async fn download(&self, path: &str) -> PipelineResult<Option<Bytes>> {
        let file_path = self.resolve(path)?;
        match fs::read(&file_path).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PipelineError::Io(err)),
        }
    }

    async fn upload(
        &self,
        path: &str,
        bytes: Bytes,
        _content_type: Option<&str>,
        overwrite: bool,
    ) -> PipelineResult<()> {
        let file_path = self.resolve(path)?;
        if !overwrite && fs::try_exists(&file_path).await? {
            return Err(PipelineError::Validation(format!(
                "object `{}` already exists",
                path
            )));
        }

        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                PipelineError::Io(io::Error::new(
                    ErrorKind::InvalidInput,
                    "object path missing parent directory",
                ))
            })?;
        fs::create_dir_all(&parent).await?;

        // Write to a temp file and rename into place so a crashed upload
        // never leaves a half-written object at the final path.
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;
        if let Err(err) = file.write_all(&bytes).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(PipelineError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(PipelineError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(PipelineError::Io(err));
        }
        Ok(())
    }

    async fn remove(&self, paths: &[String]) -> PipelineResult<()> {
        for path in paths {
            let file_path = self.resolve(path)?;
            match fs::remove_file(&file_path).await {
                Ok(()) => debug!("removed object {}", path),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!("object {} already missing", path);
                }
                Err(err) => return Err(PipelineError::Io(err)),
            }
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> PipelineResult<()> {
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;
        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        match fs::rename(&from_path, &to_path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(PipelineError::ObjectNotFound(from.to_string()))
            }
            Err(err) => Err(PipelineError::Io(err)),
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url, path)
    }
}
