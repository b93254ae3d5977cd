//! DirDocumentStore - one file per blob in a directory.
//!
//! Lets separate processes contend for the same document the way CI jobs
//! contend for a pull-request comment. Like the remote service it stands in
//! for, it offers no compare-and-swap: `overwrite` is last-writer-wins.
//!
//! Layout: `<dir>/<id>.html`, ids are sequential integers starting at 1.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::ports::{Blob, BlobId, DocumentStore, StoreError};

const EXTENSION: &str = "html";

#[derive(Debug, Clone)]
pub struct DirDocumentStore {
    dir: PathBuf,
}

impl DirDocumentStore {
    /// Opens (creating if needed) the store directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, id: BlobId) -> PathBuf {
        self.dir.join(format!("{id}.{EXTENSION}"))
    }

    async fn ids(&self) -> Result<Vec<BlobId>, StoreError> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                ids.push(BlobId::new(id));
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn read_body(&self, id: BlobId) -> Result<String, StoreError> {
        match tokio::fs::read_to_string(self.path(id)).await {
            Ok(body) => Ok(body),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DocumentStore for DirDocumentStore {
    async fn list(&self) -> Result<Vec<Blob>, StoreError> {
        let mut blobs = Vec::new();
        for id in self.ids().await? {
            match self.read_body(id).await {
                Ok(body) => blobs.push(Blob::new(id, body)),
                // Removed between read_dir and read.
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(blobs)
    }

    async fn create(&self, body: &str) -> Result<Blob, StoreError> {
        let mut next = self.ids().await?.last().map_or(1, |id| id.get() + 1);
        loop {
            let id = BlobId::new(next);
            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.path(id))
                .await;
            match opened {
                Ok(mut file) => {
                    file.write_all(body.as_bytes()).await?;
                    file.flush().await?;
                    debug!(blob = %id, dir = %self.dir.display(), "created blob file");
                    return Ok(Blob::new(id, body));
                }
                // Another process took this id first.
                Err(e) if e.kind() == ErrorKind::AlreadyExists => next += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn read(&self, id: BlobId) -> Result<Blob, StoreError> {
        Ok(Blob::new(id, self.read_body(id).await?))
    }

    async fn overwrite(&self, id: BlobId, body: &str) -> Result<Blob, StoreError> {
        let path = self.path(id);
        if !tokio::fs::try_exists(&path).await? {
            return Err(StoreError::NotFound(id));
        }
        // Write then rename so readers never see a half-written body.
        let tmp = self.dir.join(format!(".{id}.{}.tmp", ulid::Ulid::new()));
        tokio::fs::write(&tmp, body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(Blob::new(id, body))
    }
}
