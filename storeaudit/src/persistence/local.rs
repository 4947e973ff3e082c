//! Filesystem object store, for development.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use url::Url;

use super::{ObjectStore, StorageError};

/// Writes objects under a directory that is served from `public_base_url`.
pub struct LocalObjectStore {
    base_path: PathBuf,
    public_base_url: Url,
}

impl LocalObjectStore {
    pub fn new(base_path: PathBuf, public_base_url: Url) -> Self {
        Self {
            base_path,
            public_base_url,
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, bytes: Bytes, _content_type: &str) -> Result<(), StorageError> {
        let full_path = self.base_path.join(key);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&full_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;

        tracing::debug!(path = %full_path.display(), size = bytes.len(), "Stored archive photo");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url.as_str().trim_end_matches('/'), key)
    }
}
