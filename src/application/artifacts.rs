//! Publication of rendered documents to object storage.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("object store request failed: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StorageError>;

    /// Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError>;
}

/// Form of the reference recorded on a completed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactRefStyle {
    StorageKey,
    PublicUrl,
}

#[derive(Clone)]
pub struct ArtifactPublisher {
    store: Arc<dyn ObjectStore>,
    public_base_url: String,
    style: ArtifactRefStyle,
}

impl ArtifactPublisher {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        public_base_url: impl Into<String>,
        style: ArtifactRefStyle,
    ) -> Self {
        Self {
            store,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            style,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Stable per quote, so a regenerated document replaces the previous one.
    pub fn storage_key(quote_id: Uuid) -> String {
        format!("quotes/{quote_id}.pdf")
    }

    pub async fn publish(&self, quote_id: Uuid, bytes: Bytes) -> Result<String, StorageError> {
        let key = Self::storage_key(quote_id);

        if let Err(err) = self.store.delete(&key).await {
            warn!(
                target: "quotepdf::artifacts",
                key = %key,
                error = %err,
                "failed to remove previous artifact"
            );
        }

        self.store.put(&key, bytes, PDF_CONTENT_TYPE).await?;

        Ok(match self.style {
            ArtifactRefStyle::StorageKey => key,
            ArtifactRefStyle::PublicUrl => self.url_for_key(&key),
        })
    }

    /// Resolve a stored reference to a fetchable URL; absolute URLs pass through.
    pub fn public_url(&self, artifact_ref: &str) -> String {
        if artifact_ref.starts_with("http://") || artifact_ref.starts_with("https://") {
            artifact_ref.to_string()
        } else {
            self.url_for_key(artifact_ref)
        }
    }

    fn url_for_key(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key.trim_start_matches('/'))
    }
}
