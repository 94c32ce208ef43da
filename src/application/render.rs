//! Contract of the external document rendering service.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::application::payload::RenderPayload;

/// What the render service hands back for one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedDocument {
    /// Raw document bytes that still need to be published.
    Bytes(Bytes),
    /// The service stored the document itself and returned its location.
    Hosted(String),
}

#[derive(Debug, Error)]
pub enum RenderServiceError {
    #[error("render service responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("render service request failed: {0}")]
    Transport(String),
    #[error("render service returned an empty document")]
    EmptyDocument,
    #[error("render service response could not be read: {0}")]
    InvalidResponse(String),
}

/// Single attempt against the render service; retries are the caller's call.
#[async_trait]
pub trait RenderClient: Send + Sync {
    async fn render(&self, payload: &RenderPayload) -> Result<RenderedDocument, RenderServiceError>;
}
