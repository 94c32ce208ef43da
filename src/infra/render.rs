//! HTTP adapter for the external render service.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Url, header};
use serde::Deserialize;
use tracing::debug;

use crate::{
    application::{
        payload::RenderPayload,
        render::{RenderClient, RenderServiceError, RenderedDocument},
    },
    infra::error::InfraError,
};

const API_KEY_HEADER: &str = "x-api-key";
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Deserialize)]
struct HostedDocument {
    url: String,
}

#[derive(Clone, Debug)]
pub struct HttpRenderClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpRenderClient {
    pub fn new(
        endpoint: Url,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("quotepdf/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(InfraError::client("render service"))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn dispatch(
        content_type: Option<&str>,
        body: Bytes,
    ) -> Result<RenderedDocument, RenderServiceError> {
        if body.is_empty() {
            return Err(RenderServiceError::EmptyDocument);
        }

        let is_json = content_type
            .map(|value| value.to_ascii_lowercase().starts_with("application/json"))
            .unwrap_or(false);
        if !is_json {
            return Ok(RenderedDocument::Bytes(body));
        }

        let hosted: HostedDocument = serde_json::from_slice(&body)
            .map_err(|err| RenderServiceError::InvalidResponse(err.to_string()))?;
        if hosted.url.trim().is_empty() {
            return Err(RenderServiceError::InvalidResponse(
                "render service returned an empty url".into(),
            ));
        }
        Ok(RenderedDocument::Hosted(hosted.url))
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

#[async_trait]
impl RenderClient for HttpRenderClient {
    async fn render(&self, payload: &RenderPayload) -> Result<RenderedDocument, RenderServiceError> {
        let mut request = self.client.post(self.endpoint.clone()).json(payload);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| RenderServiceError::Transport(err.to_string()))?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|err| RenderServiceError::Transport(err.to_string()))?;

        if !status.is_success() {
            return Err(RenderServiceError::Status {
                status: status.as_u16(),
                body: truncate(&String::from_utf8_lossy(&body)),
            });
        }

        debug!(
            target: "quotepdf::infra::render",
            template = %payload.template,
            status = status.as_u16(),
            bytes = body.len(),
            "render service responded"
        );
        Self::dispatch(content_type.as_deref(), body)
    }
}
