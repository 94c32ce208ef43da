use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use tracing::error;

use crate::{
    application::{
        artifacts::{ObjectStore, PDF_CONTENT_TYPE, StorageError},
        error::HttpError,
    },
    infra::db::PostgresRepositories,
};

use super::{RouterState, db_health_response};

#[derive(Clone)]
pub struct HttpState {
    pub db: Arc<PostgresRepositories>,
    pub artifacts: Arc<dyn ObjectStore>,
}

pub fn build_public_router(state: RouterState) -> Router<RouterState> {
    Router::new()
        .route("/health", get(health))
        .route("/artifacts/{*key}", get(serve_artifact))
        .with_state(state)
}

async fn health(State(state): State<HttpState>) -> Response {
    db_health_response(state.db.health_check().await)
}

async fn serve_artifact(State(state): State<HttpState>, Path(key): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_artifact";

    match state.artifacts.get(&key).await {
        Ok(Some(bytes)) => artifact_response(bytes),
        Ok(None) | Err(StorageError::InvalidKey(_)) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Document not found",
            format!("no artifact stored at `{key}`"),
        )
        .into_response(),
        Err(err) => {
            error!(
                target: "quotepdf::http::public",
                key = %key,
                error = %err,
                "failed to read stored artifact"
            );
            HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read document",
                &err,
            )
            .into_response()
        }
    }
}

fn artifact_response(bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = bytes.into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(PDF_CONTENT_TYPE));
    // Regeneration overwrites the same key, so clients must revalidate.
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    response
}
