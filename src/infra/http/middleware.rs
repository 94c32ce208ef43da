use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, debug, error, info_span, warn};
use uuid::Uuid;

use crate::application::{error::ErrorReport, sessions::Principal};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
const MAX_REQUEST_ID_LEN: usize = 128;

#[derive(Clone, Debug)]
pub struct RequestContext {
    pub request_id: String,
}

impl RequestContext {
    /// Reuse a caller supplied id when it is short and printable.
    fn from_request(request: &Request<Body>) -> Self {
        let request_id = request
            .headers()
            .get(&REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
            .filter(|id| id.chars().all(|c| c.is_ascii_graphic()))
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self { request_id }
    }
}

/// Assign a request id, run the request inside a span carrying it, and echo it back.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext::from_request(&request);
    request.extensions_mut().insert(ctx.clone());

    let span = info_span!(
        target: "quotepdf::http",
        "request",
        request_id = %ctx.request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

struct Outcome {
    method: Method,
    path: String,
    status: StatusCode,
    elapsed_ms: u128,
    user: String,
}

/// One log line per request; failures include the `ErrorReport` chain.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started_at = Instant::now();

    let mut response = next.run(request).await;
    let outcome = Outcome {
        method,
        path,
        status: response.status(),
        elapsed_ms: started_at.elapsed().as_millis(),
        // Copied onto the response by the session layer.
        user: response
            .extensions()
            .get::<Principal>()
            .map(|principal| principal.user.clone())
            .unwrap_or_default(),
    };
    let report = response.extensions_mut().remove::<ErrorReport>();

    if outcome.status.is_client_error() || outcome.status.is_server_error() {
        log_failure(&outcome, report);
    } else {
        debug!(
            target: "quotepdf::http::response",
            status = outcome.status.as_u16(),
            method = %outcome.method,
            path = %outcome.path,
            elapsed_ms = outcome.elapsed_ms,
            user = %outcome.user,
            "request served",
        );
    }

    response
}

fn log_failure(outcome: &Outcome, report: Option<ErrorReport>) {
    let (source, chain) = report
        .map(|report| (report.source, report.messages))
        .unwrap_or(("unknown", Vec::new()));
    let detail = chain.first().map(String::as_str).unwrap_or("no diagnostic available");

    if outcome.status.is_server_error() {
        error!(
            target: "quotepdf::http::response",
            status = outcome.status.as_u16(),
            method = %outcome.method,
            path = %outcome.path,
            elapsed_ms = outcome.elapsed_ms,
            user = %outcome.user,
            source,
            detail,
            chain = ?chain,
            "request failed",
        );
    } else {
        warn!(
            target: "quotepdf::http::response",
            status = outcome.status.as_u16(),
            method = %outcome.method,
            path = %outcome.path,
            elapsed_ms = outcome.elapsed_ms,
            user = %outcome.user,
            source,
            detail,
            "request rejected",
        );
    }
}
