use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::application::sessions::{Principal, SessionError};
use crate::infra::http::repo_error_status;

use super::error::{ApiError, codes};
use super::state::ApiState;

/// Resolve the session cookie, if any, into a `Principal` request extension.
///
/// Unusable cookies leave the request anonymous; routes that need a caller
/// reject it later. A slid session gets its cookie rewritten.
pub async fn resolve_session(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let mut principal = None;
    let mut refreshed_token = None;

    if let Some(token) = session_token(request.headers(), &state.cookie.name) {
        match state.sessions.read(&token).await {
            Ok(lookup) => {
                if lookup.refreshed_until.is_some() {
                    refreshed_token = Some(token);
                }
                principal = Some(lookup.principal);
            }
            Err(SessionError::Repo(err)) => {
                let (status, _) = repo_error_status(&err);
                return ApiError::new(
                    status,
                    codes::SESSION,
                    "Session lookup failed",
                    Some(err.to_string()),
                )
                .into_response();
            }
            Err(err) => {
                debug!(
                    target: "quotepdf::http::session",
                    error = %err,
                    "ignoring unusable session cookie"
                );
            }
        }
    }

    if let Some(principal) = &principal {
        request.extensions_mut().insert(principal.clone());
    }

    let mut response = next.run(request).await;
    if let Some(principal) = principal {
        response.extensions_mut().insert(principal);
    }
    if let Some(token) = refreshed_token
        && let Ok(value) = HeaderValue::from_str(&state.cookie.header_value(&token))
    {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

pub async fn require_session(request: Request<Body>, next: Next) -> Response {
    if request.extensions().get::<Principal>().is_none() {
        return ApiError::unauthorized().into_response();
    }
    next.run(request).await
}

/// Caller resolved by `resolve_session`, absent for anonymous requests.
pub struct MaybePrincipal(pub Option<Principal>);

impl<S> FromRequestParts<S> for MaybePrincipal
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<Principal>().cloned()))
    }
}

fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
