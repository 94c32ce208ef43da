pub mod api;
mod middleware;
mod public;

pub use api::{ApiState, SessionCookie, build_api_router};
pub use middleware::RequestContext;
pub use public::{HttpState, build_public_router};

use crate::application::error::ErrorReport;
use crate::application::repos::RepoError;
use axum::Router;
use axum::extract::FromRef;
use axum::middleware as axum_middleware;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sqlx::Error as SqlxError;

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// Status and stable code for a repository failure surfaced by the API.
pub fn repo_error_status(err: &RepoError) -> (StatusCode, &'static str) {
    use api::error::codes;

    match err {
        RepoError::Duplicate { .. } => (StatusCode::CONFLICT, codes::DUPLICATE),
        RepoError::NotFound => (StatusCode::NOT_FOUND, codes::NOT_FOUND),
        RepoError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, codes::INVALID_INPUT),
        RepoError::Integrity { .. } => (StatusCode::CONFLICT, codes::INTEGRITY),
        RepoError::Timeout => (StatusCode::SERVICE_UNAVAILABLE, codes::DB_TIMEOUT),
        RepoError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, codes::REPO),
    }
}

#[derive(Clone)]
pub struct RouterState {
    pub http: HttpState,
    pub api: ApiState,
}

impl FromRef<RouterState> for HttpState {
    fn from_ref(state: &RouterState) -> Self {
        state.http.clone()
    }
}

impl FromRef<RouterState> for ApiState {
    fn from_ref(state: &RouterState) -> Self {
        state.api.clone()
    }
}

/// Full application router: public routes merged with the job API.
pub fn build_router(state: RouterState) -> Router {
    build_public_router(state.clone())
        .merge(build_api_router(state.clone()))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}
