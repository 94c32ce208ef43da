pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use state::{ApiState, SessionCookie};

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::infra::http::RouterState;

pub fn build_api_router(state: RouterState) -> Router<RouterState> {
    let session_state = state.clone();

    let owner_routes = Router::new()
        .route(
            "/pdf-jobs",
            get(handlers::list_jobs).post(handlers::create_job),
        )
        .route(
            "/pdf-jobs/{id}",
            get(handlers::get_job).patch(handlers::patch_job),
        )
        .route_layer(axum_middleware::from_fn(middleware::require_session));

    Router::new()
        .route(
            "/quotes/{quote_id}/pdf",
            post(handlers::submit_pdf).get(handlers::pdf_status),
        )
        .merge(owner_routes)
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(
            session_state,
            middleware::resolve_session,
        ))
}
