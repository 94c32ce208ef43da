//! Handlers for the quote PDF endpoints and the owner-scoped job resource.

mod jobs;
mod quotes;

pub use jobs::*;
pub use quotes::*;

use uuid::Uuid;

use super::error::ApiError;

fn parse_id(raw: &str, what: &'static str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|err| ApiError::bad_request(what, Some(err.to_string())))
}
