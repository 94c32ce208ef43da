//! Shared domain enumerations and the job state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use quotepdf_api_types::PdfJobStatus;

use super::error::DomainError;

/// Execution strategy of the job orchestrator, chosen per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdfJobVariant {
    /// Anonymous submissions processed on the worker pool; callers poll.
    DetachedAnonymous,
    /// Owner-scoped submissions processed within the submitting request.
    InlineOwnerScoped,
}

impl PdfJobVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            PdfJobVariant::DetachedAnonymous => "detached_anonymous",
            PdfJobVariant::InlineOwnerScoped => "inline_owner_scoped",
        }
    }

    pub fn requires_owner(self) -> bool {
        matches!(self, PdfJobVariant::InlineOwnerScoped)
    }
}

impl FromStr for PdfJobVariant {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "detached_anonymous" | "detached" => Ok(PdfJobVariant::DetachedAnonymous),
            "inline_owner_scoped" | "inline" => Ok(PdfJobVariant::InlineOwnerScoped),
            other => Err(DomainError::validation(format!(
                "unknown job variant `{other}`"
            ))),
        }
    }
}

/// Only `pending` may move, and only to a terminal state.
///
/// Re-asserting the current state is accepted so that manual updates that
/// only touch the artifact reference remain possible on pending jobs.
pub fn validate_transition(from: PdfJobStatus, to: PdfJobStatus) -> Result<(), DomainError> {
    match (from, to) {
        (PdfJobStatus::Pending, _) => Ok(()),
        (current, next) => Err(DomainError::transition(current.as_str(), next.as_str())),
    }
}
