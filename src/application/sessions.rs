use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::application::repos::{CreateSessionParams, RepoError, SessionsRepo};
use crate::domain::entities::SessionRecord;

const TOKEN_PREFIX: &str = "sess";
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("missing session")]
    Missing,
    #[error("invalid session")]
    Invalid,
    #[error("expired session")]
    Expired,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Authenticated caller resolved from a session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub session_id: Uuid,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct SessionLookup {
    pub principal: Principal,
    /// New expiry when the session was slid forward; the cookie must be rewritten.
    pub refreshed_until: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub record: SessionRecord,
    pub token: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub ttl: Duration,
    pub refresh_threshold: Duration,
}

#[derive(Clone)]
pub struct SessionService {
    repo: Arc<dyn SessionsRepo>,
    policy: SessionPolicy,
}

impl SessionService {
    pub fn new(repo: Arc<dyn SessionsRepo>, policy: SessionPolicy) -> Self {
        Self { repo, policy }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    pub async fn issue(&self, user: &str) -> Result<IssuedSession, SessionError> {
        let secret = Self::generate_secret();
        let record = self
            .repo
            .create_session(CreateSessionParams {
                principal: user.to_string(),
                hashed_secret: Self::hash_secret(&secret),
                expires_at: OffsetDateTime::now_utc() + self.policy.ttl,
            })
            .await?;
        let token = format!("{TOKEN_PREFIX}_{}_{secret}", record.id.simple());

        Ok(IssuedSession { record, token })
    }

    /// Resolve a cookie token, sliding the expiry forward when it is close.
    pub async fn read(&self, token: &str) -> Result<SessionLookup, SessionError> {
        let parsed = Self::parse_token(token).ok_or(SessionError::Invalid)?;
        let record = self
            .repo
            .find_session(parsed.id)
            .await?
            .ok_or(SessionError::Invalid)?;

        let hashed_input = Self::hash_secret(&parsed.secret);
        if record.hashed_secret.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Err(SessionError::Invalid);
        }

        let now = OffsetDateTime::now_utc();
        if record.expires_at <= now {
            return Err(SessionError::Expired);
        }

        let refreshed_until = if record.expires_at - now < self.policy.refresh_threshold {
            let expires_at = now + self.policy.ttl;
            self.repo.extend_session(record.id, expires_at).await?;
            Some(expires_at)
        } else {
            None
        };

        Ok(SessionLookup {
            principal: Principal {
                session_id: record.id,
                user: record.principal,
            },
            refreshed_until,
        })
    }

    pub async fn purge_expired(&self) -> Result<u64, SessionError> {
        Ok(self.repo.delete_expired(OffsetDateTime::now_utc()).await?)
    }

    fn hash_secret(secret: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.finalize().to_vec()
    }

    fn generate_secret() -> String {
        format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
    }

    fn parse_token(token: &str) -> Option<ParsedToken> {
        let mut parts = token.splitn(3, '_');
        if parts.next()? != TOKEN_PREFIX {
            return None;
        }
        let id = Uuid::parse_str(parts.next()?).ok()?;
        let secret = parts.next()?;
        if secret.len() < MIN_SECRET_LEN {
            return None;
        }
        Some(ParsedToken {
            id,
            secret: secret.to_string(),
        })
    }
}

struct ParsedToken {
    id: Uuid,
    secret: String,
}
