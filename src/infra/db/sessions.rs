use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{CreateSessionParams, RepoError, SessionsRepo},
    domain::entities::SessionRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    principal: String,
    hashed_secret: Vec<u8>,
    expires_at: OffsetDateTime,
    created_at: OffsetDateTime,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            principal: row.principal,
            hashed_secret: row.hashed_secret,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl SessionsRepo for PostgresRepositories {
    async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<SessionRecord, RepoError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            INSERT INTO sessions (id, principal, hashed_secret, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, principal, hashed_secret, expires_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(params.principal)
        .bind(params.hashed_secret)
        .bind(params.expires_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<SessionRecord>, RepoError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, principal, hashed_secret, expires_at, created_at
              FROM sessions
             WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(SessionRecord::from))
    }

    async fn extend_session(
        &self,
        id: Uuid,
        expires_at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE sessions SET expires_at = $2 WHERE id = $1")
            .bind(id)
            .bind(expires_at)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
