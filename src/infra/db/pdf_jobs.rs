use std::convert::TryFrom;

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{NewPdfJob, PdfJobsRepo, RepoError, UpdatePdfJobParams},
    domain::{entities::PdfJobRecord, types::PdfJobStatus},
};

use super::{PostgresRepositories, map_sqlx_error};

const JOB_COLUMNS: &str = "id, quote_id, status, s3_key, created_by, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PdfJobRow {
    id: Uuid,
    quote_id: Uuid,
    status: String,
    s3_key: Option<String>,
    created_by: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<PdfJobRow> for PdfJobRecord {
    type Error = RepoError;

    fn try_from(row: PdfJobRow) -> Result<Self, Self::Error> {
        let status = PdfJobStatus::try_from(row.status.as_str())
            .map_err(RepoError::from_persistence)?;

        Ok(Self {
            id: row.id,
            quote_id: row.quote_id,
            status,
            artifact_ref: row.s3_key,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_record(row: Option<PdfJobRow>) -> Result<Option<PdfJobRecord>, RepoError> {
    row.map(PdfJobRecord::try_from).transpose()
}

fn push_owner_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, owner: Option<&'q str>) {
    if let Some(owner) = owner {
        qb.push(" AND created_by = ");
        qb.push_bind(owner);
    }
}

#[async_trait]
impl PdfJobsRepo for PostgresRepositories {
    async fn create_job(&self, job: NewPdfJob) -> Result<PdfJobRecord, RepoError> {
        let row = sqlx::query_as::<_, PdfJobRow>(&format!(
            "INSERT INTO pdf_jobs (id, quote_id, status, s3_key, created_by) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(job.quote_id)
        .bind(job.status.as_str())
        .bind(job.artifact_ref)
        .bind(job.created_by)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        PdfJobRecord::try_from(row)
    }

    async fn find_job(
        &self,
        id: Uuid,
        owner: Option<&str>,
    ) -> Result<Option<PdfJobRecord>, RepoError> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {JOB_COLUMNS} FROM pdf_jobs WHERE id = "));
        qb.push_bind(id);
        push_owner_filter(&mut qb, owner);

        let row = qb
            .build_query_as::<PdfJobRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        into_record(row)
    }

    async fn find_latest_for_quote(
        &self,
        quote_id: Uuid,
        job_id: Option<Uuid>,
        owner: Option<&str>,
    ) -> Result<Option<PdfJobRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {JOB_COLUMNS} FROM pdf_jobs WHERE quote_id = "
        ));
        qb.push_bind(quote_id);
        if let Some(job_id) = job_id {
            qb.push(" AND id = ");
            qb.push_bind(job_id);
        }
        push_owner_filter(&mut qb, owner);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT 1");

        let row = qb
            .build_query_as::<PdfJobRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        into_record(row)
    }

    async fn update_job(
        &self,
        params: UpdatePdfJobParams,
    ) -> Result<Option<PdfJobRecord>, RepoError> {
        let UpdatePdfJobParams {
            id,
            owner,
            expected_status,
            status,
            artifact_ref,
        } = params;

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE pdf_jobs SET updated_at = now()");
        if let Some(status) = status {
            qb.push(", status = ");
            qb.push_bind(status.as_str());
        }
        if let Some(artifact_ref) = artifact_ref {
            qb.push(", s3_key = ");
            qb.push_bind(artifact_ref);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(" AND status = ");
        qb.push_bind(expected_status.as_str());
        if let Some(owner) = owner {
            qb.push(" AND created_by = ");
            qb.push_bind(owner);
        }
        qb.push(" RETURNING ");
        qb.push(JOB_COLUMNS);

        let row = qb
            .build_query_as::<PdfJobRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        into_record(row)
    }

    async fn complete_pending(
        &self,
        id: Uuid,
        artifact_ref: &str,
    ) -> Result<Option<PdfJobRecord>, RepoError> {
        let row = sqlx::query_as::<_, PdfJobRow>(&format!(
            "UPDATE pdf_jobs \
                SET status = 'completed', s3_key = $2, updated_at = now() \
              WHERE id = $1 AND status = 'pending' \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(id)
        .bind(artifact_ref)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        into_record(row)
    }

    async fn fail_pending(&self, id: Uuid) -> Result<Option<PdfJobRecord>, RepoError> {
        let row = sqlx::query_as::<_, PdfJobRow>(&format!(
            "UPDATE pdf_jobs \
                SET status = 'failed', s3_key = NULL, updated_at = now() \
              WHERE id = $1 AND status = 'pending' \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        into_record(row)
    }

    async fn fail_stale_pending(
        &self,
        created_before: OffsetDateTime,
    ) -> Result<Vec<PdfJobRecord>, RepoError> {
        let rows = sqlx::query_as::<_, PdfJobRow>(&format!(
            "UPDATE pdf_jobs \
                SET status = 'failed', s3_key = NULL, updated_at = now() \
              WHERE status = 'pending' AND created_at < $1 \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(created_before)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(PdfJobRecord::try_from).collect()
    }

    async fn list_for_owner(&self, owner: &str) -> Result<Vec<PdfJobRecord>, RepoError> {
        let rows = sqlx::query_as::<_, PdfJobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM pdf_jobs \
              WHERE created_by = $1 \
              ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(PdfJobRecord::try_from).collect()
    }
}
