//! In-memory adapters and an assembled service graph for integration tests.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use time::{OffsetDateTime, macros::date};
use tokio::sync::{Mutex, Semaphore};
use tower::ServiceExt;
use uuid::Uuid;

use quotepdf::application::{
    artifacts::{ArtifactPublisher, ArtifactRefStyle, ObjectStore, StorageError},
    jobs::{JobProcessor, PdfJobService, PdfPipeline, PdfWorkerPool},
    payload::{PayloadBuilder, RenderPayload},
    render::{RenderClient, RenderServiceError, RenderedDocument},
    repos::{
        CreateSessionParams, NewPdfJob, PdfJobsRepo, QuotesRepo, RepoError, SessionsRepo,
        UpdatePdfJobParams,
    },
    sessions::{SessionPolicy, SessionService},
};
use quotepdf::domain::{
    entities::{
        ClientRecord, CompanyRecord, PdfJobRecord, PostalAddress, QuoteDocument, QuoteItemRecord,
        QuoteRecord, SessionRecord,
    },
    money::Cents,
    types::{PdfJobStatus, PdfJobVariant},
};
use quotepdf::infra::{
    db::PostgresRepositories,
    http::{ApiState, HttpState, RouterState, SessionCookie, build_router},
};

pub const PUBLIC_BASE: &str = "http://files.test/artifacts";
pub const COOKIE_NAME: &str = "quotepdf_session";

#[derive(Default)]
pub struct MemoryJobs {
    rows: Mutex<HashMap<Uuid, PdfJobRecord>>,
    pub fail_completion: AtomicBool,
}

impl MemoryJobs {
    pub async fn get(&self, id: Uuid) -> Option<PdfJobRecord> {
        self.rows.lock().await.get(&id).cloned()
    }

    /// Shift a job's creation time into the past.
    pub async fn backdate(&self, id: Uuid, by: time::Duration) {
        if let Some(row) = self.rows.lock().await.get_mut(&id) {
            row.created_at -= by;
        }
    }

    pub async fn all(&self) -> Vec<PdfJobRecord> {
        self.rows.lock().await.values().cloned().collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        status: PdfJobStatus,
        artifact_ref: Option<String>,
    ) -> Option<PdfJobRecord> {
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(&id)?;
        if row.status != PdfJobStatus::Pending {
            return None;
        }
        row.status = status;
        row.artifact_ref = artifact_ref;
        row.updated_at = OffsetDateTime::now_utc();
        Some(row.clone())
    }
}

fn visible(row: &PdfJobRecord, owner: Option<&str>) -> bool {
    owner.is_none_or(|owner| row.is_owned_by(owner))
}

#[async_trait]
impl PdfJobsRepo for MemoryJobs {
    async fn create_job(&self, job: NewPdfJob) -> Result<PdfJobRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let record = PdfJobRecord {
            id: Uuid::new_v4(),
            quote_id: job.quote_id,
            status: job.status,
            artifact_ref: job.artifact_ref,
            created_by: job.created_by,
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_job(
        &self,
        id: Uuid,
        owner: Option<&str>,
    ) -> Result<Option<PdfJobRecord>, RepoError> {
        Ok(self
            .rows
            .lock()
            .await
            .get(&id)
            .filter(|row| visible(row, owner))
            .cloned())
    }

    async fn find_latest_for_quote(
        &self,
        quote_id: Uuid,
        job_id: Option<Uuid>,
        owner: Option<&str>,
    ) -> Result<Option<PdfJobRecord>, RepoError> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .filter(|row| row.quote_id == quote_id)
            .filter(|row| job_id.is_none_or(|id| row.id == id))
            .filter(|row| visible(row, owner))
            .max_by_key(|row| (row.created_at, row.id))
            .cloned())
    }

    async fn update_job(
        &self,
        params: UpdatePdfJobParams,
    ) -> Result<Option<PdfJobRecord>, RepoError> {
        let mut rows = self.rows.lock().await;
        let Some(row) = rows.get_mut(&params.id) else {
            return Ok(None);
        };
        if !visible(row, params.owner.as_deref()) || row.status != params.expected_status {
            return Ok(None);
        }
        if let Some(status) = params.status {
            row.status = status;
        }
        if let Some(artifact_ref) = params.artifact_ref {
            row.artifact_ref = artifact_ref;
        }
        row.updated_at = OffsetDateTime::now_utc();
        Ok(Some(row.clone()))
    }

    async fn complete_pending(
        &self,
        id: Uuid,
        artifact_ref: &str,
    ) -> Result<Option<PdfJobRecord>, RepoError> {
        if self.fail_completion.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("connection reset"));
        }
        Ok(self
            .transition(id, PdfJobStatus::Completed, Some(artifact_ref.to_string()))
            .await)
    }

    async fn fail_pending(&self, id: Uuid) -> Result<Option<PdfJobRecord>, RepoError> {
        Ok(self.transition(id, PdfJobStatus::Failed, None).await)
    }

    async fn fail_stale_pending(
        &self,
        created_before: OffsetDateTime,
    ) -> Result<Vec<PdfJobRecord>, RepoError> {
        let mut rows = self.rows.lock().await;
        let now = OffsetDateTime::now_utc();
        Ok(rows
            .values_mut()
            .filter(|row| row.status == PdfJobStatus::Pending && row.created_at < created_before)
            .map(|row| {
                row.status = PdfJobStatus::Failed;
                row.artifact_ref = None;
                row.updated_at = now;
                row.clone()
            })
            .collect())
    }

    async fn list_for_owner(&self, owner: &str) -> Result<Vec<PdfJobRecord>, RepoError> {
        let mut rows: Vec<_> = self
            .rows
            .lock()
            .await
            .values()
            .filter(|row| row.is_owned_by(owner))
            .cloned()
            .collect();
        rows.sort_by_key(|row| std::cmp::Reverse((row.created_at, row.id)));
        Ok(rows)
    }
}

#[derive(Default)]
pub struct MemoryQuotes {
    documents: Mutex<HashMap<Uuid, QuoteDocument>>,
}

impl MemoryQuotes {
    pub async fn insert_sample(&self) -> Uuid {
        let document = sample_document();
        let id = document.quote.id;
        self.documents.lock().await.insert(id, document);
        id
    }
}

#[async_trait]
impl QuotesRepo for MemoryQuotes {
    async fn load_quote_document(
        &self,
        quote_id: Uuid,
    ) -> Result<Option<QuoteDocument>, RepoError> {
        Ok(self.documents.lock().await.get(&quote_id).cloned())
    }
}

pub fn sample_document() -> QuoteDocument {
    let company_id = Uuid::new_v4();
    let client_id = Uuid::new_v4();
    QuoteDocument {
        quote: QuoteRecord {
            id: Uuid::new_v4(),
            company_id,
            client_id,
            quote_number: "ORC-0042".into(),
            status: "draft".into(),
            issue_date: date!(2024 - 06 - 01),
            expiry_date: None,
            notes: None,
            terms_and_conditions: None,
            subtotal: Cents(10_000),
            discount_type: None,
            discount_value: Cents::ZERO,
            tax_amount: Cents::ZERO,
            total_amount: Cents(10_000),
            currency: "BRL".into(),
        },
        company: CompanyRecord {
            id: company_id,
            name: "Acme Ltda".into(),
            document_number: None,
            document_type: None,
            email: None,
            phone: None,
            website: None,
            logo_url: None,
            address: PostalAddress::default(),
        },
        client: ClientRecord {
            id: client_id,
            name: "Beta SA".into(),
            email: None,
            phone_number: None,
            document_number: None,
        },
        items: vec![QuoteItemRecord {
            id: Uuid::new_v4(),
            position: 1,
            description: "Consultoria".into(),
            quantity: 2,
            unit_price: Cents(5_000),
            total_price: Cents(10_000),
        }],
    }
}

#[derive(Default)]
pub struct MemorySessions {
    rows: Mutex<HashMap<Uuid, SessionRecord>>,
}

#[async_trait]
impl SessionsRepo for MemorySessions {
    async fn create_session(&self, params: CreateSessionParams) -> Result<SessionRecord, RepoError> {
        let record = SessionRecord {
            id: Uuid::new_v4(),
            principal: params.principal,
            hashed_secret: params.hashed_secret,
            expires_at: params.expires_at,
            created_at: OffsetDateTime::now_utc(),
        };
        self.rows.lock().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<SessionRecord>, RepoError> {
        Ok(self.rows.lock().await.get(&id).cloned())
    }

    async fn extend_session(&self, id: Uuid, expires_at: OffsetDateTime) -> Result<(), RepoError> {
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(&id).ok_or(RepoError::NotFound)?;
        row.expires_at = expires_at;
        Ok(())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|_, row| row.expires_at > now);
        Ok((before - rows.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Bytes>>,
    pub fail_put: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl MemoryStore {
    pub async fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, bytes: Bytes, _content_type: &str) -> Result<(), StorageError> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(StorageError::backend("bucket unavailable"));
        }
        self.objects.lock().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StorageError::backend("delete refused"));
        }
        self.objects.lock().await.remove(key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        Ok(self.objects.lock().await.get(key).cloned())
    }
}

/// What the scripted render service does on each call.
#[derive(Debug, Clone)]
pub enum RenderBehaviour {
    /// Returns `%PDF-<call number>`.
    Pdf,
    Hosted(String),
    Status(u16),
    Empty,
    Panic,
}

pub struct ScriptedRenderer {
    behaviour: std::sync::Mutex<RenderBehaviour>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    pub payloads: Mutex<Vec<RenderPayload>>,
}

impl ScriptedRenderer {
    pub fn new(behaviour: RenderBehaviour) -> Self {
        Self {
            behaviour: std::sync::Mutex::new(behaviour),
            gate: None,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            payloads: Mutex::new(Vec::new()),
        }
    }

    /// Each render waits for one permit of `gate` before answering.
    pub fn gated(behaviour: RenderBehaviour, gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(behaviour)
        }
    }

    pub fn set_behaviour(&self, behaviour: RenderBehaviour) {
        *self.behaviour.lock().expect("behaviour lock") = behaviour;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RenderClient for ScriptedRenderer {
    async fn render(&self, payload: &RenderPayload) -> Result<RenderedDocument, RenderServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = RunningGuard(&self.running);
        self.peak.fetch_max(running, Ordering::SeqCst);
        self.payloads.lock().await.push(payload.clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate open").forget();
        }

        let behaviour = self.behaviour.lock().expect("behaviour lock").clone();
        match behaviour {
            RenderBehaviour::Pdf => Ok(RenderedDocument::Bytes(Bytes::from(format!(
                "%PDF-{call}"
            )))),
            RenderBehaviour::Hosted(url) => Ok(RenderedDocument::Hosted(url)),
            RenderBehaviour::Status(status) => Err(RenderServiceError::Status {
                status,
                body: "render failed".into(),
            }),
            RenderBehaviour::Empty => Ok(RenderedDocument::Bytes(Bytes::new())),
            RenderBehaviour::Panic => panic!("renderer crashed"),
        }
    }
}

pub struct Harness {
    pub variant: PdfJobVariant,
    pub jobs: Arc<MemoryJobs>,
    pub quotes: Arc<MemoryQuotes>,
    pub store: Arc<MemoryStore>,
    pub renderer: Arc<ScriptedRenderer>,
    pub processor: Arc<JobProcessor>,
    pub service: Arc<PdfJobService>,
    pub sessions: Arc<SessionService>,
    pub pool: Option<PdfWorkerPool>,
}

impl Harness {
    pub fn detached(renderer: ScriptedRenderer) -> Self {
        Self::build(PdfJobVariant::DetachedAnonymous, renderer, Some((4, 16)))
    }

    pub fn inline(renderer: ScriptedRenderer) -> Self {
        Self::build(PdfJobVariant::InlineOwnerScoped, renderer, None)
    }

    /// `pool` is `(concurrency, capacity)`; `None` spawns one task per job.
    pub fn build(
        variant: PdfJobVariant,
        renderer: ScriptedRenderer,
        pool: Option<(usize, usize)>,
    ) -> Self {
        let jobs = Arc::new(MemoryJobs::default());
        let quotes = Arc::new(MemoryQuotes::default());
        let store = Arc::new(MemoryStore::default());
        let renderer = Arc::new(renderer);

        let style = match variant {
            PdfJobVariant::DetachedAnonymous => ArtifactRefStyle::StorageKey,
            PdfJobVariant::InlineOwnerScoped => ArtifactRefStyle::PublicUrl,
        };
        let publisher = ArtifactPublisher::new(store.clone(), PUBLIC_BASE, style);
        let pipeline = Arc::new(PdfPipeline::new(
            PayloadBuilder::new(quotes.clone()),
            renderer.clone(),
            publisher,
        ));
        let processor = Arc::new(JobProcessor::new(jobs.clone(), pipeline));
        let pool = pool.map(|(concurrency, capacity)| {
            PdfWorkerPool::start(processor.clone(), concurrency, capacity)
        });
        let service = Arc::new(PdfJobService::new(
            jobs.clone(),
            processor.clone(),
            pool.as_ref().map(PdfWorkerPool::queue),
            variant,
        ));
        let sessions = Arc::new(SessionService::new(
            Arc::new(MemorySessions::default()),
            SessionPolicy {
                ttl: time::Duration::hours(12),
                refresh_threshold: time::Duration::hours(1),
            },
        ));

        Self {
            variant,
            jobs,
            quotes,
            store,
            renderer,
            processor,
            service,
            sessions,
            pool,
        }
    }

    pub fn router(&self) -> Router {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://quotepdf@127.0.0.1:1/unused")
            .expect("lazy pool");
        build_router(RouterState {
            http: HttpState {
                db: Arc::new(PostgresRepositories::new(pool)),
                artifacts: self.store.clone(),
            },
            api: ApiState {
                jobs: self.service.clone(),
                sessions: self.sessions.clone(),
                cookie: SessionCookie {
                    name: COOKIE_NAME.into(),
                    secure: false,
                    max_age: time::Duration::hours(12),
                },
            },
        })
    }

    /// `Cookie` header value for a fresh session of `user`.
    pub async fn cookie_for(&self, user: &str) -> String {
        let issued = self.sessions.issue(user).await.expect("issue session");
        format!("{COOKIE_NAME}={}", issued.token)
    }

    /// Waits until the job leaves `pending`; panics after two seconds.
    pub async fn settled(&self, job_id: Uuid) -> PdfJobRecord {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(job) = self.jobs.get(job_id).await
                && job.status.is_terminal()
            {
                return job;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {job_id} still pending"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

pub fn request(method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.expect("router responds")
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}
