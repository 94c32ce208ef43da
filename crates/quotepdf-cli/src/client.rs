use std::time::Duration;

use async_trait::async_trait;
use quotepdf_api_types::{
    CreatePdfJobRequest, PatchPdfJobRequest, PdfJob, PdfJobList, PdfStatusResponse,
    SubmitPdfResponse,
};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url, header};
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("server URL is required (use --server or QUOTEPDF_SERVER_URL)")]
    MissingServer,
    #[error("session is required for this command (set QUOTEPDF_SESSION)")]
    MissingSession,
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server responded with {status}: {body}")]
    Server { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    Decode(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to render output: {0}")]
    Output(String),
}

/// The two calls the poller needs; implemented over HTTP and by test doubles.
#[async_trait]
pub trait JobsApi: Send + Sync {
    async fn submit(&self, quote_id: Uuid) -> Result<SubmitPdfResponse, CliError>;

    async fn status(&self, quote_id: Uuid, job_id: Uuid) -> Result<PdfStatusResponse, CliError>;
}

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct HttpJobsApi {
    client: Client,
    base: Url,
    session_cookie: Option<String>,
}

impl HttpJobsApi {
    /// `session_cookie` is the `name=token` pair printed by `quotepdf issue-session`.
    /// `request_timeout` bounds each request, response body included.
    pub fn new(
        server: &str,
        session_cookie: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, CliError> {
        let base = Url::parse(server)?.join("/")?;
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base,
            session_cookie: session_cookie.filter(|value| !value.trim().is_empty()),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("quotepdf-cli/", env!("CARGO_PKG_VERSION"))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.session_cookie {
            Some(cookie) => request.header(header::COOKIE, cookie),
            None => request,
        }
    }

    fn require_session(&self) -> Result<(), CliError> {
        self.session_cookie
            .as_ref()
            .map(|_| ())
            .ok_or(CliError::MissingSession)
    }

    pub async fn list_jobs(&self) -> Result<PdfJobList, CliError> {
        self.require_session()?;
        let url = self.base.join("pdf-jobs")?;
        let response = self.request(Method::GET, url).send().await?;
        handle(response, &[StatusCode::OK]).await
    }

    pub async fn get_job(&self, id: Uuid) -> Result<PdfJob, CliError> {
        self.require_session()?;
        let url = self.base.join(&format!("pdf-jobs/{id}"))?;
        let response = self.request(Method::GET, url).send().await?;
        handle(response, &[StatusCode::OK]).await
    }

    pub async fn create_job(&self, body: &CreatePdfJobRequest) -> Result<PdfJob, CliError> {
        self.require_session()?;
        let url = self.base.join("pdf-jobs")?;
        let response = self.request(Method::POST, url).json(body).send().await?;
        handle(response, &[StatusCode::CREATED]).await
    }

    pub async fn patch_job(&self, id: Uuid, body: &PatchPdfJobRequest) -> Result<PdfJob, CliError> {
        self.require_session()?;
        let url = self.base.join(&format!("pdf-jobs/{id}"))?;
        let response = self.request(Method::PATCH, url).json(body).send().await?;
        handle(response, &[StatusCode::OK]).await
    }
}

#[async_trait]
impl JobsApi for HttpJobsApi {
    async fn submit(&self, quote_id: Uuid) -> Result<SubmitPdfResponse, CliError> {
        let url = self.base.join(&format!("quotes/{quote_id}/pdf"))?;
        let response = self.request(Method::POST, url).send().await?;
        // 502 still carries the job id and the failed status of an inline run.
        handle(
            response,
            &[StatusCode::OK, StatusCode::ACCEPTED, StatusCode::BAD_GATEWAY],
        )
        .await
    }

    async fn status(&self, quote_id: Uuid, job_id: Uuid) -> Result<PdfStatusResponse, CliError> {
        let mut url = self.base.join(&format!("quotes/{quote_id}/pdf"))?;
        url.query_pairs_mut()
            .append_pair("jobId", &job_id.to_string());
        let response = self.request(Method::GET, url).send().await?;
        handle(response, &[StatusCode::OK, StatusCode::NOT_FOUND]).await
    }
}

async fn handle<T: DeserializeOwned>(
    response: Response,
    accepted: &[StatusCode],
) -> Result<T, CliError> {
    let status = response.status();
    let bytes = response.bytes().await?;
    if !accepted.contains(&status) {
        return Err(CliError::Server {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }
    serde_json::from_slice(&bytes).map_err(|err| {
        if status.is_success() {
            CliError::Decode(err.to_string())
        } else {
            CliError::Server {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            }
        }
    })
}
