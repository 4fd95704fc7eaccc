use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::debug;
use url::Url;

use exam_core::model::{Answer, ExamResult, SessionId, TestId, TestListing};

use super::wire::{self, AnswerBody, StartBody};
use super::{NextQuestion, ResumeResponse, StartResponse, TestApi};
use crate::error::{ApiError, ConfigError};

const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl ApiConfig {
    /// # Errors
    ///
    /// Returns `ConfigError` if `base_url` is not an absolute http(s) URL.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let parsed = Url::parse(base_url.trim()).map_err(|source| ConfigError::InvalidBaseUrl {
            raw: base_url.to_string(),
            source,
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(parsed.scheme().to_string()));
        }
        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Read `EXAM_API_BASE_URL` and `EXAM_API_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configured base url is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = env::var("EXAM_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let token = env::var("EXAM_API_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        Ok(Self::new(&base_url)?.with_token(token))
    }

    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Body of a successful response, or status and body of a rejected one.
type Exchange = Result<String, (StatusCode, String)>;

/// `TestApi` over HTTP with JSON bodies and a bearer credential.
#[derive(Clone)]
pub struct HttpTestClient {
    client: Client,
    config: ApiConfig,
}

impl HttpTestClient {
    /// # Errors
    ///
    /// Returns `ConfigError::Http` if the HTTP client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self, ConfigError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send and return the raw body, or the status and body of a failed response.
    async fn exchange(&self, request: RequestBuilder) -> Result<Exchange, ApiError> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            Ok(Ok(body))
        } else {
            debug!(%status, %body, "test service rejected request");
            Ok(Err((status, body)))
        }
    }

    async fn fetch(&self, request: RequestBuilder) -> Result<String, ApiError> {
        self.exchange(request)
            .await?
            .map_err(|(status, body)| wire::classify_failure(status, &body))
    }
}

#[async_trait]
impl TestApi for HttpTestClient {
    async fn start(&self, test_id: TestId) -> Result<StartResponse, ApiError> {
        debug!(%test_id, "start");
        let request = self
            .client
            .post(self.config.endpoint("test/start/"))
            .json(&StartBody {
                test_id: test_id.value(),
            });
        let body = self
            .exchange(request)
            .await?
            .map_err(|(status, body)| wire::classify_start_failure(status, &body))?;
        wire::decode_start(&body)
    }

    async fn resume(&self, session_id: SessionId) -> Result<ResumeResponse, ApiError> {
        debug!(%session_id, "resume");
        let request = self
            .client
            .get(self.config.endpoint(&format!("test/{session_id}/resume/")));
        wire::decode_resume(&self.fetch(request).await?)
    }

    async fn submit_answer(&self, session_id: SessionId, answer: Answer) -> Result<(), ApiError> {
        debug!(
            %session_id,
            question_id = %answer.question_id,
            option_id = %answer.option_id,
            "answer"
        );
        let request = self
            .client
            .post(self.config.endpoint(&format!("test/{session_id}/answer/")))
            .json(&AnswerBody {
                question_id: answer.question_id.value(),
                selected_option_id: answer.option_id.value(),
            });
        self.fetch(request).await.map(|_| ())
    }

    async fn next_question(&self, session_id: SessionId) -> Result<NextQuestion, ApiError> {
        debug!(%session_id, "next");
        let request = self
            .client
            .get(self.config.endpoint(&format!("test/{session_id}/next/")));
        wire::decode_next(&self.fetch(request).await?)
    }

    async fn finish(&self, session_id: SessionId) -> Result<ExamResult, ApiError> {
        debug!(%session_id, "finish");
        let request = self
            .client
            .post(self.config.endpoint(&format!("test/{session_id}/finish/")));
        wire::decode_finish(&self.fetch(request).await?)
    }

    async fn list_tests(&self) -> Result<Vec<TestListing>, ApiError> {
        let request = self.client.get(self.config.endpoint("tests/"));
        wire::decode_tests(&self.fetch(request).await?)
    }
}
