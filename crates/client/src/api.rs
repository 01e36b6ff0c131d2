//! Command API client.
//!
//! [`ScreeningApi`] is the seam between the screening controllers and the
//! recruiting backend's REST endpoints. [`HttpScreeningApi`] implements it
//! with [`reqwest`]; tests substitute an in-memory fake.

use async_trait::async_trait;
use hirewire_core::candidate::{Candidate, Decision};
use hirewire_core::progress::ProgressSnapshot;
use hirewire_core::scoring::ScoringConfig;
use hirewire_core::screening::ScreeningStatus;
use hirewire_core::types::DbId;
use serde::{Deserialize, Serialize};

use crate::error::GENERIC_FAILURE_MESSAGE;

/// Errors from the command API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server declined the request.
    #[error("Request rejected ({status}): {reason}")]
    Rejected {
        status: u16,
        /// Server-provided reason, or a generic message when none was given.
        reason: String,
    },
}

/// Query filters for the screening results endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsFilter {
    pub decision: Option<Decision>,
    pub min_score: Option<f64>,
    /// Free-text match on candidate name or email.
    pub search: Option<String>,
}

impl ResultsFilter {
    /// Query-string pairs for the filters that are set.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(decision) = self.decision {
            pairs.push(("decision", decision.as_str().to_string()));
        }
        if let Some(min_score) = self.min_score {
            pairs.push(("min_score", min_score.to_string()));
        }
        if let Some(search) = self.search.as_deref().map(str::trim) {
            if !search.is_empty() {
                pairs.push(("search", search.to_string()));
            }
        }
        pairs
    }
}

/// Response body of the screening progress endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressResponse {
    #[serde(default)]
    pub status: ScreeningStatus,
    #[serde(default)]
    pub total_applications: u32,
    #[serde(default)]
    pub screened_applications: u32,
    #[serde(default)]
    pub percentage: f64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub sequence: Option<u64>,
}

impl ProgressResponse {
    pub fn to_snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            status: self.status,
            total: self.total_applications,
            screened: self.screened_applications,
            percentage: self.percentage,
            error: self.error.clone(),
            sequence: self.sequence,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResultsResponse {
    #[serde(default)]
    results: Vec<Candidate>,
}

#[derive(Debug, Serialize)]
struct AdvanceRequest<'a> {
    application_ids: &'a [DbId],
    #[serde(skip_serializing_if = "Option::is_none")]
    feedback: Option<&'a str>,
}

/// Server-side operations used by the screening controllers.
#[async_trait]
pub trait ScreeningApi: Send + Sync {
    /// Scoring rubric of a job posting, `None` when none is configured.
    async fn get_config(&self, job_posting_id: DbId) -> Result<Option<ScoringConfig>, ApiError>;

    async fn save_config(
        &self,
        job_posting_id: DbId,
        config: &ScoringConfig,
    ) -> Result<ScoringConfig, ApiError>;

    async fn start_screening(&self, job_posting_id: DbId) -> Result<(), ApiError>;

    async fn progress(&self, job_posting_id: DbId) -> Result<ProgressSnapshot, ApiError>;

    async fn results(
        &self,
        job_posting_id: DbId,
        filter: &ResultsFilter,
    ) -> Result<Vec<Candidate>, ApiError>;

    async fn pause_screening(&self, job_posting_id: DbId) -> Result<(), ApiError>;

    async fn reset_screening(&self, job_posting_id: DbId) -> Result<(), ApiError>;

    async fn move_to_next_stage(
        &self,
        application_ids: &[DbId],
        feedback: Option<&str>,
    ) -> Result<(), ApiError>;
}

/// [`ScreeningApi`] over HTTP.
pub struct HttpScreeningApi {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl HttpScreeningApi {
    /// * `api_url` - REST base URL, e.g. `http://host:8000/api`.
    /// * `token`   - session credential sent as a bearer token.
    pub fn new(api_url: String, token: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, token)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client, api_url: String, token: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn job_url(&self, job_posting_id: DbId, action: &str) -> String {
        format!("{}/jobs/{job_posting_id}/{action}/", self.api_url)
    }

    fn get(&self, url: String) -> reqwest::RequestBuilder {
        self.client.get(url).bearer_auth(&self.token)
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        self.client.post(url).bearer_auth(&self.token)
    }

    // ---- private helpers ----

    /// Return the response unchanged on success, or
    /// [`ApiError::Rejected`] carrying the server's reason.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), %body, "Command API rejected request");
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                reason: rejection_reason(&body),
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ScreeningApi for HttpScreeningApi {
    async fn get_config(&self, job_posting_id: DbId) -> Result<Option<ScoringConfig>, ApiError> {
        let response = self
            .get(self.job_url(job_posting_id, "ats-config"))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::parse_response(response).await
    }

    async fn save_config(
        &self,
        job_posting_id: DbId,
        config: &ScoringConfig,
    ) -> Result<ScoringConfig, ApiError> {
        let response = self
            .post(self.job_url(job_posting_id, "ats-config"))
            .json(config)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn start_screening(&self, job_posting_id: DbId) -> Result<(), ApiError> {
        let response = self
            .post(self.job_url(job_posting_id, "start-bulk-screening"))
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn progress(&self, job_posting_id: DbId) -> Result<ProgressSnapshot, ApiError> {
        let response = self
            .get(self.job_url(job_posting_id, "screening-progress"))
            .send()
            .await?;
        let body: ProgressResponse = Self::parse_response(response).await?;
        Ok(body.to_snapshot())
    }

    async fn results(
        &self,
        job_posting_id: DbId,
        filter: &ResultsFilter,
    ) -> Result<Vec<Candidate>, ApiError> {
        let response = self
            .get(self.job_url(job_posting_id, "screening-results"))
            .query(&filter.query_pairs())
            .send()
            .await?;
        let body: ResultsResponse = Self::parse_response(response).await?;
        Ok(body.results)
    }

    async fn pause_screening(&self, job_posting_id: DbId) -> Result<(), ApiError> {
        let response = self
            .post(self.job_url(job_posting_id, "pause-screening"))
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn reset_screening(&self, job_posting_id: DbId) -> Result<(), ApiError> {
        let response = self
            .post(self.job_url(job_posting_id, "reset-screening"))
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn move_to_next_stage(
        &self,
        application_ids: &[DbId],
        feedback: Option<&str>,
    ) -> Result<(), ApiError> {
        let body = AdvanceRequest {
            application_ids,
            feedback,
        };
        let response = self
            .post(format!("{}/applications/move-to-next-stage/", self.api_url))
            .json(&body)
            .send()
            .await?;
        Self::check_status(response).await
    }
}

/// Pull a human-readable reason out of an error body.
///
/// Looks for `error`, `detail` or `message` string fields; anything else
/// yields the generic failure message.
pub fn rejection_reason(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["error", "detail", "message"].iter().find_map(|key| {
                value
                    .get(key)
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string())
}
