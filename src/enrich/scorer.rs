use crate::retry::RetryPolicy;
use crate::util::is_secure_or_loopback;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Scoring request timed out")]
    Timeout,
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Scoring service returned no text")]
    EmptyResponse,
    #[error("Malformed scoring response: {0}")]
    Malformed(String),
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    #[error("Scoring service is not configured")]
    Disabled,
}

impl ScoringError {
    /// Returns true if this error is transient and the request should be retried.
    fn is_retryable(&self) -> bool {
        match self {
            ScoringError::Timeout | ScoringError::Network(_) => true,
            ScoringError::HttpStatus(status) => *status == 429 || *status >= 500,
            ScoringError::EmptyResponse
            | ScoringError::Malformed(_)
            | ScoringError::InsecureBaseUrl
            | ScoringError::Disabled => false,
        }
    }
}

/// Text-in, text-out completion service used to score article batches.
#[async_trait]
pub trait ScoringService: Send + Sync {
    /// Sends `prompt` and returns the raw completion text.
    async fn complete(&self, prompt: &str) -> Result<String, ScoringError>;

    fn name(&self) -> &str;

    /// A disabled service is never called; every article gets fallback values.
    fn is_enabled(&self) -> bool {
        true
    }
}

#[async_trait]
impl<S: ScoringService + ?Sized> ScoringService for std::sync::Arc<S> {
    async fn complete(&self, prompt: &str) -> Result<String, ScoringError> {
        (**self).complete(prompt).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }
}

/// Used when no API key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledScorer;

#[async_trait]
impl ScoringService for DisabledScorer {
    async fn complete(&self, _prompt: &str) -> Result<String, ScoringError> {
        Err(ScoringError::Disabled)
    }

    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Gemini `generateContent` client.
///
/// The key travels in the `x-goog-api-key` header, never in the URL.
pub struct GeminiScorer {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for GeminiScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiScorer")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish()
    }
}

impl GeminiScorer {
    /// Fails with [`ScoringError::InsecureBaseUrl`] for plain-HTTP bases other
    /// than loopback.
    pub fn new(
        client: reqwest::Client,
        api_key: SecretString,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ScoringError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !is_secure_or_loopback(&base_url) {
            tracing::error!(base_url = %base_url, "Rejecting non-HTTPS scoring base URL");
            return Err(ScoringError::InsecureBaseUrl);
        }
        if !base_url.starts_with("https://") {
            tracing::warn!(base_url = %base_url, "Using non-HTTPS scoring base URL (localhost only)");
        }
        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    async fn send_once(&self, body: &[u8]) -> Result<String, ScoringError> {
        let request = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec());

        let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| ScoringError::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            return Err(ScoringError::HttpStatus(status.as_u16()));
        }

        let bytes = tokio::time::timeout(REQUEST_TIMEOUT, response.bytes())
            .await
            .map_err(|_| ScoringError::Timeout)??;

        extract_text(&bytes)
    }
}

#[async_trait]
impl ScoringService for GeminiScorer {
    async fn complete(&self, prompt: &str) -> Result<String, ScoringError> {
        let body = serde_json::to_vec(&serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.2 }
        }))
        .map_err(|e| ScoringError::Malformed(e.to_string()))?;

        let mut retry_count = 0;
        loop {
            match self.send_once(&body).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && retry_count < self.retry.max_retries => {
                    let delay = self.retry.delay_for(retry_count);
                    tracing::debug!(
                        error = %e,
                        retry = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying scoring request after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// Pulls `candidates[0].content.parts[0].text` out of the envelope.
fn extract_text(bytes: &[u8]) -> Result<String, ScoringError> {
    let envelope: GenerateResponse =
        serde_json::from_slice(bytes).map_err(|e| ScoringError::Malformed(e.to_string()))?;

    envelope
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .map(|p| p.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or(ScoringError::EmptyResponse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FAST_RETRY: RetryPolicy = RetryPolicy::new(2, Duration::from_millis(5));

    fn scorer(base: &str) -> GeminiScorer {
        GeminiScorer::new(
            reqwest::Client::new(),
            SecretString::from("test-key-123"),
            "test-model",
            base,
        )
        .unwrap()
        .with_retry(FAST_RETRY)
    }

    fn envelope(text: &str) -> serde_json::Value {
        json!({ "candidates": [ { "content": { "parts": [ { "text": text } ] } } ] })
    }

    #[tokio::test]
    async fn test_complete_sends_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .and(header("x-goog-api-key", "test-key-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope("{\"articles\": []}")))
            .expect(1)
            .mount(&server)
            .await;

        let text = scorer(&server.uri()).complete("prompt").await.unwrap();
        assert_eq!(text, "{\"articles\": []}");
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let result = scorer(&server.uri()).complete("prompt").await;
        assert!(matches!(result, Err(ScoringError::HttpStatus(400))));
    }

    #[tokio::test]
    async fn test_server_error_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3) // Initial request + 2 retries
            .mount(&server)
            .await;

        let result = scorer(&server.uri()).complete("prompt").await;
        assert!(matches!(result, Err(ScoringError::HttpStatus(503))));
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let result = scorer(&server.uri()).complete("prompt").await;
        assert!(matches!(result, Err(ScoringError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_non_json_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = scorer(&server.uri()).complete("prompt").await;
        assert!(matches!(result, Err(ScoringError::Malformed(_))));
    }

    #[test]
    fn test_rejects_insecure_base() {
        let result = GeminiScorer::new(
            reqwest::Client::new(),
            SecretString::from("k"),
            "m",
            "http://scoring.example.com",
        );
        assert!(matches!(result, Err(ScoringError::InsecureBaseUrl)));
    }

    #[test]
    fn test_debug_masks_api_key() {
        let s = scorer("http://127.0.0.1:1");
        let debug_output = format!("{:?}", s);
        assert!(!debug_output.contains("test-key-123"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_disabled_scorer() {
        assert!(!DisabledScorer.is_enabled());
        assert!(matches!(
            DisabledScorer.complete("x").await,
            Err(ScoringError::Disabled)
        ));
    }
}
