//! Recap AI service HTTP client.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use crate::error::{AiError, AiResult};
use crate::types::{
    DescribeRequest, DescribeSubmission, HealthResponse, NarrationRequest, RemoteJobStatus,
};

/// Configuration for the AI client.
#[derive(Debug, Clone)]
pub struct AiClientConfig {
    /// Base URL of the AI service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries for transient network failures
    pub max_retries: u32,
}

impl Default for AiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_string(),
            timeout: Duration::from_secs(120),
            max_retries: 2,
        }
    }
}

impl AiClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("RECAP_AI_URL")
                .unwrap_or_else(|_| "http://localhost:8002".to_string()),
            timeout: Duration::from_secs(
                std::env::var("RECAP_AI_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            max_retries: std::env::var("RECAP_AI_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
        }
    }
}

/// Client for the recap AI service.
#[derive(Clone)]
pub struct AiClient {
    http: Client,
    config: AiClientConfig,
}

impl AiClient {
    /// Create a new AI client.
    pub fn new(config: AiClientConfig) -> AiResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(AiError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> AiResult<Self> {
        Self::new(AiClientConfig::from_env())
    }

    /// Check if the AI service is healthy.
    pub async fn health_check(&self) -> AiResult<bool> {
        let url = format!("{}/health", self.config.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("AI service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("AI service health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Submit chunks for scene description.
    ///
    /// The service answers immediately with a job handle and delivers the
    /// descriptions asynchronously to the request's callback URL.
    pub async fn submit_description(
        &self,
        request: &DescribeRequest,
    ) -> AiResult<DescribeSubmission> {
        let url = format!("{}/describe", self.config.base_url);
        debug!(video_id = %request.video_id, "Submitting description request");

        let response = self
            .with_retry(|| async {
                self.http
                    .post(&url)
                    .json(request)
                    .send()
                    .await
                    .map_err(AiError::Network)
            })
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::RequestFailed(format!(
                "AI service returned {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    /// Poll the status of a remote description job.
    ///
    /// Used as the bounded fallback when the webhook callback does not
    /// arrive in time.
    pub async fn fetch_status(&self, remote_job_id: &str) -> AiResult<RemoteJobStatus> {
        let url = format!("{}/describe/{}", self.config.base_url, remote_job_id);

        let response = self
            .with_retry(|| async { self.http.get(&url).send().await.map_err(AiError::Network) })
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::RequestFailed(format!(
                "AI service returned {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    /// Synthesize narration audio for one scene. Returns encoded audio bytes.
    pub async fn synthesize_narration(&self, request: &NarrationRequest) -> AiResult<Vec<u8>> {
        let url = format!("{}/narrate", self.config.base_url);

        let response = self
            .with_retry(|| async {
                self.http
                    .post(&url)
                    .json(request)
                    .send()
                    .await
                    .map_err(AiError::Network)
            })
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::RequestFailed(format!(
                "AI service returned {}: {}",
                status, body
            )));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(AiError::InvalidResponse(
                "narration response carried no audio".to_string(),
            ));
        }
        Ok(bytes.to_vec())
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> AiResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = AiResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "AI request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(AiError::RequestFailed("Unknown error".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = AiClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8002");
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert_eq!(config.max_retries, 2);
    }
}
