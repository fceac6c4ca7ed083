use crate::domain::messages::{ApiErrorEnvelope, MessageRequest, MessageResponse};
use crate::domain::ports::MessagesApi;
use crate::utils::error::{AnalyzerError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl ClientSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(600),
            retry_attempts: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Messages API client over reqwest.
pub struct AnthropicClient {
    settings: ClientSettings,
    client: Client,
}

impl AnthropicClient {
    pub fn new(settings: ClientSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(AnalyzerError::MissingApiKey {
                hint: "the configured API key is empty".to_string(),
            });
        }

        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { settings, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.settings.base_url.trim_end_matches('/'))
    }

    async fn try_request(&self, request: &MessageRequest) -> Result<MessageResponse> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorEnvelope>(&body) {
                Ok(envelope) => format!("{}: {}", envelope.error.error_type, envelope.error.message),
                Err(_) if body.is_empty() => status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string(),
                Err(_) => body,
            };
            return Err(AnalyzerError::UpstreamError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        serde_json::from_str::<MessageResponse>(&body).map_err(|e| {
            AnalyzerError::MalformedResponse {
                stage: "messages_api".to_string(),
                message: format!("unexpected response body: {}", e),
            }
        })
    }
}

#[async_trait]
impl MessagesApi for AnthropicClient {
    async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse> {
        let max_attempts = self.settings.retry_attempts + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            tracing::debug!(
                "📡 POST {} (model: {}, attempt {}/{})",
                self.endpoint(),
                request.model,
                attempt,
                max_attempts
            );

            match self.try_request(request).await {
                Ok(response) => {
                    tracing::debug!(
                        "📥 {} tokens in, {} tokens out (stop: {:?})",
                        response.usage.input_tokens,
                        response.usage.output_tokens,
                        response.stop_reason
                    );
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.settings.retry_delay * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        "⚠️ Messages API request failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
