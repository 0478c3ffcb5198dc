use super::base_client::{LLMClient, LLMError, LLMMessage, LLMResponse};
use crate::config::ModelParameters;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client as HttpClient;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Serialize, Debug)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: &'a [LLMMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Client for any backend exposing an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug)]
pub struct OpenAIClient {
    http_client: HttpClient,
    base_url: String,
    temperature: Option<f32>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl OpenAIClient {
    /// Builds a client from explicit backend settings.
    pub fn new(params: &ModelParameters) -> Result<Self, LLMError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", params.api_key_or_placeholder()))
                .map_err(|e| LLMError::Other(format!("Invalid API key format: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = HttpClient::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(params.request_timeout_secs))
            .build()
            .map_err(LLMError::Network)?;

        Ok(Self {
            http_client,
            base_url: params.base_url_or_default().trim_end_matches('/').to_string(),
            temperature: params.temperature,
            max_retries: params.max_retries,
            retry_backoff: Duration::from_millis(params.retry_backoff_ms),
        })
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.retry_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }

    async fn send_once(&self, request_payload: &OpenAIChatRequest<'_>) -> Result<LLMResponse, LLMError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(request_payload)
            .send()
            .await?;

        let status = response.status();
        debug!(status = ?status, "Received chat completion response status");

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), error_body = %error_body, "Chat completion API error");
            return Err(LLMError::ApiError {
                status: status.as_u16(),
                body: error_body,
            });
        }

        let body = response.text().await?;
        serde_json::from_str::<LLMResponse>(&body).map_err(|e| {
            error!(error = %e, "Failed to parse chat completion response");
            LLMError::ParsingError(e.to_string())
        })
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    #[instrument(skip(self, messages), fields(base_url = %self.base_url))]
    async fn chat(
        &self,
        model: &str,
        messages: Vec<LLMMessage>,
    ) -> Result<LLMResponse, LLMError> {
        let request_payload = OpenAIChatRequest {
            model,
            messages: &messages,
            temperature: self.temperature,
        };
        debug!(payload = ?request_payload, "Sending chat completion request");

        let mut attempt = 0;
        loop {
            match self.send_once(&request_payload).await {
                Ok(llm_response) => {
                    debug!(response_id = %llm_response.id, choices = llm_response.choices.len(), "Parsed chat completion response");
                    return Ok(llm_response);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff_for(attempt);
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying chat completion request after error"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn get_provider_name(&self) -> String {
        "openai".to_string()
    }
}
