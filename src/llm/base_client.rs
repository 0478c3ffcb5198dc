use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during LLM client operations.
///
/// The agent treats every variant as the model being unavailable.
#[derive(Error, Debug)]
pub enum LLMError {
    /// Error related to network requests (e.g., connection refused, timeout).
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Error reported by the LLM API (any non-2xx status).
    #[error("API request failed with status {status}: {body}")]
    ApiError { status: u16, body: String },
    /// The response carried no choice, or the first choice had no text content.
    #[error("Model response contained no choices")]
    EmptyResponse,
    /// Error during parsing of the LLM's response (e.g., malformed JSON).
    #[error("Failed to parse response: {0}")]
    ParsingError(String),
    /// Any other type of error.
    #[error("Other error: {0}")]
    Other(String),
}

impl LLMError {
    /// Whether a retry of the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LLMError::Network(e) => !e.is_builder(),
            LLMError::ApiError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Represents the role of a message in a conversation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Represents a single message in a conversation with an LLM.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LLMMessage {
    /// The role of the message sender.
    pub role: MessageRole,
    /// The textual content of the message. Some backends send `null` here.
    pub content: Option<String>,
}

impl LLMMessage {
    pub fn user(content: impl Into<String>) -> Self {
        LLMMessage {
            role: MessageRole::User,
            content: Some(content.into()),
        }
    }
}

/// Represents a single choice from an LLM response.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LLMResponseChoice {
    #[serde(default)]
    pub index: u32,
    /// The message generated by the LLM for this choice.
    pub message: LLMMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Represents token usage information for an LLM API call.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LLMUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: Option<u32>,
    pub total_tokens: u32,
}

/// Represents the overall response from a chat completion API.
///
/// Only `choices` is required; local backends frequently omit the rest.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LLMResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<LLMResponseChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<LLMUsage>,
}

impl LLMResponse {
    /// Text content of the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
    }
}

/// Trait defining the interface for an LLM client.
///
/// This allows for different backends (hosted OpenAI-compatible services,
/// local servers, test doubles) to be used interchangeably by the agent.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Sends a chat request to the LLM.
    ///
    /// # Arguments
    /// * `model`: Identifier of the backend model, interpreted by the backend.
    /// * `messages`: The conversation to send.
    async fn chat(&self, model: &str, messages: Vec<LLMMessage>)
        -> Result<LLMResponse, LLMError>;

    fn get_provider_name(&self) -> String;

    /// Sends `prompt` as a single user turn and returns the raw reply text.
    async fn think(&self, model: &str, prompt: &str) -> Result<String, LLMError> {
        let response = self.chat(model, vec![LLMMessage::user(prompt)]).await?;
        response
            .first_content()
            .map(str::to_string)
            .ok_or(LLMError::EmptyResponse)
    }
}
