//! Chat completion request types and validation

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of a chat participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Developer,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Developer => "developer",
            Role::Tool => "tool",
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Either a plain string or a list of typed content parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Textual representation of the content.
    ///
    /// Text parts are concatenated in order; image parts become an inline
    /// `[image:<url>]` marker since the upstream only accepts text.
    pub fn to_plaintext(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts.iter().map(ContentPart::to_plaintext).collect(),
        }
    }
}

/// A single part of multi-part message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn to_plaintext(&self) -> String {
        match self {
            ContentPart::Text { text } => text.clone(),
            ContentPart::ImageUrl { image_url } => format!("[image:{}]", image_url.url()),
        }
    }
}

/// OpenAI clients send image URLs either bare or wrapped in `{"url": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageUrl {
    Url(String),
    Object { url: String },
}

impl ImageUrl {
    pub fn url(&self) -> &str {
        match self {
            ImageUrl::Url(url) => url,
            ImageUrl::Object { url } => url,
        }
    }
}

/// Requested output format. Accepted for compatibility; the upstream has no
/// equivalent field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: ResponseFormatType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormatType {
    JsonObject,
    JsonSchema,
    Text,
}

/// Request body for `/v1/chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            system: None,
            temperature: None,
            response_format: None,
        }
    }
}

/// Rejection produced by [`validate_request`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid request: {message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Parse and validate a raw request body into a [`ChatRequest`].
///
/// Shape errors (missing fields, unknown roles, wrong types) come from serde;
/// semantic checks are applied afterwards. Unknown top-level fields are
/// tolerated since OpenAI clients routinely send extras like `max_tokens`.
pub fn validate_request(body: &[u8]) -> Result<ChatRequest, ValidationError> {
    let request: ChatRequest =
        serde_json::from_slice(body).map_err(|e| ValidationError::new(e.to_string()))?;

    if request.model.trim().is_empty() {
        return Err(ValidationError::new("\"model\" is not allowed to be empty"));
    }

    Ok(request)
}
