//! Outbound chat completion payloads

use serde::{Deserialize, Serialize};

/// Terminal reason reported on the last streamed chunk.
pub const FINISH_REASON_STOP: &str = "stop";

/// `data: [DONE]` marker closing an SSE stream.
pub const SSE_DONE: &str = "data: [DONE]\n\n";

/// One `chat.completion.chunk` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    /// A content delta carrying one fragment of text.
    pub fn delta(id: &str, created: i64, model: &str, content: impl Into<String>) -> Self {
        Self::build(
            id,
            created,
            model,
            Delta {
                content: Some(content.into()),
            },
            None,
        )
    }

    /// The final chunk: empty delta, `finish_reason: "stop"`.
    pub fn stop(id: &str, created: i64, model: &str) -> Self {
        Self::build(
            id,
            created,
            model,
            Delta::default(),
            Some(FINISH_REASON_STOP.to_string()),
        )
    }

    fn build(
        id: &str,
        created: i64,
        model: &str,
        delta: Delta,
        finish_reason: Option<String>,
    ) -> Self {
        Self {
            id: id.to_string(),
            object: "chat.completion.chunk".to_string(),
            created,
            model: model.to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }

    /// Render as a single SSE frame: `data: <json>\n\n`.
    pub fn to_sse(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}

/// Non-streaming `chat.completion` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
}

impl ChatCompletion {
    pub fn new(id: impl Into<String>, created: i64, model: impl Into<String>, content: String) -> Self {
        Self {
            id: id.into(),
            object: "chat.completion".to_string(),
            created,
            model: model.into(),
            choices: vec![CompletionChoice {
                index: 0,
                message: AssistantMessage {
                    role: "assistant".to_string(),
                    content,
                },
                finish_reason: Some(FINISH_REASON_STOP.to_string()),
            }],
        }
    }
}

/// OpenAI-style error envelope: `{"error": {"message": ..., "type": ...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ErrorBody {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                kind: kind.into(),
            },
        }
    }
}
