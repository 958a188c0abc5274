use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Role;

/// Everything that can go wrong during a turn. `Display` renders the
/// user-facing text shown in the transcript (or, for `MissingApiKey` and
/// `Busy`, surfaced by the front-end before any I/O happens).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChatError {
    #[error("No API key configured. Add one in settings.")]
    MissingApiKey,

    #[error("A response is already being generated")]
    Busy,

    #[error("Empty message list")]
    EmptyMessages,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("This model is unavailable")]
    ModelUnavailable,

    #[error("Model not found. Pick another one in settings.")]
    ModelNotFound,

    #[error("Rate limited. Wait a minute and try again.")]
    RateLimited,

    #[error("Server error: {0}")]
    Server(u16),

    #[error("Request timed out")]
    Timeout,

    #[error("No internet connection")]
    NoConnection,

    #[error("{0}")]
    Upstream(String),

    #[error("The model returned no response")]
    EmptyResponse,

    #[error("{0}")]
    Other(String),
}

/// One request/response turn worth of input for the API client.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ApiMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

// --- Wire types ---

#[derive(Debug, Serialize)]
pub struct ApiRequest {
    pub model: String,
    pub messages: Vec<ApiMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: Role,
    pub content: String,
}

/// One `data:` payload. The server sends either a delta chunk or an
/// embedded error object; both are folded into a single shape here.
#[derive(Debug, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    pub error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct StreamChoice {
    pub delta: Delta,
}

#[derive(Debug, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub message: Option<String>,
}

// --- Decoder output ---

/// Events produced by the stream decoder. Exactly one terminal event
/// (`Done` or `Failed`) is emitted per stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Token(String),
    Done,
    Failed(ChatError),
}
