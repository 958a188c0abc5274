use std::time::Duration;

use reqwest::Client;
use tokio::sync::mpsc;

use super::stream::{classify_status, decode_stream};
use super::types::{ApiRequest, ChatError, ChatRequest, StreamEvent};
use crate::config;

/// Generous upper bound; slow free-tier models can take a while to finish.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const REFERER: &str = "https://github.com/murmur-chat";

/// Client for the chat-completions endpoint. One instance per turn is fine;
/// the underlying reqwest client pools connections.
pub struct ApiClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl ApiClient {
    /// `endpoint` is normally `config::API_URL`; tests point it at a local
    /// stub server.
    pub fn new(api_key: &str, endpoint: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            endpoint: endpoint.to_string(),
        }
    }

    /// Issue a streaming completion request and forward decoder events on
    /// `tx`. Never returns an error: every failure mode becomes a `Failed`
    /// event, and at least one event is always sent.
    pub async fn chat_stream(&self, request: ChatRequest, tx: &mpsc::Sender<StreamEvent>) {
        if request.messages.is_empty() {
            let _ = tx.send(StreamEvent::Failed(ChatError::EmptyMessages)).await;
            return;
        }

        let payload = ApiRequest {
            model: request.model,
            messages: request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: true,
        };

        tracing::debug!(
            model = %payload.model,
            messages = payload.messages.len(),
            "sending completion request"
        );

        let result = self
            .client
            .post(&self.endpoint)
            .timeout(REQUEST_TIMEOUT)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", REFERER)
            .header("X-Title", config::APP_NAME)
            .json(&payload)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let err = if e.is_timeout() {
                    ChatError::Timeout
                } else if e.is_connect() {
                    ChatError::NoConnection
                } else {
                    ChatError::Other(e.to_string())
                };
                let _ = tx.send(StreamEvent::Failed(err)).await;
                return;
            }
        };

        tracing::debug!(status = response.status().as_u16(), "completion response");

        if let Some(err) = classify_status(response.status().as_u16()) {
            let _ = tx.send(StreamEvent::Failed(err)).await;
            return;
        }

        decode_stream(response, tx).await;
    }
}
