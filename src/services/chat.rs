use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::api::types::ApiMessage;
use crate::api::{ApiClient, ChatError, ChatRequest, StreamEvent};
use crate::config;
use crate::models::{Message, Role};
use crate::services::database::Database;
use crate::services::settings::Settings;

/// Progressive snapshots of one turn, delivered to the front-end over a
/// channel so only one thread ever touches display state.
#[derive(Debug)]
pub enum TurnUpdate {
    /// Full text accumulated so far.
    Delta { accumulated: String },
    /// The persisted assistant message.
    Completed { message: Message },
    /// The turn failed; `partial` holds whatever text streamed in before
    /// the failure. Shown to the user, never persisted.
    Failed { error: ChatError, partial: String },
}

/// Drives one request/response turn end-to-end: persist the user message,
/// build the prompt, stream the completion, persist the assistant reply.
/// At most one turn is in flight per instance.
pub struct ChatService {
    db: Database,
    endpoint: String,
    in_flight: Arc<AtomicBool>,
}

/// Releases the single-flight guard when the worker exits, on any path.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ChatService {
    pub fn new(db: Database) -> Self {
        Self::with_endpoint(db, config::API_URL)
    }

    pub fn with_endpoint(db: Database, endpoint: &str) -> Self {
        Self {
            db,
            endpoint: endpoint.to_string(),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Start a turn. Returns the update channel, or fails fast without any
    /// persistence or I/O: `Busy` while a previous turn is still running,
    /// `MissingApiKey` when no credential is configured (the front-end is
    /// expected to surface that one distinctly, not inline).
    pub fn send_message(
        &self,
        chat_id: i64,
        text: String,
        settings: Settings,
    ) -> Result<mpsc::Receiver<TurnUpdate>, ChatError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(ChatError::Busy);
        }
        let guard = InFlightGuard(self.in_flight.clone());

        if settings.api_key.trim().is_empty() {
            return Err(ChatError::MissingApiKey);
        }

        let (tx, rx) = mpsc::channel(64);
        let db = self.db.clone();
        let endpoint = self.endpoint.clone();

        tokio::spawn(async move {
            let _guard = guard;
            run_turn(db, endpoint, chat_id, text, settings, tx).await;
        });

        Ok(rx)
    }
}

async fn run_turn(
    db: Database,
    endpoint: String,
    chat_id: i64,
    text: String,
    settings: Settings,
    tx: mpsc::Sender<TurnUpdate>,
) {
    // The user message is persisted before the request goes out, so it
    // survives whatever happens to the turn.
    if let Err(e) = db.add_message(chat_id, Role::User, &text).await {
        tracing::error!("failed to persist user message: {}", e);
        let _ = tx
            .send(TurnUpdate::Failed {
                error: ChatError::Other(e.to_string()),
                partial: String::new(),
            })
            .await;
        return;
    }

    let history = match db.list_messages(chat_id).await {
        Ok(history) => history,
        Err(e) => {
            let _ = tx
                .send(TurnUpdate::Failed {
                    error: ChatError::Other(e.to_string()),
                    partial: String::new(),
                })
                .await;
            return;
        }
    };

    // First message names the chat
    if history.len() == 1 {
        if let Err(e) = db.update_chat_title(chat_id, &truncate_title(&text)).await {
            tracing::warn!("failed to auto-title chat: {}", e);
        }
    }

    let chat = match db.get_chat(chat_id).await {
        Ok(chat) => chat,
        Err(e) => {
            tracing::warn!("failed to load chat {}: {}", chat_id, e);
            None
        }
    };

    // Per-chat system prompt wins over the global default
    let mut system_prompt = settings.system_prompt.clone();
    if let Some(prompt) = chat.as_ref().and_then(|c| c.system_prompt.as_deref()) {
        if !prompt.is_empty() {
            system_prompt = prompt.to_string();
        }
    }

    let mut messages = Vec::with_capacity(history.len() + 1);
    if !system_prompt.is_empty() {
        messages.push(ApiMessage {
            role: Role::System,
            content: system_prompt,
        });
    }
    messages.extend(history.iter().map(|m| ApiMessage {
        role: m.role,
        content: m.content.clone(),
    }));

    let model = chat
        .map(|c| c.model)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| settings.model.clone());

    let request = ChatRequest {
        model,
        messages,
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
    };

    let client = ApiClient::new(&settings.api_key, &endpoint);
    let (event_tx, mut event_rx) = mpsc::channel::<StreamEvent>(64);

    let _stream_handle = tokio::spawn(async move {
        client.chat_stream(request, &event_tx).await;
    });

    let mut accumulated = String::new();

    loop {
        match event_rx.recv().await {
            Some(StreamEvent::Token(token)) => {
                accumulated.push_str(&token);
                let _ = tx
                    .send(TurnUpdate::Delta {
                        accumulated: accumulated.clone(),
                    })
                    .await;
            }
            Some(StreamEvent::Done) => {
                match db.add_message(chat_id, Role::Assistant, &accumulated).await {
                    Ok(message) => {
                        let _ = tx.send(TurnUpdate::Completed { message }).await;
                    }
                    Err(e) => {
                        tracing::error!("failed to persist assistant message: {}", e);
                        let _ = tx
                            .send(TurnUpdate::Failed {
                                error: ChatError::Other(e.to_string()),
                                partial: accumulated,
                            })
                            .await;
                    }
                }
                return;
            }
            Some(StreamEvent::Failed(error)) => {
                let _ = tx
                    .send(TurnUpdate::Failed {
                        error,
                        partial: accumulated,
                    })
                    .await;
                return;
            }
            None => {
                // The client contract says a terminal event always arrives;
                // don't leave the caller hanging if it somehow doesn't.
                let _ = tx
                    .send(TurnUpdate::Failed {
                        error: ChatError::Other("Stream ended unexpectedly".to_string()),
                        partial: accumulated,
                    })
                    .await;
                return;
            }
        }
    }
}

/// Shorten a first message into a chat title.
pub fn truncate_title(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or(text);
    if first_line.chars().count() > 40 {
        let truncated: String = first_line.chars().take(40).collect();
        format!("{}...", truncated.trim_end())
    } else {
        first_line.to_string()
    }
}
