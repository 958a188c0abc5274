use futures::StreamExt;
use tokio::sync::mpsc;

use super::types::{ChatError, StreamChunk, StreamEvent};

/// Map a non-success HTTP status to the error shown for it. `None` means the
/// body should be decoded as a stream.
pub fn classify_status(status: u16) -> Option<ChatError> {
    match status {
        401 => Some(ChatError::InvalidApiKey),
        403 => Some(ChatError::ModelUnavailable),
        404 => Some(ChatError::ModelNotFound),
        429 => Some(ChatError::RateLimited),
        s if s >= 400 => Some(ChatError::Server(s)),
        _ => None,
    }
}

/// Incremental decoder for the `data:`-prefixed event stream.
///
/// Fed raw response bytes, it buffers partial UTF-8 sequences and partial
/// lines across feeds and pushes `StreamEvent`s as complete payload lines
/// become available. After the terminal event (sentinel, embedded error, or
/// `finish`) all further input is ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    byte_buf: Vec<u8>,
    line_buf: String,
    saw_content: bool,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8], out: &mut Vec<StreamEvent>) {
        if self.finished {
            return;
        }

        self.byte_buf.extend_from_slice(bytes);

        // Decode as much valid UTF-8 as possible from the byte buffer
        let decoded = match std::str::from_utf8(&self.byte_buf) {
            Ok(s) => {
                let decoded = s.to_string();
                self.byte_buf.clear();
                decoded
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                if valid_up_to == 0 {
                    return;
                }
                let decoded = std::str::from_utf8(&self.byte_buf[..valid_up_to])
                    .unwrap()
                    .to_string();
                self.byte_buf.drain(..valid_up_to);
                decoded
            }
        };

        self.line_buf.push_str(&decoded.replace("\r\n", "\n"));

        while let Some(newline) = self.line_buf.find('\n') {
            let line = self.line_buf[..newline].to_string();
            self.line_buf.drain(..newline + 1);
            self.handle_line(&line, out);
            if self.finished {
                return;
            }
        }
    }

    /// Signal end of the underlying byte stream. Returns the terminal event
    /// if none has been produced yet.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(self.terminal_event())
    }

    fn terminal_event(&self) -> StreamEvent {
        if self.saw_content {
            StreamEvent::Done
        } else {
            StreamEvent::Failed(ChatError::EmptyResponse)
        }
    }

    fn handle_line(&mut self, line: &str, out: &mut Vec<StreamEvent>) {
        let payload = if let Some(p) = line.strip_prefix("data: ") {
            p
        } else if let Some(p) = line.strip_prefix("data:") {
            p
        } else {
            return;
        };

        if payload.trim() == "[DONE]" {
            self.finished = true;
            out.push(self.terminal_event());
            return;
        }

        let chunk = match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                // Malformed lines are skipped, never fatal
                tracing::warn!("skipping malformed stream line: {}", e);
                return;
            }
        };

        if let Some(err) = chunk.error {
            let message = err.message.unwrap_or_else(|| "Unknown error".to_string());
            self.finished = true;
            out.push(StreamEvent::Failed(ChatError::Upstream(message)));
            return;
        }

        if let Some(choice) = chunk.choices.first() {
            if let Some(content) = &choice.delta.content {
                if !content.is_empty() {
                    if !content.trim().is_empty() {
                        self.saw_content = true;
                    }
                    out.push(StreamEvent::Token(content.clone()));
                }
            }
        }
    }
}

/// Drive the decoder over a live response body, forwarding events on `tx`.
/// Stops reading as soon as a terminal event is sent; transport failures
/// mid-stream become `Failed` events rather than errors.
pub async fn decode_stream(response: reqwest::Response, tx: &mpsc::Sender<StreamEvent>) {
    let mut stream = response.bytes_stream();
    let mut decoder = SseDecoder::new();
    let mut events = Vec::new();

    while let Some(chunk_result) = stream.next().await {
        let bytes = match chunk_result {
            Ok(b) => b,
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

        decoder.feed(&bytes, &mut events);
        for event in events.drain(..) {
            let terminal = !matches!(event, StreamEvent::Token(_));
            if tx.send(event).await.is_err() {
                return; // receiver dropped
            }
            if terminal {
                return;
            }
        }
    }

    if let Some(event) = decoder.finish() {
        let _ = tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(inputs: &[&str], end_of_stream: bool) -> Vec<StreamEvent> {
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for input in inputs {
            decoder.feed(input.as_bytes(), &mut events);
        }
        if end_of_stream {
            if let Some(event) = decoder.finish() {
                events.push(event);
            }
        }
        events
    }

    #[test]
    fn concatenates_deltas_until_sentinel() {
        let events = collect(
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n",
                "data: [DONE]\n",
            ],
            false,
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::Token("Hel".to_string()),
                StreamEvent::Token("lo".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[test]
    fn payload_split_across_feeds() {
        let events = collect(
            &[
                "data: {\"choices\":[{\"delta\":",
                "{\"content\":\"hi\"}}]}\ndata: [DONE]\n",
            ],
            false,
        );
        assert_eq!(
            events,
            vec![StreamEvent::Token("hi".to_string()), StreamEvent::Done]
        );
    }

    #[test]
    fn partial_utf8_is_buffered() {
        // "é" is 0xC3 0xA9; split it between feeds
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"é\"}}]}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;
        decoder.feed(&line[..split], &mut events);
        decoder.feed(&line[split..], &mut events);
        assert_eq!(events, vec![StreamEvent::Token("é".to_string())]);
    }

    #[test]
    fn malformed_line_is_skipped() {
        let events = collect(
            &[
                "data: {not json}\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
                "data: [DONE]\n",
            ],
            false,
        );
        assert_eq!(
            events,
            vec![StreamEvent::Token("ok".to_string()), StreamEvent::Done]
        );
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let events = collect(
            &[
                ": keep-alive\n",
                "event: message\n",
                "\n",
                "data:{\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n",
                "data: [DONE]\n",
            ],
            false,
        );
        assert_eq!(
            events,
            vec![StreamEvent::Token("x".to_string()), StreamEvent::Done]
        );
    }

    #[test]
    fn embedded_error_is_terminal() {
        let events = collect(
            &[
                "data: {\"error\":{\"message\":\"boom\"}}\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
            ],
            true,
        );
        assert_eq!(
            events,
            vec![StreamEvent::Failed(ChatError::Upstream("boom".to_string()))]
        );
    }

    #[test]
    fn error_without_message_gets_fallback() {
        let events = collect(&["data: {\"error\":{}}\n"], false);
        assert_eq!(
            events,
            vec![StreamEvent::Failed(ChatError::Upstream(
                "Unknown error".to_string()
            ))]
        );
    }

    #[test]
    fn empty_stream_reports_empty_response() {
        let events = collect(&[], true);
        assert_eq!(events, vec![StreamEvent::Failed(ChatError::EmptyResponse)]);
    }

    #[test]
    fn sentinel_without_content_reports_empty_response() {
        let events = collect(&["data: [DONE]\n"], false);
        assert_eq!(events, vec![StreamEvent::Failed(ChatError::EmptyResponse)]);
    }

    #[test]
    fn whitespace_only_content_counts_as_empty() {
        let events = collect(
            &[
                "data: {\"choices\":[{\"delta\":{\"content\":\"  \"}}]}\n",
                "data: [DONE]\n",
            ],
            false,
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::Token("  ".to_string()),
                StreamEvent::Failed(ChatError::EmptyResponse),
            ]
        );
    }

    #[test]
    fn input_after_sentinel_is_ignored() {
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        decoder.feed(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\ndata: [DONE]\n",
            &mut events,
        );
        decoder.feed(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
            &mut events,
        );
        assert!(decoder.finish().is_none());
        assert_eq!(
            events,
            vec![StreamEvent::Token("a".to_string()), StreamEvent::Done]
        );
    }

    #[test]
    fn crlf_lines_are_normalized() {
        let events = collect(
            &["data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\r\ndata: [DONE]\r\n"],
            false,
        );
        assert_eq!(
            events,
            vec![StreamEvent::Token("ok".to_string()), StreamEvent::Done]
        );
    }

    #[test]
    fn missing_delta_content_yields_no_token() {
        let events = collect(
            &[
                "data: {\"choices\":[{\"delta\":{}}]}\n",
                "data: {\"choices\":[]}\n",
                "data: [DONE]\n",
            ],
            false,
        );
        assert_eq!(events, vec![StreamEvent::Failed(ChatError::EmptyResponse)]);
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(401), Some(ChatError::InvalidApiKey));
        assert_eq!(classify_status(403), Some(ChatError::ModelUnavailable));
        assert_eq!(classify_status(404), Some(ChatError::ModelNotFound));
        assert_eq!(classify_status(429), Some(ChatError::RateLimited));
        assert_eq!(classify_status(500), Some(ChatError::Server(500)));
        assert_eq!(classify_status(418), Some(ChatError::Server(418)));
        assert_eq!(classify_status(200), None);
    }
}
