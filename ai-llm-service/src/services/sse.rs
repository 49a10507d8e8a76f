//! Incremental decoder for the `text/event-stream` body of streaming chat
//! completions.
//!
//! Only `data:` lines are meaningful for `/v1/chat/completions`; each one
//! carries a complete JSON chunk, and the literal `[DONE]` ends the stream.

use serde::Deserialize;

use crate::error_handler::AiLlmError;

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Line-oriented SSE decoder that tolerates arbitrary byte splits.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw body bytes and returns every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(bytes);

        let mut out = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim_start();
            if payload == "[DONE]" {
                out.push(SseEvent::Done);
            } else if !payload.is_empty() {
                out.push(SseEvent::Data(payload.to_string()));
            }
        }
        out
    }

    /// Flushes a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        self.pending.push(b'\n');
        self.push(&[])
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    message: Option<String>,
}

/// Extracts the text delta of one `data:` payload.
///
/// Returns `Ok(None)` for role-only or empty deltas.
///
/// # Errors
/// - [`AiLlmError::Stream`] if the payload is not a chunk or carries an `error`
pub fn delta_text(payload: &str) -> Result<Option<String>, AiLlmError> {
    let chunk: StreamChunk = serde_json::from_str(payload)
        .map_err(|e| AiLlmError::Stream(format!("undecodable chunk: {e}")))?;

    if let Some(err) = chunk.error {
        return Err(AiLlmError::Stream(
            err.message.unwrap_or_else(|| "provider reported an error".into()),
        ));
    }

    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.and_then(|d| d.content))
        .collect();

    Ok(if text.is_empty() { None } else { Some(text) })
}
