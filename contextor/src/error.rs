//! Typed errors for the contextor crate.

use ai_llm_service::AiLlmError;
use rag_store::RagError;
use thiserror::Error;

use crate::retry::RetryExhausted;

/// Shown to the caller when the pipeline fails before the answer stream opened.
pub const GENERATE_FAILED: &str = "Failed to generate response";
/// Shown to the caller when the answer stream could not be opened or broke off.
pub const STREAMING_FAILED: &str = "Streaming failed";

#[derive(Debug, Error)]
pub enum ContextorError {
    /// Document store failure (agent mode falls back to the general query first).
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RagError),

    /// Question embedding failed on every attempt.
    #[error("embedding failed: {0}")]
    Embedding(#[source] RetryExhausted<RagError>),

    /// Relevance scoring failed on every attempt (`ScoringFailure`).
    #[error("scoring failed: {0}")]
    Scoring(#[from] RetryExhausted<ScoreError>),

    /// The completion stream could not be opened.
    #[error("completion stream could not be opened: {0}")]
    StreamOpen(#[from] RetryExhausted<AiLlmError>),

    /// The completion stream broke off after it started.
    #[error("completion stream failed: {0}")]
    Stream(#[from] AiLlmError),

    /// Invalid runtime configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl ContextorError {
    /// Text placed in the terminal error chunk.
    pub fn user_message(&self) -> &'static str {
        match self {
            ContextorError::StreamOpen(_) | ContextorError::Stream(_) => STREAMING_FAILED,
            _ => GENERATE_FAILED,
        }
    }
}

/// Failure of one scoring batch.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("completion failed: {0}")]
    Completion(#[from] AiLlmError),

    /// The reply did not contain exactly one 0..=10 integer per context.
    #[error("expected {expected} scores, got {got} in reply {reply:?}")]
    Malformed {
        expected: usize,
        got: usize,
        reply: String,
    },
}

/// Cache-layer failure. Always absorbed by callers (logged, treated as a miss).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("cache payload error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_depend_on_stage() {
        let scoring = ContextorError::Scoring(RetryExhausted {
            attempts: 4,
            last: ScoreError::Malformed {
                expected: 5,
                got: 3,
                reply: "1,2,3".into(),
            },
        });
        assert_eq!(scoring.user_message(), GENERATE_FAILED);

        let stream = ContextorError::Stream(AiLlmError::Stream("reset".into()));
        assert_eq!(stream.user_message(), STREAMING_FAILED);
    }
}
