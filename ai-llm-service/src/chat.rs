//! Provider-neutral chat types shared by every profile.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error_handler::AiLlmError;

/// Role of a single chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One message of a chat transcript.
///
/// # Example
/// ```
/// use ai_llm_service::{ChatRole, ChatTurn};
/// let t = ChatTurn::user("How do I stake OLAS?");
/// assert_eq!(t.role, ChatRole::User);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call overrides for a completion request.
///
/// `None` fields fall back to the profile's [`LlmModelConfig`](crate::config::llm_model_config::LlmModelConfig).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompletionOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Stream of text deltas produced by a streaming completion.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, AiLlmError>> + Send>>;
