//! Public API types re-used by external crates (e.g., the HTTP API layer).

use ai_llm_service::ChatTurn;
use serde::{Deserialize, Serialize};

/// Retrieval and prompt flavour of a conversation.
///
/// Wire names: `general`, `agent`, `code` (reference/command documentation).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    #[default]
    General,
    Agent,
    #[serde(rename = "code", alias = "reference", alias = "command")]
    Reference,
}

impl PromptMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PromptMode::General => "general",
            PromptMode::Agent => "agent",
            PromptMode::Reference => "code",
        }
    }
}

impl std::str::FromStr for PromptMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" => Ok(PromptMode::General),
            "agent" => Ok(PromptMode::Agent),
            "code" | "reference" | "command" => Ok(PromptMode::Reference),
            other => Err(other.to_string()),
        }
    }
}

/// A retrieved document, request-lifetime only.
///
/// `similarity` is a cosine *distance* (lower is closer), possibly lexically
/// adjusted by the retriever.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: String,
    pub name: String,
    pub location: String,
    pub original_location: Option<String>,
    pub kind: String,
    pub similarity: f64,
    pub is_critical: bool,
}

/// Relevance score of `candidates[index]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScoredCandidate {
    pub index: usize,
    pub score: u8,
}

/// One entry of the assembled context handed to the answer model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub content: String,
    pub name: String,
    pub location: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub score: u8,
}

/// A message surrounding the question (e.g. in a group chat), used to
/// enrich the scoring prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub content: String,
    pub author: String,
    #[serde(default)]
    pub is_reply_to: bool,
}

/// One record of the caller-facing answer stream.
///
/// Exactly one record per stream is terminal (`done` or `error`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            done: None,
            error: None,
        }
    }

    pub fn done() -> Self {
        Self {
            content: String::new(),
            done: Some(true),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            done: None,
            error: Some(message.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.done == Some(true) || self.error.is_some()
    }
}

/// One log entry of an on-chain transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLog {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
}

/// A transaction of the agent instance (supplied by the indexer, read-only).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub logs: Vec<TransactionLog>,
}

/// Agent the conversation is about (agent mode only).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentContext {
    /// Scope used to match document ids (lower-cased prefix).
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub transactions: Vec<TransactionRecord>,
}

/// Everything the pipeline needs to answer one question.
#[derive(Clone, Debug, Default)]
pub struct ConversationRequest {
    pub question: String,
    /// Tenant whose documents are searched; part of cache keys.
    pub tenant: String,
    pub mode: PromptMode,
    pub agent: Option<AgentContext>,
    /// Prior chat messages, oldest first.
    pub history: Vec<ChatTurn>,
    /// Surrounding messages used only for relevance scoring.
    pub surrounding: Vec<ConversationTurn>,
    /// Replaces the mode's default system prompt.
    pub system_prompt: Option<String>,
}

impl ConversationRequest {
    pub fn new(question: impl Into<String>, tenant: impl Into<String>, mode: PromptMode) -> Self {
        Self {
            question: question.into(),
            tenant: tenant.into(),
            mode,
            ..Self::default()
        }
    }

    /// Agent scope for retrieval and cache keys (agent mode only).
    pub fn agent_scope(&self) -> Option<&str> {
        if self.mode != PromptMode::Agent {
            return None;
        }
        self.agent
            .as_ref()
            .map(|a| a.id.as_str())
            .filter(|id| !id.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_serialize_without_absent_flags() {
        let text = serde_json::to_string(&StreamChunk::text("Hi")).unwrap();
        assert_eq!(text, r#"{"content":"Hi"}"#);

        let done = serde_json::to_string(&StreamChunk::done()).unwrap();
        assert_eq!(done, r#"{"content":"","done":true}"#);

        let err = StreamChunk::error("Streaming failed");
        assert!(err.is_terminal());
        assert!(!StreamChunk::text("x").is_terminal());
    }

    #[test]
    fn mode_accepts_wire_names() {
        let m: PromptMode = serde_json::from_str(r#""code""#).unwrap();
        assert_eq!(m, PromptMode::Reference);
        let m: PromptMode = serde_json::from_str(r#""reference""#).unwrap();
        assert_eq!(m, PromptMode::Reference);
        assert_eq!("AGENT".parse::<PromptMode>().unwrap(), PromptMode::Agent);
        assert!("trading".parse::<PromptMode>().is_err());
    }

    #[test]
    fn agent_scope_only_in_agent_mode() {
        let mut req = ConversationRequest::new("q", "acme", PromptMode::General);
        req.agent = Some(AgentContext {
            id: "agent-7".into(),
            ..Default::default()
        });
        assert_eq!(req.agent_scope(), None);
        req.mode = PromptMode::Agent;
        assert_eq!(req.agent_scope(), Some("agent-7"));
    }
}
