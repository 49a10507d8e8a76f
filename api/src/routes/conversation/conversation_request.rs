use ai_llm_service::ChatTurn;
use contextor::{
    AgentContext, ConversationRequest, ConversationTurn, PromptMode, TransactionRecord,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error_handler::{AppError, AppResult};

/// Request payload for `POST /conversation`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationBody {
    /// The user's question (required).
    #[serde(default)]
    pub question: Option<String>,
    /// Prior chat messages, oldest first.
    #[serde(default)]
    pub messages: Vec<ChatTurn>,
    /// Tenant whose documents are searched (required).
    #[serde(default)]
    pub team_id: Option<String>,
    /// `general` (default), `agent` or `code`.
    #[serde(default, rename = "type")]
    pub mode: Option<String>,
    /// Agent instance id; lower-cased.
    #[serde(default)]
    pub instance: Option<String>,
    /// Continue an existing session; a new one is created when absent.
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub session_title: Option<String>,
    /// Agent details for `agent` mode.
    #[serde(default)]
    pub agent: Option<AgentDetails>,
    /// Messages around the question, used for relevance scoring.
    #[serde(default)]
    pub surrounding: Vec<ConversationTurn>,
    /// Replaces the mode's default system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AgentDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub transactions: Vec<TransactionRecord>,
}

/// A validated conversation request plus its session.
#[derive(Debug)]
pub struct ValidConversation {
    pub session_id: Uuid,
    /// `true` when the session id was generated for this request.
    pub new_session: bool,
    pub session_title: String,
    pub request: ConversationRequest,
}

impl ConversationBody {
    pub fn validate(self) -> AppResult<ValidConversation> {
        let question = self
            .question
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AppError::validation("question", "question is required."))?;

        let tenant = self
            .team_id
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::validation("teamId", "teamId is required."))?;

        let mode = match self.mode.as_deref() {
            None => PromptMode::General,
            Some(raw) => raw.parse::<PromptMode>().map_err(|_| {
                AppError::validation(
                    "type",
                    "Invalid type. Must be one of 'general', 'agent' or 'code'.",
                )
            })?,
        };

        let instance = self
            .instance
            .map(|i| i.trim().to_lowercase())
            .filter(|i| !i.is_empty());
        let agent = instance.map(|id| {
            let details = self.agent.unwrap_or_default();
            AgentContext {
                id,
                name: details.name,
                description: details.description,
                transactions: details.transactions,
            }
        });

        let (session_id, new_session) = match self.session_id {
            Some(id) => (id, false),
            None => (Uuid::new_v4(), true),
        };
        let session_title = self
            .session_title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("Chat started at {}", chrono::Utc::now().to_rfc3339()));

        let mut request = ConversationRequest::new(question, tenant, mode);
        request.agent = agent;
        request.history = self.messages;
        request.surrounding = self.surrounding;
        request.system_prompt = self.system_prompt;

        Ok(ValidConversation {
            session_id,
            new_session,
            session_title,
            request,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: &str) -> ConversationBody {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn question_and_team_are_required() {
        let err = body(r#"{"teamId":"acme"}"#).validate().unwrap_err();
        assert!(matches!(err, AppError::Validation { path: Some("question"), .. }));

        let err = body(r#"{"question":"  ","teamId":"acme"}"#).validate().unwrap_err();
        assert!(matches!(err, AppError::Validation { path: Some("question"), .. }));

        let err = body(r#"{"question":"hi"}"#).validate().unwrap_err();
        assert!(matches!(err, AppError::Validation { path: Some("teamId"), .. }));
    }

    #[test]
    fn mode_must_be_known() {
        let err = body(r#"{"question":"hi","teamId":"acme","type":"trading"}"#)
            .validate()
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { path: Some("type"), .. }));

        let ok = body(r#"{"question":"hi","teamId":"acme","type":"code"}"#)
            .validate()
            .unwrap();
        assert_eq!(ok.request.mode, PromptMode::Reference);
        assert!(ok.new_session);
        assert!(ok.session_title.starts_with("Chat started at "));
    }

    #[test]
    fn instance_is_lowercased_into_agent_scope() {
        let ok = body(
            r#"{"question":"What is it doing?","teamId":"acme","type":"agent",
                "instance":" Trader-ABC ","sessionId":"67e55044-10b1-426f-9247-bb680e5fe0c8",
                "agent":{"name":"Trader","transactions":[{"to":"0x1"}]},
                "messages":[{"role":"user","content":"hi"}]}"#,
        )
        .validate()
        .unwrap();

        assert_eq!(ok.request.agent_scope(), Some("trader-abc"));
        let agent = ok.request.agent.as_ref().unwrap();
        assert_eq!(agent.name.as_deref(), Some("Trader"));
        assert_eq!(agent.transactions.len(), 1);
        assert_eq!(ok.request.history, vec![ChatTurn::user("hi")]);
        assert!(!ok.new_session);
        assert_eq!(
            ok.session_id.to_string(),
            "67e55044-10b1-426f-9247-bb680e5fe0c8"
        );
    }
}
