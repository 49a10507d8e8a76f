//! Chat transcript persistence.

use std::{future::Future, pin::Pin};

use ai_llm_service::ChatRole;
use sqlx::PgPool;
use tracing::trace;
use uuid::Uuid;

pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), sqlx::Error>> + Send + 'a>>;

/// Receives the messages of a chat session.
pub trait TranscriptSink: Send + Sync {
    /// Registers a new session; existing ids are left untouched.
    fn open_session<'a>(&'a self, session_id: Uuid, title: &'a str) -> SinkFuture<'a>;

    fn record<'a>(&'a self, session_id: Uuid, role: ChatRole, content: &'a str) -> SinkFuture<'a>;
}

/// Writes to `chat_sessions(id, session_title)` and
/// `chat_messages(session_id, role, content)`.
#[derive(Clone)]
pub struct PgTranscriptSink {
    pool: PgPool,
}

impl PgTranscriptSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl TranscriptSink for PgTranscriptSink {
    fn open_session<'a>(&'a self, session_id: Uuid, title: &'a str) -> SinkFuture<'a> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO chat_sessions (id, session_title) VALUES ($1, $2) \
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(session_id)
            .bind(title)
            .execute(&self.pool)
            .await?;
            trace!(%session_id, "session opened");
            Ok(())
        })
    }

    fn record<'a>(&'a self, session_id: Uuid, role: ChatRole, content: &'a str) -> SinkFuture<'a> {
        Box::pin(async move {
            sqlx::query("INSERT INTO chat_messages (session_id, role, content) VALUES ($1, $2, $3)")
                .bind(session_id)
                .bind(role.as_str())
                .bind(content)
                .execute(&self.pool)
                .await?;
            trace!(%session_id, role = role.as_str(), "message stored");
            Ok(())
        })
    }
}
