//! POST /conversation: streams a RAG answer as blank-line separated JSON records.

use std::{convert::Infallible, sync::Arc};

use ai_llm_service::ChatRole;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use contextor::StreamChunk;
use futures::{Stream, StreamExt, stream};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    app::{app_state::AppState, transcript::TranscriptSink},
    error_handler::AppResult,
    middleware_layer::json_extractor::JsonBody,
    routes::conversation::conversation_request::ConversationBody,
};

/// First record of every response stream.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    session_id: Uuid,
}

/// Handler: POST /conversation
///
/// # Example
/// ```bash
/// curl -N -X POST http://127.0.0.1:8080/conversation \
///   -H 'content-type: application/json' \
///   -d '{"question":"How do I stake OLAS?","teamId":"olas","type":"general"}'
/// ```
#[instrument(name = "conversation_route", skip_all)]
pub async fn conversation(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<ConversationBody>,
) -> AppResult<Response> {
    let valid = body.validate()?;
    let session = valid.session_id;

    if valid.new_session {
        if let Err(e) = state
            .transcripts
            .open_session(session, &valid.session_title)
            .await
        {
            warn!(%session, error = %e, "failed to open session");
        }
    }
    if let Err(e) = state
        .transcripts
        .record(session, ChatRole::User, &valid.request.question)
        .await
    {
        warn!(%session, error = %e, "failed to store question");
    }

    info!(
        %session,
        tenant = %valid.request.tenant,
        mode = valid.request.mode.as_str(),
        "conversation started"
    );

    let rx = state.contextor.stream(valid.request);
    let body = Body::from_stream(relay(rx, state.transcripts.clone(), session));

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}

struct Relay {
    rx: mpsc::Receiver<StreamChunk>,
    sink: Arc<dyn TranscriptSink>,
    session: Uuid,
    answer: String,
}

impl Relay {
    async fn persist_answer(&self) {
        if self.answer.is_empty() {
            return;
        }
        if let Err(e) = self
            .sink
            .record(self.session, ChatRole::Assistant, &self.answer)
            .await
        {
            warn!(session = %self.session, error = %e, "failed to store answer");
        }
    }
}

/// Session record, then one record per chunk up to and including the
/// terminal one. The full answer is stored before the `done` record goes out.
fn relay(
    rx: mpsc::Receiver<StreamChunk>,
    sink: Arc<dyn TranscriptSink>,
    session: Uuid,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let head = stream::once(async move { Ok(encode_record(&SessionRecord { session_id: session })) });

    let state = Relay {
        rx,
        sink,
        session,
        answer: String::new(),
    };
    let chunks = stream::unfold(Some(state), |state| async move {
        let mut relay = state?;
        let chunk = relay.rx.recv().await?;

        if chunk.is_terminal() {
            if chunk.done == Some(true) {
                relay.persist_answer().await;
            }
            return Some((Ok(encode_record(&chunk)), None));
        }

        relay.answer.push_str(&chunk.content);
        Some((Ok(encode_record(&chunk)), Some(relay)))
    });

    head.chain(chunks)
}

fn encode_record<T: Serialize>(value: &T) -> Bytes {
    match serde_json::to_vec(value) {
        Ok(mut buf) => {
            buf.extend_from_slice(b"\n\n");
            Bytes::from(buf)
        }
        Err(e) => {
            warn!(error = %e, "failed to encode stream record");
            Bytes::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ai_llm_service::{AiLlmError, ChatTurn, CompletionOptions, TextStream};
    use contextor::{
        CompletionService, Contextor, ContextorConfig, MemoryCache, Pacing, ResponseCache,
        llm::LlmFuture,
    };
    use rag_store::{
        DocumentRow, EmbeddingsProvider, MemoryStore, RagError, StoredDocument,
    };

    use super::*;
    use crate::app::transcript::SinkFuture;

    struct FakeLlm;

    impl CompletionService for FakeLlm {
        fn complete<'a>(
            &'a self,
            messages: &'a [ChatTurn],
            _opts: CompletionOptions,
        ) -> LlmFuture<'a, String> {
            let n = messages
                .last()
                .map_or(0, |m| m.content.matches("Rate 0-10:").count());
            Box::pin(async move { Ok(vec!["8"; n].join(",")) })
        }

        fn complete_stream<'a>(
            &'a self,
            _messages: &'a [ChatTurn],
            _opts: CompletionOptions,
        ) -> LlmFuture<'a, TextStream> {
            Box::pin(async {
                let items: Vec<Result<String, AiLlmError>> =
                    vec![Ok("Hello".into()), Ok(" world".into())];
                Ok(Box::pin(stream::iter(items)) as TextStream)
            })
        }
    }

    struct FixedEmbedder;

    impl EmbeddingsProvider for FixedEmbedder {
        fn embed<'a>(
            &'a self,
            _text: &'a str,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<Vec<f32>, RagError>> + Send + 'a>,
        > {
            Box::pin(async { Ok(vec![1.0, 0.0]) })
        }
    }

    #[derive(Default)]
    struct MemoryTranscript {
        sessions: Mutex<Vec<(Uuid, String)>>,
        messages: Mutex<Vec<(Uuid, ChatRole, String)>>,
    }

    impl TranscriptSink for MemoryTranscript {
        fn open_session<'a>(&'a self, session_id: Uuid, title: &'a str) -> SinkFuture<'a> {
            self.sessions
                .lock()
                .unwrap()
                .push((session_id, title.to_string()));
            Box::pin(async { Ok(()) })
        }

        fn record<'a>(
            &'a self,
            session_id: Uuid,
            role: ChatRole,
            content: &'a str,
        ) -> SinkFuture<'a> {
            self.messages
                .lock()
                .unwrap()
                .push((session_id, role, content.to_string()));
            Box::pin(async { Ok(()) })
        }
    }

    async fn state(sink: Arc<MemoryTranscript>) -> Arc<AppState> {
        let store = Arc::new(MemoryStore::new("adev"));
        store
            .insert(StoredDocument {
                tenant: "olas".into(),
                row: DocumentRow {
                    id: "staking".into(),
                    content: "Stake with Pearl".into(),
                    name: "staking".into(),
                    location: "docs/staking".into(),
                    original_location: None,
                    kind: "adev".into(),
                    distance: None,
                },
                embedding: vec![1.0, 0.2],
            })
            .await;

        let cfg = ContextorConfig {
            pacing: Pacing::disabled(),
            ..ContextorConfig::default()
        };
        let contextor = Contextor::new(
            store,
            Arc::new(FixedEmbedder),
            Arc::new(FakeLlm),
            ResponseCache::new(Some(Arc::new(MemoryCache::new())), "test"),
            cfg,
        );
        Arc::new(AppState::new(Arc::new(contextor), sink))
    }

    fn records(bytes: &[u8]) -> Vec<serde_json::Value> {
        std::str::from_utf8(bytes)
            .unwrap()
            .split("\n\n")
            .filter(|r| !r.is_empty())
            .map(|r| serde_json::from_str(r).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn streams_session_chunks_and_done() {
        let sink = Arc::new(MemoryTranscript::default());
        let body: ConversationBody = serde_json::from_str(
            r#"{"question":"How do I stake OLAS?","teamId":"olas","sessionTitle":"Staking"}"#,
        )
        .unwrap();

        let resp = conversation(State(state(sink.clone()).await), JsonBody(body))
            .await
            .unwrap();
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let recs = records(&bytes);

        assert_eq!(recs.len(), 4);
        let session = recs[0]["sessionId"].as_str().unwrap().to_string();
        assert_eq!(recs[1]["content"], "Hello");
        assert_eq!(recs[2]["content"], " world");
        assert_eq!(recs[3]["done"], true);

        let sessions = sink.sessions.lock().unwrap().clone();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].0.to_string(), session);
        assert_eq!(sessions[0].1, "Staking");

        let messages = sink.messages.lock().unwrap().clone();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].1, ChatRole::User);
        assert_eq!(messages[0].2, "How do I stake OLAS?");
        assert_eq!(messages[1].1, ChatRole::Assistant);
        assert_eq!(messages[1].2, "Hello world");
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_before_streaming() {
        let sink = Arc::new(MemoryTranscript::default());
        let body: ConversationBody =
            serde_json::from_str(r#"{"question":"hi","teamId":"olas","type":"price"}"#).unwrap();

        let err = conversation(State(state(sink.clone()).await), JsonBody(body))
            .await
            .unwrap_err();
        assert_eq!(
            err.into_response().status(),
            axum::http::StatusCode::BAD_REQUEST
        );
        assert!(sink.messages.lock().unwrap().is_empty());
    }
}
