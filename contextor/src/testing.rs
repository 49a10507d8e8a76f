//! Test doubles shared by the unit tests of this crate.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use ai_llm_service::{AiLlmError, ChatTurn, CompletionOptions, TextStream};
use futures::stream;
use rag_store::{EmbeddingsProvider, RagError};

use crate::{
    api_types::Candidate,
    llm::{CompletionService, LlmFuture},
};

/// Completion service replaying queued replies and streams.
///
/// With an empty reply queue every context of a scoring prompt gets 7; with an
/// empty stream queue the answer is `["Hello", " world"]`.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, AiLlmError>>>,
    streams: Mutex<VecDeque<Result<TextStream, AiLlmError>>>,
    pub complete_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: &str) {
        self.replies.lock().unwrap().push_back(Ok(reply.to_string()));
    }

    pub fn push_stream(&self, s: TextStream) {
        self.streams.lock().unwrap().push_back(Ok(s));
    }

    pub fn push_stream_chunks(&self, chunks: &[&str]) {
        let items: Vec<Result<String, AiLlmError>> =
            chunks.iter().map(|c| Ok(c.to_string())).collect();
        self.push_stream(Box::pin(stream::iter(items)));
    }

    pub fn push_stream_error(&self, e: AiLlmError) {
        self.streams.lock().unwrap().push_back(Err(e));
    }
}

impl CompletionService for ScriptedLlm {
    fn complete<'a>(
        &'a self,
        messages: &'a [ChatTurn],
        _opts: CompletionOptions,
    ) -> LlmFuture<'a, String> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().unwrap().pop_front();
        Box::pin(async move {
            match next {
                Some(r) => r,
                None => {
                    let n = messages
                        .last()
                        .map_or(0, |m| m.content.matches("Rate 0-10:").count());
                    Ok(vec!["7"; n].join(","))
                }
            }
        })
    }

    fn complete_stream<'a>(
        &'a self,
        _messages: &'a [ChatTurn],
        _opts: CompletionOptions,
    ) -> LlmFuture<'a, TextStream> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.streams.lock().unwrap().pop_front();
        Box::pin(async move {
            match next {
                Some(s) => s,
                None => {
                    let items: Vec<Result<String, AiLlmError>> =
                        vec![Ok("Hello".to_string()), Ok(" world".to_string())];
                    Ok(Box::pin(stream::iter(items)) as TextStream)
                }
            }
        })
    }
}

/// Embedder returning the same vector for every text.
pub struct FixedEmbedder {
    pub vector: Vec<f32>,
    pub calls: AtomicUsize,
    pub failures_left: AtomicUsize,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            calls: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
        }
    }
}

impl EmbeddingsProvider for FixedEmbedder {
    fn embed<'a>(
        &'a self,
        _text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, RagError>> + Send + 'a>>
    {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(RagError::Embedding("scripted failure".into()));
            }
            Ok(self.vector.clone())
        })
    }
}

pub fn candidate(name: &str, is_critical: bool) -> Candidate {
    Candidate {
        content: format!("content of {name}"),
        name: name.into(),
        location: format!("docs/{name}"),
        original_location: None,
        kind: "adev".into(),
        similarity: if is_critical { 0.0 } else { 0.5 },
        is_critical,
    }
}
