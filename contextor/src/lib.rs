//! Retrieval-augmented answers for support chat.
//!
//! [`Contextor`] bundles the document store, the embedder, the completion
//! service and the response cache. [`Contextor::find_context`] runs
//! retrieval, relevance scoring and context assembly;
//! [`Contextor::stream`] additionally streams a paced answer over a channel.

pub mod api_types;
pub mod cache;
pub mod cfg;
pub mod chunk;
pub mod error;
pub mod generate;
pub mod llm;
pub mod prompt;
pub mod retrieve;
pub mod retry;
pub mod score;
pub mod select;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use rag_store::{DocumentStore, EmbeddingsProvider};
use tokio::sync::mpsc;
use tracing::debug;

pub use api_types::{
    AgentContext, Candidate, ContextItem, ConversationRequest, ConversationTurn, PromptMode,
    ScoredCandidate, StreamChunk, TransactionLog, TransactionRecord,
};
pub use cache::{CacheStore, MemoryCache, RedisCache, ResponseCache};
pub use cfg::{ContextorConfig, Pacing};
pub use error::{CacheError, ContextorError, GENERATE_FAILED, STREAMING_FAILED, ScoreError};
pub use generate::Outcome;
pub use llm::CompletionService;
pub use retry::{Backoff, RetryExhausted, RetryPolicy};

use cache::{CacheNamespace, cache_key};
use retrieve::RetrieveRequest;

/// The answer pipeline. Cheap to share behind an `Arc`.
#[derive(Clone)]
pub struct Contextor {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingsProvider>,
    llm: Arc<dyn CompletionService>,
    cache: ResponseCache,
    cfg: ContextorConfig,
}

impl Contextor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingsProvider>,
        llm: Arc<dyn CompletionService>,
        cache: ResponseCache,
        cfg: ContextorConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            llm,
            cache,
            cfg,
        }
    }

    pub fn config(&self) -> &ContextorConfig {
        &self.cfg
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub(crate) fn llm(&self) -> &dyn CompletionService {
        self.llm.as_ref()
    }

    /// Assembled context for `req`, served from the `relevantContext` cache
    /// when present.
    ///
    /// # Errors
    /// Embedding, retrieval and scoring failures (after their retries).
    pub async fn find_context(
        &self,
        req: &ConversationRequest,
    ) -> Result<Vec<ContextItem>, ContextorError> {
        let key = cache_key(
            CacheNamespace::RelevantContext,
            self.cache.deployment(),
            &req.tenant,
            req.mode,
            req.agent_scope(),
            &req.question,
        );
        if let Some(hit) = self.cache.get_json::<Vec<ContextItem>>(&key).await {
            debug!("find_context: cache hit n={}", hit.len());
            return Ok(hit);
        }

        let embedder = self.embedder.as_ref();
        let question = req.question.as_str();
        let embedding = retry::execute(&self.cfg.embed_retry, "embed_question", move || {
            embedder.embed(question)
        })
        .await
        .map_err(ContextorError::Embedding)?;

        let hints = req
            .agent
            .as_ref()
            .map(|a| retrieve::address_hints(&a.transactions))
            .unwrap_or_default();
        let candidates = retrieve::retrieve(
            self.store.as_ref(),
            &self.cache,
            &self.cfg,
            &RetrieveRequest {
                embedding: &embedding,
                tenant: &req.tenant,
                question,
                mode: req.mode,
                agent_scope: req.agent_scope(),
                address_hints: &hints,
            },
        )
        .await?;

        let scored = score::score(
            self.llm.as_ref(),
            &candidates,
            question,
            &req.surrounding,
            self.cfg.score_batch,
            &self.cfg.score_retry,
        )
        .await?;

        let items = select::assemble(
            self.store.as_ref(),
            &req.tenant,
            &candidates,
            &scored,
            self.cfg.context_k,
            self.cfg.score_floor,
        )
        .await;

        self.cache.set_json(&key, &items, self.cfg.context_ttl).await;
        Ok(items)
    }

    /// Streams the answer to `req`; the receiver yields exactly one terminal
    /// chunk (`done` or `error`) unless it is dropped first.
    pub fn stream(self: &Arc<Self>, req: ConversationRequest) -> mpsc::Receiver<StreamChunk> {
        generate::spawn_conversation(Arc::clone(self), req)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use rag_store::{DocumentRow, MemoryStore, StoredDocument};

    use super::*;
    use crate::testing::{FixedEmbedder, ScriptedLlm};

    fn doc(id: &str, content: &str) -> StoredDocument {
        StoredDocument {
            tenant: "acme".into(),
            row: DocumentRow {
                id: id.into(),
                content: content.into(),
                name: id.into(),
                location: format!("docs/{id}"),
                original_location: None,
                kind: "adev".into(),
                distance: None,
            },
            embedding: vec![1.0, 0.1],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn find_context_caches_the_assembly() {
        let store = Arc::new(MemoryStore::new("adev"));
        store.insert(doc("staking", "Stake with Pearl")).await;
        let embedder = Arc::new(FixedEmbedder::new(vec![1.0, 0.0]));
        let llm = Arc::new(ScriptedLlm::new());

        let pipeline = Contextor::new(
            store,
            embedder.clone(),
            llm.clone(),
            ResponseCache::new(Some(Arc::new(MemoryCache::new())), "prod"),
            ContextorConfig::default(),
        );

        let req = ConversationRequest::new("How do I stake OLAS?", "acme", PromptMode::General);
        let first = pipeline.find_context(&req).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].score, 7);

        let second = pipeline.find_context(&req).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(llm.complete_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn embedding_is_retried() {
        let embedder = Arc::new(FixedEmbedder::new(vec![1.0, 0.0]));
        embedder.failures_left.store(2, Ordering::SeqCst);

        let pipeline = Contextor::new(
            Arc::new(MemoryStore::new("adev")),
            embedder.clone(),
            Arc::new(ScriptedLlm::new()),
            ResponseCache::disabled("local"),
            ContextorConfig::default(),
        );

        let req = ConversationRequest::new("q", "acme", PromptMode::General);
        let out = pipeline.find_context(&req).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }
}
