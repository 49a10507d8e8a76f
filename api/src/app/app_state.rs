use std::sync::Arc;

use ai_llm_service::{AiLlmError, LlmServiceProfiles};
use contextor::{Contextor, ContextorConfig, MemoryCache, RedisCache, ResponseCache};
use rag_store::{LlmEmbedder, RagConfig, RagError, RagStore};
use thiserror::Error;
use tracing::{info, warn};

use crate::app::transcript::{PgTranscriptSink, TranscriptSink};

/// Startup configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Llm(#[from] AiLlmError),

    #[error(transparent)]
    Store(#[from] RagError),
}

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Answer pipeline.
    pub contextor: Arc<Contextor>,
    /// Chat transcript persistence.
    pub transcripts: Arc<dyn TranscriptSink>,
}

impl AppState {
    pub fn new(contextor: Arc<Contextor>, transcripts: Arc<dyn TranscriptSink>) -> Self {
        Self {
            contextor,
            transcripts,
        }
    }

    /// Load shared state from environment variables.
    ///
    /// The store pool connects lazily; Redis is connected eagerly and replaced
    /// by an in-process cache when unreachable.
    pub async fn from_env() -> Result<Self, ConfigError> {
        let svc = Arc::new(LlmServiceProfiles::from_env()?);

        let rag_cfg = RagConfig::from_env()?;
        let dim = rag_cfg.embedding_dim;
        let store = RagStore::new(rag_cfg)?;
        let pool = store.pool().clone();

        let cfg = ContextorConfig::from_env();
        let cache = build_cache(&cfg).await;
        info!(
            deployment = %cfg.deployment_id,
            cache = cache.is_enabled(),
            "conversation pipeline configured"
        );

        let contextor = Contextor::new(
            Arc::new(store),
            Arc::new(LlmEmbedder::new(svc.clone(), dim)),
            svc,
            cache,
            cfg,
        );

        Ok(Self::new(
            Arc::new(contextor),
            Arc::new(PgTranscriptSink::new(pool)),
        ))
    }
}

async fn build_cache(cfg: &ContextorConfig) -> ResponseCache {
    if !cfg.response_cache {
        return ResponseCache::disabled(cfg.deployment_id.clone());
    }

    let Some(url) = cfg.redis_url.as_deref() else {
        return ResponseCache::new(Some(Arc::new(MemoryCache::new())), cfg.deployment_id.clone());
    };

    match RedisCache::connect(url).await {
        Ok(redis) => ResponseCache::new(Some(Arc::new(redis)), cfg.deployment_id.clone()),
        Err(e) => {
            warn!(error = %e, "redis unavailable; using in-process cache");
            ResponseCache::new(Some(Arc::new(MemoryCache::new())), cfg.deployment_id.clone())
        }
    }
}
