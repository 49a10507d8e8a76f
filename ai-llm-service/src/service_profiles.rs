//! Shared LLM service with three active profiles: `fast`, `slow`, and `embedding`.
//!
//! - Lives in the same Tokio runtime as the application.
//! - Construct once, wrap in `Arc`, and pass clones to dependents.
//! - Caches underlying HTTP clients per config (endpoint+model+key+timeout).
//! - If `slow` profile is not provided, it falls back to `fast`.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use ai_llm_service::{ChatTurn, CompletionOptions, LlmServiceProfiles};
//!
//! # async fn run() -> Result<(), ai_llm_service::AiLlmError> {
//! let svc = Arc::new(LlmServiceProfiles::from_env()?);
//!
//! let txt = svc
//!     .generate_fast(&[ChatTurn::user("Rate this")], CompletionOptions::default())
//!     .await?;
//! println!("FAST: {txt}");
//!
//! let emb = svc.embed("How do I stake?").await?;
//! println!("Embedding dim = {}", emb.len());
//! # Ok(())
//! # }
//! ```

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use crate::{
    chat::{ChatTurn, CompletionOptions, TextStream},
    config::{
        default_config::{config_embedding, config_fast, config_slow},
        llm_model_config::LlmModelConfig,
        llm_provider::LlmProvider,
    },
    error_handler::AiLlmError,
    services::open_ai_service::OpenAiService,
};

/// Shared service that manages three logical LLM profiles: **fast**, **slow**, and **embedding**.
pub struct LlmServiceProfiles {
    fast: LlmModelConfig,
    slow: LlmModelConfig,
    embedding: LlmModelConfig,

    clients: RwLock<HashMap<ClientKey, Arc<OpenAiService>>>,
}

impl LlmServiceProfiles {
    /// Creates a new service with three profiles.
    ///
    /// - `fast`: required fast profile (scoring).
    /// - `slow_opt`: optional slow profile (answers). If `None`, falls back to `fast`.
    /// - `embedding`: required embedding profile.
    pub fn new(
        fast: LlmModelConfig,
        slow_opt: Option<LlmModelConfig>,
        embedding: LlmModelConfig,
    ) -> Self {
        let slow = slow_opt.unwrap_or_else(|| fast.clone());

        Self {
            fast,
            slow,
            embedding,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Builds all three profiles from environment variables.
    ///
    /// See [`crate::config::default_config`] for the variables involved.
    pub fn from_env() -> Result<Self, AiLlmError> {
        Ok(Self::new(
            config_fast()?,
            Some(config_slow()?),
            config_embedding()?,
        ))
    }

    /// Single completion on the **fast** profile.
    pub async fn generate_fast(
        &self,
        messages: &[ChatTurn],
        opts: CompletionOptions,
    ) -> Result<String, AiLlmError> {
        let cli = self.client_for(&self.fast).await?;
        cli.generate(messages, opts).await
    }

    /// Single completion on the **slow** profile.
    pub async fn generate_slow(
        &self,
        messages: &[ChatTurn],
        opts: CompletionOptions,
    ) -> Result<String, AiLlmError> {
        let cli = self.client_for(&self.slow).await?;
        cli.generate(messages, opts).await
    }

    /// Streaming completion on the **slow** profile.
    ///
    /// # Errors
    /// Returns [`AiLlmError`] if the stream cannot be opened; errors after
    /// that are yielded by the stream itself.
    pub async fn stream_slow(
        &self,
        messages: &[ChatTurn],
        opts: CompletionOptions,
    ) -> Result<TextStream, AiLlmError> {
        let cli = self.client_for(&self.slow).await?;
        cli.generate_stream(messages, opts).await
    }

    /// Computes embeddings using the **embedding** profile.
    pub async fn embed(&self, input: &str) -> Result<Vec<f32>, AiLlmError> {
        let cli = self.client_for(&self.embedding).await?;
        cli.embeddings(input).await
    }

    /// Returns references to the current profiles `(fast, slow, embedding)`.
    pub fn profiles(&self) -> (&LlmModelConfig, &LlmModelConfig, &LlmModelConfig) {
        (&self.fast, &self.slow, &self.embedding)
    }

    /* --------------------- Internals --------------------- */

    async fn client_for(&self, cfg: &LlmModelConfig) -> Result<Arc<OpenAiService>, AiLlmError> {
        let key = ClientKey::from(cfg);
        if let Some(cli) = self.clients.read().await.get(&key).cloned() {
            return Ok(cli);
        }

        let mut w = self.clients.write().await;
        if let Some(cli) = w.get(&key).cloned() {
            return Ok(cli);
        }
        let cli = Arc::new(OpenAiService::new(cfg.clone())?);
        w.insert(key, cli.clone());
        Ok(cli)
    }
}

/// Internal cache key to identify unique client configs.
#[derive(Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    provider: LlmProvider,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Option<u64>,
}

impl From<&LlmModelConfig> for ClientKey {
    fn from(cfg: &LlmModelConfig) -> Self {
        Self {
            provider: cfg.provider,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
            timeout: cfg.timeout_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ollama(model: &str) -> LlmModelConfig {
        LlmModelConfig {
            provider: LlmProvider::Ollama,
            model: model.into(),
            endpoint: "http://localhost:11434".into(),
            api_key: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            timeout_secs: Some(10),
        }
    }

    #[test]
    fn slow_falls_back_to_fast() {
        let svc = LlmServiceProfiles::new(ollama("qwen"), None, ollama("nomic"));
        let (fast, slow, emb) = svc.profiles();
        assert_eq!(fast, slow);
        assert_eq!(emb.model, "nomic");
    }

    #[tokio::test]
    async fn clients_are_cached_per_config() {
        let svc = LlmServiceProfiles::new(ollama("qwen"), None, ollama("nomic"));
        let a = svc.client_for(&ollama("qwen")).await.unwrap();
        let b = svc.client_for(&ollama("qwen")).await.unwrap();
        let c = svc.client_for(&ollama("nomic")).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn invalid_config_surfaces_error() {
        let mut bad = ollama("qwen");
        bad.endpoint = "nope".into();
        let svc = LlmServiceProfiles::new(bad, None, ollama("nomic"));
        assert!(svc.client_for(&svc.fast.clone()).await.is_err());
    }
}
