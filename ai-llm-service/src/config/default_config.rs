//! Default LLM configs loaded strictly from environment variables.
//!
//! This module provides convenience constructors for [`LlmModelConfig`],
//! grouped by role:
//!
//! - **Fast**      → cheap, near-deterministic model (relevance scoring)
//! - **Slow**      → answer generation model (streamed)
//! - **Embedding** → embedding generator
//!
//! # Environment variables
//!
//! Common:
//! - `LLM_KIND` = provider kind (`openai` (default) or `ollama`)
//! - `LLM_MAX_TOKENS` = optional max tokens for the slow profile (u32)
//!
//! OpenAI-specific:
//! - `OPENAI_API_KEY`   = bearer token (mandatory)
//! - `OPENAI_BASE_URL`  = endpoint, default `https://api.openai.com`
//!
//! Ollama-specific:
//! - `OLLAMA_URL` or `OLLAMA_PORT` = endpoint (mandatory)
//!
//! Models:
//! - `OPENAI_MODEL`      = slow/generation model, default `gpt-4o`
//! - `OPENAI_MODEL_FAST` = fast/scoring model, default `gpt-4o-mini`
//! - `EMBEDDING_MODEL`   = embedding model, default `text-embedding-3-small`

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{AiLlmError, ConfigError, env_opt_u32, must_env, validate_http_endpoint},
};

/// Resolves the provider from `LLM_KIND` (defaults to OpenAI).
///
/// # Errors
/// - [`ConfigError::UnsupportedProvider`] for unknown values
pub fn provider_from_env() -> Result<LlmProvider, AiLlmError> {
    match std::env::var("LLM_KIND") {
        Ok(v) if !v.trim().is_empty() => v
            .parse::<LlmProvider>()
            .map_err(|other| ConfigError::UnsupportedProvider(other).into()),
        _ => Ok(LlmProvider::OpenAI),
    }
}

/// Resolves endpoint and API key for the given provider.
///
/// Ollama precedence:
/// 1. `OLLAMA_URL` if present and non-empty
/// 2. `OLLAMA_PORT` → `http://localhost:{port}`
fn endpoint_and_key(provider: LlmProvider) -> Result<(String, Option<String>), AiLlmError> {
    match provider {
        LlmProvider::OpenAI => {
            let endpoint = env_or("OPENAI_BASE_URL", "https://api.openai.com");
            validate_http_endpoint("OPENAI_BASE_URL", &endpoint)?;
            let key = must_env("OPENAI_API_KEY")?;
            Ok((endpoint, Some(key)))
        }
        LlmProvider::Ollama => {
            if let Ok(url) = std::env::var("OLLAMA_URL") {
                if !url.trim().is_empty() {
                    validate_http_endpoint("OLLAMA_URL", &url)?;
                    return Ok((url, None));
                }
            }
            if let Ok(port) = std::env::var("OLLAMA_PORT") {
                if !port.trim().is_empty() {
                    let _ = port
                        .trim()
                        .parse::<u16>()
                        .map_err(|_| ConfigError::InvalidNumber {
                            var: "OLLAMA_PORT",
                            reason: "expected u16 (1..=65535)",
                        })?;
                    return Ok((format!("http://localhost:{}", port.trim()), None));
                }
            }
            Err(AiLlmError::Config(ConfigError::MissingVar(
                "OLLAMA_URL or OLLAMA_PORT",
            )))
        }
    }
}

/// Constructs a config for the **fast** model used to rate context relevance.
///
/// # Defaults
/// - `max_tokens = Some(50)` (a short comma-separated score list)
/// - `temperature = Some(0.1)`
/// - `timeout_secs = Some(30)`
pub fn config_fast() -> Result<LlmModelConfig, AiLlmError> {
    let provider = provider_from_env()?;
    let (endpoint, api_key) = endpoint_and_key(provider)?;

    Ok(LlmModelConfig {
        provider,
        model: env_or("OPENAI_MODEL_FAST", "gpt-4o-mini"),
        endpoint,
        api_key,
        max_tokens: Some(50),
        temperature: Some(0.1),
        top_p: None,
        timeout_secs: Some(30),
    })
}

/// Constructs a config for the **slow** model that streams answers.
///
/// # Env
/// - `OPENAI_MODEL` (optional)
/// - `LLM_MAX_TOKENS` (optional)
///
/// # Defaults
/// - `temperature = Some(0.7)`
/// - `timeout_secs = Some(120)` (covers the whole streamed response)
pub fn config_slow() -> Result<LlmModelConfig, AiLlmError> {
    let provider = provider_from_env()?;
    let (endpoint, api_key) = endpoint_and_key(provider)?;
    let max_tokens = env_opt_u32("LLM_MAX_TOKENS")?;

    Ok(LlmModelConfig {
        provider,
        model: env_or("OPENAI_MODEL", "gpt-4o"),
        endpoint,
        api_key,
        max_tokens,
        temperature: Some(0.7),
        top_p: None,
        timeout_secs: Some(120),
    })
}

/// Constructs a config for the **embedding** model.
///
/// # Defaults
/// - `temperature = Some(0.0)` (deterministic)
/// - `timeout_secs = Some(30)`
pub fn config_embedding() -> Result<LlmModelConfig, AiLlmError> {
    let provider = provider_from_env()?;
    let (endpoint, api_key) = endpoint_and_key(provider)?;

    Ok(LlmModelConfig {
        provider,
        model: env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
        endpoint,
        api_key,
        max_tokens: None,
        temperature: Some(0.0),
        top_p: None,
        timeout_secs: Some(30),
    })
}

fn env_or(name: &str, dflt: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| dflt.to_string())
}
