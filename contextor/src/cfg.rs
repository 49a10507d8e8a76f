//! Runtime configuration loaded from environment variables.

use std::time::Duration;

use crate::retry::{Backoff, RetryPolicy};

/// Typing-pace emulation for emitted chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pacing {
    pub enabled: bool,
    /// Pause before replaying a cached answer.
    pub warmup: Duration,
    /// Base delay before each chunk.
    pub chunk_delay: Duration,
    /// Upper bound of the random extra delay per chunk.
    pub jitter: Duration,
}

impl Pacing {
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            warmup: Duration::ZERO,
            chunk_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            enabled: true,
            warmup: Duration::from_millis(500),
            chunk_delay: Duration::from_millis(70),
            jitter: Duration::from_millis(50),
        }
    }
}

/// Config bag for the pipeline. All fields have defaults via `from_env`.
#[derive(Clone, Debug)]
pub struct ContextorConfig {
    /// Deployment identifier; part of every cache key.
    pub deployment_id: String,
    /// Response cache on/off (off by default for the `local` deployment).
    pub response_cache: bool,
    pub redis_url: Option<String>,

    pub context_ttl: Duration,
    pub answer_ttl: Duration,
    pub reference_ttl: Duration,

    // Retrieval knobs
    pub top_k: usize,
    pub max_distance: f64,
    pub reference_limit: i64,

    // Scoring / selection knobs
    pub score_batch: usize,
    pub context_k: usize,
    pub score_floor: u8,
    /// Character budget of the context block in the answer prompt.
    pub max_ctx_chars: usize,

    pub score_retry: RetryPolicy,
    pub embed_retry: RetryPolicy,
    pub stream_retry: RetryPolicy,

    pub pacing: Pacing,
    /// Capacity of the chunk channel between producer and caller.
    pub channel_capacity: usize,
}

impl Default for ContextorConfig {
    fn default() -> Self {
        Self {
            deployment_id: "local".into(),
            response_cache: false,
            redis_url: None,

            context_ttl: Duration::from_secs(30 * 60),
            answer_ttl: Duration::from_secs(2 * 24 * 60 * 60),
            reference_ttl: Duration::from_secs(24 * 60 * 60),

            top_k: 15,
            max_distance: 0.8,
            reference_limit: 10,

            score_batch: 5,
            context_k: 5,
            score_floor: 4,
            max_ctx_chars: 24_000,

            score_retry: RetryPolicy::exponential(3, Duration::from_secs(1)),
            embed_retry: RetryPolicy::exponential(3, Duration::from_secs(1)),
            stream_retry: RetryPolicy::exponential(3, Duration::from_secs(1)),

            pacing: Pacing::default(),
            channel_capacity: 32,
        }
    }
}

impl ContextorConfig {
    /// Build from environment variables with sensible defaults.
    ///
    /// # Example
    /// ```
    /// use contextor::ContextorConfig;
    /// let cfg = ContextorConfig::from_env();
    /// assert!(cfg.context_k >= 1);
    /// ```
    pub fn from_env() -> Self {
        let dflt = Self::default();

        let deployment_id = std::env::var("DEPLOYMENT_ID")
            .or_else(|_| std::env::var("RAILWAY_DEPLOYMENT_ID"))
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(dflt.deployment_id);

        let response_cache = match env("RESPONSE_CACHE", "").to_ascii_lowercase().as_str() {
            "on" | "true" | "1" => true,
            "off" | "false" | "0" => false,
            _ => deployment_id != "local",
        };

        let backoff = env("RETRY_BACKOFF", "exponential")
            .parse::<Backoff>()
            .unwrap_or(Backoff::Exponential);
        let retry = RetryPolicy {
            max_retries: parse("RETRY_MAX", dflt.score_retry.max_retries),
            initial_delay: Duration::from_millis(parse("RETRY_INITIAL_DELAY_MS", 1000u64)),
            backoff,
        };

        let pacing = Pacing {
            enabled: env("STREAM_PACING", "true") == "true",
            warmup: Duration::from_millis(parse("STREAM_WARMUP_MS", 500u64)),
            chunk_delay: Duration::from_millis(parse("STREAM_CHUNK_DELAY_MS", 70u64)),
            jitter: Duration::from_millis(parse("STREAM_CHUNK_JITTER_MS", 50u64)),
        };

        Self {
            deployment_id,
            response_cache,
            redis_url: std::env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),

            context_ttl: Duration::from_secs(parse("CONTEXT_CACHE_TTL_SECS", 30 * 60u64)),
            answer_ttl: Duration::from_secs(parse("ANSWER_CACHE_TTL_SECS", 2 * 24 * 60 * 60u64)),
            reference_ttl: Duration::from_secs(parse(
                "REFERENCE_CACHE_TTL_SECS",
                24 * 60 * 60u64,
            )),

            top_k: parse("RAG_TOP_K", dflt.top_k).max(1),
            max_distance: parse("MAX_DISTANCE", dflt.max_distance),
            reference_limit: parse("REFERENCE_LIMIT", dflt.reference_limit),

            score_batch: parse("SCORE_BATCH_SIZE", dflt.score_batch).max(1),
            context_k: parse("CTX_K", dflt.context_k).max(1),
            score_floor: parse("SCORE_FLOOR", dflt.score_floor).min(10),
            max_ctx_chars: parse("MAX_CTX_CHARS", dflt.max_ctx_chars),

            score_retry: retry,
            embed_retry: retry,
            stream_retry: retry,

            pacing,
            channel_capacity: dflt.channel_capacity,
        }
    }
}

fn env(k: &str, dflt: &str) -> String {
    std::env::var(k).unwrap_or_else(|_| dflt.to_string())
}

fn parse<T: std::str::FromStr>(k: &str, dflt: T) -> T {
    std::env::var(k)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(dflt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_pipeline_contract() {
        let cfg = ContextorConfig::default();
        assert_eq!(cfg.context_ttl, Duration::from_secs(1800));
        assert_eq!(cfg.answer_ttl, Duration::from_secs(172_800));
        assert_eq!(cfg.reference_ttl, Duration::from_secs(86_400));
        assert_eq!(cfg.score_batch, 5);
        assert_eq!(cfg.score_retry.max_retries, 3);
        assert!(!cfg.response_cache);
    }
}
