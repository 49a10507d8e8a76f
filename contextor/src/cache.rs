//! Response cache: deterministic keys over a best-effort key-value store.
//!
//! Every failure of the cache layer is logged and treated as a miss; a
//! request never fails because of the cache.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use redis::AsyncCommands;
use serde::{Serialize, de::DeserializeOwned};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::{api_types::PromptMode, error::CacheError};

pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Raw string key-value store with per-entry expiry.
pub trait CacheStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>>;

    /// Overwrites the whole entry.
    fn set<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> CacheFuture<'a, ()>;
}

/// Key namespaces of the response cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheNamespace {
    /// Assembled context (≈30 min).
    RelevantContext,
    /// Answer chunks (≈2 days).
    Conversation,
}

impl CacheNamespace {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheNamespace::RelevantContext => "relevantContext",
            CacheNamespace::Conversation => "conversation",
        }
    }
}

/// `namespace:deployment:tenant:mode:agentOrNone:base64(question)`
///
/// # Example
/// ```
/// use contextor::{PromptMode, cache::{CacheNamespace, cache_key}};
/// let k = cache_key(CacheNamespace::Conversation, "prod", "acme", PromptMode::General, None, "hi");
/// assert_eq!(k, "conversation:prod:acme:general:none:aGk=");
/// ```
pub fn cache_key(
    ns: CacheNamespace,
    deployment: &str,
    tenant: &str,
    mode: PromptMode,
    agent_scope: Option<&str>,
    question: &str,
) -> String {
    format!(
        "{}:{}:{}:{}:{}:{}",
        ns.as_str(),
        deployment,
        tenant,
        mode.as_str(),
        agent_scope.unwrap_or("none"),
        STANDARD.encode(question.as_bytes())
    )
}

/// Key of the per-tenant reference-document subset.
pub fn reference_key(deployment: &str, tenant: &str) -> String {
    format!("reference_docs:{deployment}:{tenant}")
}

/* ------------------------------------------------------------------------- */
/* Backends                                                                  */
/* ------------------------------------------------------------------------- */

/// In-process cache with expiry; used locally and in tests.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    failing: AtomicBool,
    writes: Mutex<Vec<String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail (outage simulation).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Keys written so far, in write order.
    pub fn written_keys(&self) -> Vec<String> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("memory cache marked failing".into()));
        }
        Ok(())
    }

    fn lookup(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check()?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CacheError::Unavailable("poisoned lock".into()))?;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn store(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CacheError::Unavailable("poisoned lock".into()))?;
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
        if let Ok(mut w) = self.writes.lock() {
            w.push(key.to_string());
        }
        Ok(())
    }
}

impl CacheStore for MemoryCache {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>> {
        Box::pin(async move { self.lookup(key) })
    }

    fn set<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> CacheFuture<'a, ()> {
        Box::pin(async move { self.store(key, value, ttl) })
    }
}

/// Redis backend over a multiplexed async connection.
#[derive(Clone)]
pub struct RedisCache {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisCache {
    /// Opens a multiplexed connection to `url` (e.g. `redis://127.0.0.1/`).
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        debug!("redis cache connected");
        Ok(Self { conn })
    }
}

impl CacheStore for RedisCache {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let v: Option<String> = conn.get(key).await?;
            Ok(v)
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
            Ok(())
        })
    }
}

/* ------------------------------------------------------------------------- */
/* Typed, failure-absorbing facade                                           */
/* ------------------------------------------------------------------------- */

/// JSON facade over a [`CacheStore`] that never surfaces cache errors.
#[derive(Clone)]
pub struct ResponseCache {
    store: Option<Arc<dyn CacheStore>>,
    deployment: String,
}

impl ResponseCache {
    /// `store = None` disables reads and writes.
    pub fn new(store: Option<Arc<dyn CacheStore>>, deployment: impl Into<String>) -> Self {
        Self {
            store,
            deployment: deployment.into(),
        }
    }

    pub fn disabled(deployment: impl Into<String>) -> Self {
        Self::new(None, deployment)
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    /// Reads and decodes `key`; misses, errors and undecodable payloads give `None`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let store = self.store.as_ref()?;
        match store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(v) => {
                    trace!(key, "cache hit");
                    Some(v)
                }
                Err(e) => {
                    warn!(key, error = %CacheError::from(e), "cache payload ignored");
                    None
                }
            },
            Ok(None) => {
                trace!(key, "cache miss");
                None
            }
            Err(e) => {
                warn!(key, error = %e, "cache read failed; treating as miss");
                None
            }
        }
    }

    /// Best-effort write.
    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "cache payload not serializable");
                return;
            }
        };
        if let Err(e) = store.set(key, raw, ttl).await {
            warn!(key, error = %e, "cache write failed");
        }
    }

    /// Returns the cached value or computes, stores and returns it.
    ///
    /// Errors of `compute` propagate; nothing is cached for them.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get_json::<T>(key).await {
            return Ok(hit);
        }
        let value = compute().await?;
        self.set_json(key, &value, ttl).await;
        Ok(value)
    }
}
