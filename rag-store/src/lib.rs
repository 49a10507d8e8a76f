//! Document retrieval over PostgreSQL + pgvector.
//!
//! This crate provides:
//! - [`RagStore`], the PostgreSQL-backed [`DocumentStore`]
//! - [`MemoryStore`], an in-process store with the same query semantics
//! - [`EmbeddingsProvider`] and the LLM-backed [`LlmEmbedder`]
//!
//! Documents live in one table (`context_embeddings` by default) with the
//! columns `id, company_id, type, content, name, location,
//! original_location, embedding`.

mod config;
mod embed;
mod errors;
mod filters;
mod memory;
mod pg_facade;
mod record;
mod retrieve;

pub use config::RagConfig;
pub use embed::{EmbeddingsProvider, llm::LlmEmbedder};
pub use errors::RagError;
pub use memory::{MemoryStore, StoredDocument, cosine_distance};
pub use pg_facade::vector_to_pg;
pub use record::{DocumentFilter, DocumentQuery, DocumentRow};
pub use retrieve::{DocumentStore, StoreFuture};

use tracing::{debug, trace};

/// High-level facade that wires configuration and the connection pool.
///
/// This is the single entry point recommended for application code.
pub struct RagStore {
    cfg: RagConfig,
    client: pg_facade::PgFacade,
}

impl RagStore {
    /// Constructs a new store from the given configuration.
    ///
    /// # Errors
    /// Returns `RagError::Config` for invalid settings and
    /// `RagError::Database` if the connection string is malformed.
    pub fn new(cfg: RagConfig) -> Result<Self, RagError> {
        trace!("RagStore::new table={}", cfg.table);
        let client = pg_facade::PgFacade::new(&cfg)?;
        Ok(Self { cfg, client })
    }

    /// Wraps an existing pool (shared with other components).
    pub fn with_pool(pool: sqlx::PgPool, cfg: RagConfig) -> Self {
        let client = pg_facade::PgFacade::from_pool(pool, &cfg);
        Self { cfg, client }
    }

    pub fn config(&self) -> &RagConfig {
        &self.cfg
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        self.client.pool()
    }

    async fn checked_search(&self, query: &DocumentQuery) -> Result<Vec<DocumentRow>, RagError> {
        if let Some(v) = &query.embedding {
            if v.len() != self.cfg.embedding_dim {
                return Err(RagError::VectorSizeMismatch {
                    got: v.len(),
                    want: self.cfg.embedding_dim,
                });
            }
        }
        let rows = self.client.search(query).await?;
        debug!(
            tenant = %query.tenant,
            ranked = query.embedding.is_some(),
            hits = rows.len(),
            "RagStore::search"
        );
        Ok(rows)
    }
}

impl DocumentStore for RagStore {
    fn search<'a>(&'a self, query: &'a DocumentQuery) -> StoreFuture<'a, Vec<DocumentRow>> {
        Box::pin(self.checked_search(query))
    }

    fn chunk_siblings<'a>(
        &'a self,
        tenant: &'a str,
        original_locations: &'a [String],
    ) -> StoreFuture<'a, Vec<DocumentRow>> {
        Box::pin(self.client.chunk_siblings(tenant, original_locations))
    }
}
