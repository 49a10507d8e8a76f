//! In-process [`DocumentStore`] with brute-force cosine distance.

use tokio::sync::RwLock;
use tracing::trace;

use crate::errors::RagError;
use crate::record::{DocumentQuery, DocumentRow};
use crate::retrieve::{DocumentStore, StoreFuture};

/// A document plus the columns only the store sees.
#[derive(Clone, Debug)]
pub struct StoredDocument {
    pub tenant: String,
    pub row: DocumentRow,
    pub embedding: Vec<f32>,
}

/// Same query semantics as the PostgreSQL store, evaluated in memory.
pub struct MemoryStore {
    default_kind: String,
    docs: RwLock<Vec<StoredDocument>>,
    fail: RwLock<bool>,
}

impl MemoryStore {
    pub fn new(default_kind: impl Into<String>) -> Self {
        Self {
            default_kind: default_kind.into(),
            docs: RwLock::new(Vec::new()),
            fail: RwLock::new(false),
        }
    }

    pub async fn insert(&self, doc: StoredDocument) {
        self.docs.write().await.push(doc);
    }

    /// Makes every subsequent call fail (outage simulation).
    pub async fn set_failing(&self, failing: bool) {
        *self.fail.write().await = failing;
    }

    async fn check(&self) -> Result<(), RagError> {
        if *self.fail.read().await {
            return Err(RagError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    async fn run_search(&self, q: &DocumentQuery) -> Result<Vec<DocumentRow>, RagError> {
        self.check().await?;
        let kind = q.kind.as_deref().unwrap_or(&self.default_kind);
        let docs = self.docs.read().await;

        let mut out = Vec::new();
        for d in docs.iter() {
            if d.tenant != q.tenant || d.row.kind != kind {
                continue;
            }
            if let Some(f) = &q.filter {
                if !f.matches(&d.row) {
                    continue;
                }
            }

            let mut row = d.row.clone();
            row.distance = None;
            if let Some(qv) = &q.embedding {
                if qv.len() != d.embedding.len() {
                    return Err(RagError::VectorSizeMismatch {
                        got: qv.len(),
                        want: d.embedding.len(),
                    });
                }
                let dist = cosine_distance(qv, &d.embedding);
                if q.max_distance.is_some_and(|max| dist >= max) {
                    continue;
                }
                row.distance = Some(dist);
            }
            out.push(row);
        }

        if q.embedding.is_some() {
            out.sort_by(|a, b| {
                a.distance
                    .unwrap_or(f64::MAX)
                    .total_cmp(&b.distance.unwrap_or(f64::MAX))
            });
        } else {
            out.sort_by(|a, b| a.location.cmp(&b.location));
        }
        if let Some(limit) = q.limit {
            out.truncate(limit.max(0) as usize);
        }

        trace!("memory::search tenant={} hits={}", q.tenant, out.len());
        Ok(out)
    }

    async fn run_siblings(
        &self,
        tenant: &str,
        original_locations: &[String],
    ) -> Result<Vec<DocumentRow>, RagError> {
        self.check().await?;
        let docs = self.docs.read().await;
        Ok(docs
            .iter()
            .filter(|d| d.tenant == tenant)
            .filter(|d| {
                d.row
                    .original_location
                    .as_ref()
                    .is_some_and(|o| original_locations.contains(o))
            })
            .map(|d| {
                let mut row = d.row.clone();
                row.distance = None;
                row
            })
            .collect())
    }
}

impl DocumentStore for MemoryStore {
    fn search<'a>(&'a self, query: &'a DocumentQuery) -> StoreFuture<'a, Vec<DocumentRow>> {
        Box::pin(self.run_search(query))
    }

    fn chunk_siblings<'a>(
        &'a self,
        tenant: &'a str,
        original_locations: &'a [String],
    ) -> StoreFuture<'a, Vec<DocumentRow>> {
        Box::pin(self.run_siblings(tenant, original_locations))
    }
}

/// `1 - cos(a, b)`, matching pgvector's `<=>`; zero vectors give distance 1.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut na, mut nb) = (0f64, 0f64, 0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na.sqrt() * nb.sqrt())
}
