//! Retrieval seam: the store contract the pipeline depends on.

use std::{future::Future, pin::Pin};

use crate::errors::RagError;
use crate::record::{DocumentQuery, DocumentRow};

/// Boxed future returned by [`DocumentStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RagError>> + Send + 'a>>;

/// Read access to the document corpus.
///
/// Implemented by [`crate::RagStore`] (PostgreSQL) and
/// [`crate::MemoryStore`] (tests, local runs).
pub trait DocumentStore: Send + Sync {
    /// Runs a filtered (and optionally vector-ranked) search.
    fn search<'a>(&'a self, query: &'a DocumentQuery) -> StoreFuture<'a, Vec<DocumentRow>>;

    /// Returns every row of the tenant whose `original_location` is one of
    /// the given values. Order is unspecified.
    fn chunk_siblings<'a>(
        &'a self,
        tenant: &'a str,
        original_locations: &'a [String],
    ) -> StoreFuture<'a, Vec<DocumentRow>>;
}
