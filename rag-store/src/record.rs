//! Core data models used by the library.

use serde::{Deserialize, Serialize};

/// One stored document (or document chunk) as returned by a search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DocumentRow {
    pub id: String,
    pub content: String,
    pub name: String,
    /// Where the text came from; chunks carry a `#chunk<N>` suffix.
    pub location: String,
    /// Location of the whole document a chunk was cut from.
    pub original_location: Option<String>,
    pub kind: String,
    /// Cosine distance to the query vector, `None` for non-vector lookups.
    pub distance: Option<f64>,
}

/// Parameters of a document search.
///
/// With an `embedding`, rows come back ordered by cosine distance
/// (ascending) and `max_distance` acts as an exclusive ceiling. Without one,
/// rows are ordered by `location`.
#[derive(Clone, Debug, Default)]
pub struct DocumentQuery {
    /// Tenant (`company_id`) whose documents are searched.
    pub tenant: String,
    /// Document kind; `None` uses the store's configured kind.
    pub kind: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub max_distance: Option<f64>,
    pub filter: Option<DocumentFilter>,
    pub limit: Option<i64>,
}

impl DocumentQuery {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            ..Self::default()
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_max_distance(mut self, max: f64) -> Self {
        self.max_distance = Some(max);
        self
    }

    pub fn with_filter(mut self, filter: DocumentFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Row predicate. String comparisons follow the SQL rendering in
/// [`crate::filters`]: `IdStartsWith`/`NameIn` compare lower-cased values,
/// `LocationContains` is case-insensitive, a missing `original_location`
/// compares as the empty string.
#[derive(Clone, Debug, PartialEq)]
pub enum DocumentFilter {
    /// Lower-cased id starts with the given (lower-cased) prefix.
    IdStartsWith(String),
    /// Lower-cased name equals one of the given (lower-cased) names.
    NameIn(Vec<String>),
    /// Location contains the substring, ignoring case.
    LocationContains(String),
    /// Original location equals one of the values.
    OriginalLocationIn(Vec<String>),
    AnyOf(Vec<DocumentFilter>),
    AllOf(Vec<DocumentFilter>),
    Not(Box<DocumentFilter>),
}

impl DocumentFilter {
    pub fn negate(self) -> Self {
        DocumentFilter::Not(Box::new(self))
    }

    /// Evaluates the predicate against a row in memory.
    pub fn matches(&self, row: &DocumentRow) -> bool {
        match self {
            DocumentFilter::IdStartsWith(p) => row
                .id
                .to_lowercase()
                .starts_with(&p.to_lowercase()),
            DocumentFilter::NameIn(names) => {
                let name = row.name.to_lowercase();
                names.iter().any(|n| n.to_lowercase() == name)
            }
            DocumentFilter::LocationContains(s) => row
                .location
                .to_lowercase()
                .contains(&s.to_lowercase()),
            DocumentFilter::OriginalLocationIn(values) => {
                let orig = row.original_location.as_deref().unwrap_or("");
                values.iter().any(|v| v == orig)
            }
            DocumentFilter::AnyOf(fs) => fs.iter().any(|f| f.matches(row)),
            DocumentFilter::AllOf(fs) => fs.iter().all(|f| f.matches(row)),
            DocumentFilter::Not(f) => !f.matches(row),
        }
    }
}
