//! Filter conversion to SQL predicates.
//!
//! Values are always bound; only fixed SQL fragments are pushed as text.

use sqlx::{Postgres, QueryBuilder};
use tracing::trace;

use crate::record::DocumentFilter;

/// Appends `filter` as a parenthesised predicate to `qb`.
pub fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &DocumentFilter) {
    match filter {
        DocumentFilter::IdStartsWith(prefix) => {
            qb.push("(LOWER(id::text) LIKE ");
            qb.push_bind(format!("{}%", escape_like(&prefix.to_lowercase())));
            qb.push(")");
        }
        DocumentFilter::NameIn(names) => {
            let lowered: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
            qb.push("(LOWER(COALESCE(name, '')) = ANY(");
            qb.push_bind(lowered);
            qb.push("))");
        }
        DocumentFilter::LocationContains(needle) => {
            qb.push("(COALESCE(location, '') ILIKE ");
            qb.push_bind(format!("%{}%", escape_like(needle)));
            qb.push(")");
        }
        DocumentFilter::OriginalLocationIn(values) => {
            qb.push("(COALESCE(original_location, '') = ANY(");
            qb.push_bind(values.clone());
            qb.push("))");
        }
        DocumentFilter::AnyOf(fs) => push_joined(qb, fs, " OR ", "FALSE"),
        DocumentFilter::AllOf(fs) => push_joined(qb, fs, " AND ", "TRUE"),
        DocumentFilter::Not(inner) => {
            qb.push("(NOT ");
            push_filter(qb, inner);
            qb.push(")");
        }
    }
}

fn push_joined(
    qb: &mut QueryBuilder<'_, Postgres>,
    filters: &[DocumentFilter],
    sep: &'static str,
    empty: &'static str,
) {
    trace!("filters::push_joined n={} sep={sep:?}", filters.len());
    if filters.is_empty() {
        qb.push(empty);
        return;
    }
    qb.push("(");
    for (i, f) in filters.iter().enumerate() {
        if i > 0 {
            qb.push(sep);
        }
        push_filter(qb, f);
    }
    qb.push(")");
}

/// Escapes `LIKE` wildcards so user text matches literally.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
