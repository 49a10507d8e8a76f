//! Thin wrapper over a `PgPool` that renders and runs document queries.

use sqlx::{PgPool, Postgres, QueryBuilder, postgres::PgPoolOptions};
use tracing::{debug, trace};

use crate::config::RagConfig;
use crate::errors::RagError;
use crate::filters::push_filter;
use crate::record::{DocumentQuery, DocumentRow};

const COLUMNS: &str = "id::text AS id, COALESCE(content, '') AS content, \
     COALESCE(name, '') AS name, COALESCE(location, '') AS location, \
     original_location, type AS kind";

pub struct PgFacade {
    pool: PgPool,
    table: String,
    default_kind: String,
}

impl PgFacade {
    /// Builds a lazily connecting pool; the first query opens connections.
    pub fn new(cfg: &RagConfig) -> Result<Self, RagError> {
        cfg.validate()?;
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect_lazy(&cfg.database_url)?;
        debug!(
            table = %cfg.table,
            max_connections = cfg.max_connections,
            "pg pool prepared"
        );
        Ok(Self::from_pool(pool, cfg))
    }

    pub fn from_pool(pool: PgPool, cfg: &RagConfig) -> Self {
        Self {
            pool,
            table: cfg.table.clone(),
            default_kind: cfg.document_kind.clone(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn search(&self, q: &DocumentQuery) -> Result<Vec<DocumentRow>, RagError> {
        let mut qb = build_search(&self.table, &self.default_kind, q);
        trace!("pg_facade::search sql={}", qb.sql());
        let rows = qb
            .build_query_as::<DocumentRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn chunk_siblings(
        &self,
        tenant: &str,
        original_locations: &[String],
    ) -> Result<Vec<DocumentRow>, RagError> {
        if original_locations.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = build_siblings(&self.table, tenant, original_locations);
        trace!("pg_facade::chunk_siblings sql={}", qb.sql());
        let rows = qb
            .build_query_as::<DocumentRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

/// Formats a vector as a pgvector text literal, e.g. `[0.1,0.2]`.
pub fn vector_to_pg(v: &[f32]) -> String {
    let mut out = String::with_capacity(v.len() * 10 + 2);
    out.push('[');
    for (i, x) in v.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&x.to_string());
    }
    out.push(']');
    out
}

fn build_search<'a>(table: &str, default_kind: &str, q: &DocumentQuery) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
    qb.push(COLUMNS);

    let vector = q.embedding.as_deref().map(vector_to_pg);
    match &vector {
        Some(v) => {
            qb.push(", (embedding <=> ");
            qb.push_bind(v.clone());
            qb.push("::text::vector)::float8 AS distance");
        }
        None => {
            qb.push(", NULL::float8 AS distance");
        }
    }

    qb.push(" FROM ");
    qb.push(table);
    qb.push(" WHERE company_id = ");
    qb.push_bind(q.tenant.clone());
    qb.push(" AND type = ");
    qb.push_bind(q.kind.clone().unwrap_or_else(|| default_kind.to_string()));

    if let (Some(v), Some(max)) = (&vector, q.max_distance) {
        qb.push(" AND (embedding <=> ");
        qb.push_bind(v.clone());
        qb.push("::text::vector) < ");
        qb.push_bind(max);
    }

    if let Some(f) = &q.filter {
        qb.push(" AND ");
        push_filter(&mut qb, f);
    }

    if vector.is_some() {
        qb.push(" ORDER BY distance ASC");
    } else {
        qb.push(" ORDER BY location ASC");
    }

    if let Some(limit) = q.limit {
        qb.push(" LIMIT ");
        qb.push_bind(limit);
    }
    qb
}

fn build_siblings<'a>(
    table: &str,
    tenant: &str,
    original_locations: &[String],
) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
    qb.push(COLUMNS);
    qb.push(", NULL::float8 AS distance FROM ");
    qb.push(table);
    qb.push(" WHERE company_id = ");
    qb.push_bind(tenant.to_string());
    qb.push(" AND original_location = ANY(");
    qb.push_bind(original_locations.to_vec());
    qb.push(") ORDER BY original_location, location");
    qb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DocumentFilter;

    #[test]
    fn vectors_render_as_pgvector_literals() {
        assert_eq!(vector_to_pg(&[0.5, -1.0, 2.25]), "[0.5,-1,2.25]");
        assert_eq!(vector_to_pg(&[]), "[]");
    }

    #[test]
    fn similarity_query_binds_everything() {
        let q = DocumentQuery::new("acme")
            .with_embedding(vec![0.1, 0.2])
            .with_max_distance(0.8)
            .with_filter(DocumentFilter::IdStartsWith("agent".into()))
            .with_limit(10);
        let qb = build_search("context_embeddings", "adev", &q);
        let sql = qb.sql();

        assert!(sql.contains("(embedding <=> $1::text::vector)::float8 AS distance"));
        assert!(sql.contains("WHERE company_id = $2 AND type = $3"));
        assert!(sql.contains("(embedding <=> $4::text::vector) < $5"));
        assert!(sql.contains("(LOWER(id::text) LIKE $6)"));
        assert!(sql.ends_with("ORDER BY distance ASC LIMIT $7"));
    }

    #[test]
    fn plain_query_orders_by_location() {
        let q = DocumentQuery::new("acme");
        let qb = build_search("context_embeddings", "adev", &q);
        assert!(qb.sql().contains("NULL::float8 AS distance"));
        assert!(qb.sql().ends_with("ORDER BY location ASC"));
    }
}
