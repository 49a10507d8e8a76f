//! Candidate retrieval: mode-specific document queries plus lexical
//! re-ranking of the vector distance.
//!
//! The question embedding is produced by the caller; this module only talks
//! to the [`DocumentStore`] and, for the reference subset, the response cache.

use std::collections::BTreeSet;

use rag_store::{DocumentFilter, DocumentQuery, DocumentRow, DocumentStore, RagError};
use tracing::{debug, info, warn};

use crate::{
    api_types::{Candidate, PromptMode, TransactionRecord},
    cache::{ResponseCache, reference_key},
    cfg::ContextorConfig,
    chunk,
};

/// Phrases that mark a question as "how do I stake / run an agent", matched as
/// plain substrings of the lower-cased question.
pub const STAKING_PATTERNS: &[&str] = &[
    "stake olas",
    "staking olas",
    "how to stake",
    "easiest way to stake",
    "want to stake",
    "can i stake",
    "help me stake",
    "guide to staking",
    "staking guide",
    "stake my olas",
    "run olas",
    "running olas",
    "how to run",
    "to run",
    "easiest way to run",
    "want to run",
    "can i run",
    "help me run",
    "guide to running",
    "run my own",
    "running guide",
    "run agent",
    "running agent",
    "run an agent",
    "start agent",
    "starting agent",
    "deploy agent",
    "deploying agent",
    "non technical",
    "easy",
    "simple way",
    "beginner",
    "beginner friendly",
    "don't know how to code",
    "no coding",
    "without coding",
    "not a developer",
    "not technical",
    "simple guide",
    "step by step",
    "how can i",
    "what's the easiest",
    "what is the easiest",
    "best way to",
    "quickest way to",
    "help with",
    "where do i start",
    "getting started",
    "make my own",
    "make my own agent",
    "set up",
    "set up agent",
    "set up my own",
];

/// Command reference site; every page of it is critical in reference mode.
pub const COMMANDS_SITE: &str = "https://8ball030.github.io/auto_dev/commands";
pub const README_LOCATION: &str = "https://github.com/8ball030/auto_dev/blob/main/README.md";
pub const WORKFLOW_MARKER: &str = "create_new_agent_from_fsm.yaml";
pub const WORKFLOW_LOCATION: &str =
    "https://github.com/8ball030/auto_dev/blob/main/auto_dev/data/workflows/create_new_agent_from_fsm.yaml";
const COMMANDS_PATH: &str = "/commands";

const PEARL: &str = "pearl";
const PEARL_FACTOR: f64 = 0.3;
const CONTENT_FACTOR: f64 = 0.7;
const NAME_FACTOR: f64 = 0.8;

/// Inputs of one retrieval.
#[derive(Clone, Copy, Debug)]
pub struct RetrieveRequest<'a> {
    pub embedding: &'a [f32],
    pub tenant: &'a str,
    pub question: &'a str,
    pub mode: PromptMode,
    pub agent_scope: Option<&'a str>,
    pub address_hints: &'a [String],
}

/// Whether the lower-cased question contains one of [`STAKING_PATTERNS`].
pub fn has_staking_pattern(lower_question: &str) -> bool {
    STAKING_PATTERNS.iter().any(|p| lower_question.contains(p))
}

/// Lexically adjusted distance; the first matching rule wins.
pub fn adjust_distance(
    distance: f64,
    content: &str,
    name: &str,
    lower_question: &str,
    staking: bool,
) -> f64 {
    let content = content.to_lowercase();
    let name = name.to_lowercase();

    if staking && (content.contains(PEARL) || name.contains(PEARL)) {
        distance * PEARL_FACTOR
    } else if content.contains(lower_question) {
        distance * CONTENT_FACTOR
    } else if name.contains(lower_question) {
        distance * NAME_FACTOR
    } else {
        distance
    }
}

/// Lower-cased, deduplicated `to` and log addresses of the transactions.
pub fn address_hints(transactions: &[TransactionRecord]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    let addresses = transactions.iter().flat_map(|tx| {
        tx.to
            .iter()
            .chain(tx.logs.iter().filter_map(|l| l.address.as_ref()))
    });
    for a in addresses {
        let a = a.trim().to_lowercase();
        if !a.is_empty() && seen.insert(a.clone()) {
            out.push(a);
        }
    }
    out
}

/// Candidates for `req.mode`, ranked by (adjusted) distance.
pub async fn retrieve(
    store: &dyn DocumentStore,
    cache: &ResponseCache,
    cfg: &ContextorConfig,
    req: &RetrieveRequest<'_>,
) -> Result<Vec<Candidate>, RagError> {
    let out = match req.mode {
        PromptMode::General => general(store, cfg, req, true).await?,
        PromptMode::Agent => agent(store, cfg, req).await?,
        PromptMode::Reference => reference(store, cache, cfg, req).await?,
    };
    debug!(
        "retrieve: mode={} tenant={} candidates={}",
        req.mode.as_str(),
        req.tenant,
        out.len()
    );
    Ok(out)
}

async fn general(
    store: &dyn DocumentStore,
    cfg: &ContextorConfig,
    req: &RetrieveRequest<'_>,
    staking_rule: bool,
) -> Result<Vec<Candidate>, RagError> {
    let query = DocumentQuery::new(req.tenant)
        .with_embedding(req.embedding.to_vec())
        .with_max_distance(cfg.max_distance);
    let rows = store.search(&query).await?;

    let lower_q = req.question.to_lowercase();
    let staking = staking_rule && has_staking_pattern(&lower_q);
    Ok(rank(rows, &lower_q, staking, cfg.top_k))
}

async fn agent(
    store: &dyn DocumentStore,
    cfg: &ContextorConfig,
    req: &RetrieveRequest<'_>,
) -> Result<Vec<Candidate>, RagError> {
    let Some(scope) = req.agent_scope else {
        info!("retrieve: agent mode without agent scope, no candidates");
        return Ok(Vec::new());
    };

    let filter = DocumentFilter::AnyOf(vec![
        DocumentFilter::IdStartsWith(scope.to_lowercase()),
        DocumentFilter::NameIn(req.address_hints.to_vec()),
    ]);
    let query = DocumentQuery::new(req.tenant)
        .with_embedding(req.embedding.to_vec())
        .with_filter(filter);

    match store.search(&query).await {
        Ok(rows) => Ok(rank(rows, &req.question.to_lowercase(), false, cfg.top_k)),
        Err(e) => {
            warn!(error = %e, agent = scope, "agent retrieval failed; falling back to basic query");
            general(store, cfg, req, false).await
        }
    }
}

async fn reference(
    store: &dyn DocumentStore,
    cache: &ResponseCache,
    cfg: &ContextorConfig,
    req: &RetrieveRequest<'_>,
) -> Result<Vec<Candidate>, RagError> {
    let mut out = critical_documents(store, cache, cfg, req.tenant).await?;

    let filter = DocumentFilter::AllOf(vec![
        DocumentFilter::OriginalLocationIn(vec![
            README_LOCATION.to_string(),
            WORKFLOW_LOCATION.to_string(),
        ])
        .negate(),
        DocumentFilter::LocationContains(COMMANDS_PATH.to_string()).negate(),
    ]);
    let query = DocumentQuery::new(req.tenant)
        .with_embedding(req.embedding.to_vec())
        .with_max_distance(cfg.max_distance)
        .with_filter(filter)
        .with_limit(cfg.reference_limit);
    let rows = store.search(&query).await?;

    out.extend(rank(rows, &req.question.to_lowercase(), false, cfg.top_k));
    Ok(out)
}

/// Commands-site pages first, then README and workflow chunks, each group in
/// chunk order. Cached per tenant.
async fn critical_documents(
    store: &dyn DocumentStore,
    cache: &ResponseCache,
    cfg: &ContextorConfig,
    tenant: &str,
) -> Result<Vec<Candidate>, RagError> {
    let key = reference_key(cache.deployment(), tenant);
    if let Some(hit) = cache.get_json::<Vec<Candidate>>(&key).await {
        if !hit.is_empty() {
            debug!("retrieve: reference subset from cache n={}", hit.len());
            return Ok(hit);
        }
    }

    let filter = DocumentFilter::AnyOf(vec![
        DocumentFilter::LocationContains(COMMANDS_SITE.to_string()),
        DocumentFilter::OriginalLocationIn(vec![README_LOCATION.to_string()]),
        DocumentFilter::LocationContains(WORKFLOW_MARKER.to_string()),
    ]);
    let mut rows = store
        .search(&DocumentQuery::new(tenant).with_filter(filter))
        .await?;

    let site = COMMANDS_SITE.to_lowercase();
    rows.sort_by_key(|r| {
        let group = u8::from(!r.location.to_lowercase().contains(&site));
        (group, chunk::order_key(&r.location))
    });

    let critical: Vec<Candidate> = rows
        .into_iter()
        .map(|r| into_candidate(r, 0.0, true))
        .collect();

    if !critical.is_empty() {
        cache.set_json(&key, &critical, cfg.reference_ttl).await;
    }
    Ok(critical)
}

fn rank(rows: Vec<DocumentRow>, lower_q: &str, staking: bool, cap: usize) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = rows
        .into_iter()
        .map(|r| {
            let d = adjust_distance(
                r.distance.unwrap_or(1.0),
                &r.content,
                &r.name,
                lower_q,
                staking,
            );
            into_candidate(r, d, false)
        })
        .collect();
    out.sort_by(|a, b| a.similarity.total_cmp(&b.similarity));
    out.truncate(cap);
    out
}

fn into_candidate(row: DocumentRow, similarity: f64, is_critical: bool) -> Candidate {
    Candidate {
        content: row.content,
        name: row.name,
        location: row.location,
        original_location: row.original_location,
        kind: row.kind,
        similarity,
        is_critical,
    }
}
