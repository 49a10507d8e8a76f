//! Context assembly: score-based selection, chunk stitching and dedup.

use std::collections::{BTreeMap, HashMap, HashSet};

use rag_store::{DocumentRow, DocumentStore};
use tracing::{debug, warn};

use crate::{
    api_types::{Candidate, ContextItem, ScoredCandidate},
    chunk,
    score::CRITICAL_SCORE,
};

struct Entry {
    item: ContextItem,
    original_location: Option<String>,
}

/// Builds the context handed to the answer model.
///
/// All critical candidates come first, followed by at most `context_k`
/// best-scored non-critical ones with score `>= score_floor`, both in
/// retrieval order. Chunk entries are replaced by their whole document and
/// the result is deduplicated by location.
pub async fn assemble(
    store: &dyn DocumentStore,
    tenant: &str,
    candidates: &[Candidate],
    scored: &[ScoredCandidate],
    context_k: usize,
    score_floor: u8,
) -> Vec<ContextItem> {
    // Highest score per candidate.
    let mut best: BTreeMap<usize, u8> = BTreeMap::new();
    for s in scored.iter().filter(|s| s.index < candidates.len()) {
        best.entry(s.index)
            .and_modify(|v| *v = (*v).max(s.score))
            .or_insert(s.score);
    }

    let critical: Vec<usize> = (0..candidates.len())
        .filter(|&i| candidates[i].is_critical)
        .collect();

    let mut ranked: Vec<(usize, u8)> = best
        .into_iter()
        .filter(|(i, _)| !candidates[*i].is_critical)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let mut picked: Vec<(usize, u8)> = ranked
        .into_iter()
        .take(context_k)
        .filter(|(_, s)| *s >= score_floor)
        .collect();
    picked.sort_by_key(|(i, _)| *i);

    let mut entries: Vec<Entry> = critical
        .iter()
        .map(|&i| entry(&candidates[i], CRITICAL_SCORE))
        .chain(picked.iter().map(|&(i, s)| entry(&candidates[i], s)))
        .collect();

    stitch_chunks(store, tenant, &mut entries).await;

    let mut seen = HashSet::new();
    let mut out: Vec<ContextItem> = entries
        .into_iter()
        .filter(|e| seen.insert(e.item.location.clone()))
        .map(|e| e.item)
        .collect();
    out.truncate(critical.len() + context_k);

    debug!(
        "select: candidates={} critical={} context={}",
        candidates.len(),
        critical.len(),
        out.len()
    );
    out
}

fn entry(c: &Candidate, score: u8) -> Entry {
    Entry {
        item: ContextItem {
            content: c.content.clone(),
            name: c.name.clone(),
            location: c.location.clone(),
            kind: c.kind.clone(),
            score,
        },
        original_location: c.original_location.clone(),
    }
}

/// Replaces every `#chunk<N>` entry with its whole document. A failed sibling
/// lookup leaves the entries untouched.
async fn stitch_chunks(store: &dyn DocumentStore, tenant: &str, entries: &mut [Entry]) {
    let mut originals: Vec<String> = Vec::new();
    for e in entries.iter() {
        if let Some(orig) = chunk_origin(e) {
            if !originals.iter().any(|o| o == orig) {
                originals.push(orig.to_string());
            }
        }
    }
    if originals.is_empty() {
        return;
    }

    let rows = match store.chunk_siblings(tenant, &originals).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, documents = originals.len(), "chunk sibling lookup failed; keeping chunks");
            return;
        }
    };

    let mut by_origin: HashMap<String, Vec<DocumentRow>> = HashMap::new();
    for row in rows {
        if let Some(orig) = row.original_location.clone() {
            by_origin.entry(orig).or_default().push(row);
        }
    }
    for siblings in by_origin.values_mut() {
        siblings.sort_by(|a, b| {
            chunk::order_key(&a.location)
                .cmp(&chunk::order_key(&b.location))
                .then_with(|| a.location.cmp(&b.location))
        });
    }

    for e in entries.iter_mut() {
        let Some(orig) = chunk_origin(e).map(str::to_string) else {
            continue;
        };
        let Some(siblings) = by_origin.get(&orig).filter(|s| !s.is_empty()) else {
            continue;
        };
        let content = siblings
            .iter()
            .map(|r| r.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        e.item.content = content;
        e.item.name = siblings[0].name.clone();
        e.item.kind = siblings[0].kind.clone();
        e.item.location = orig;
    }
}

fn chunk_origin(e: &Entry) -> Option<&str> {
    if !chunk::is_chunk(&e.item.location) {
        return None;
    }
    e.original_location.as_deref().filter(|o| !o.is_empty())
}
