//! LLM relevance scoring of retrieved candidates.

use ai_llm_service::CompletionOptions;
use tracing::debug;

use crate::{
    api_types::{Candidate, ConversationTurn, ScoredCandidate},
    error::ScoreError,
    llm::CompletionService,
    prompt,
    retry::{self, RetryExhausted, RetryPolicy},
};

/// Score of a critical candidate; never sent to the model.
pub const CRITICAL_SCORE: u8 = 10;
const MAX_SCORE: u8 = 10;

/// Short, near-deterministic replies on the fast profile.
pub const SCORE_OPTIONS: CompletionOptions = CompletionOptions {
    max_tokens: Some(50),
    temperature: Some(0.1),
};

/// Parses a reply of exactly `expected` comma-separated integers in `0..=10`.
pub fn parse_scores(reply: &str, expected: usize) -> Result<Vec<u8>, ScoreError> {
    let parts: Vec<&str> = reply
        .trim()
        .split(',')
        .map(str::trim)
        .collect();
    let scores: Vec<u8> = parts
        .iter()
        .filter_map(|p| p.parse::<u8>().ok())
        .filter(|s| *s <= MAX_SCORE)
        .collect();

    if parts.len() != expected || scores.len() != expected {
        return Err(ScoreError::Malformed {
            expected,
            got: scores.len(),
            reply: reply.to_string(),
        });
    }
    Ok(scores)
}

/// Scores every candidate; `out[i].index` points into `candidates`.
///
/// Critical candidates get [`CRITICAL_SCORE`]. The rest go to the model in
/// sequential batches of `batch_size`, each retried under `policy`; one
/// exhausted batch fails the whole call.
pub async fn score(
    llm: &dyn CompletionService,
    candidates: &[Candidate],
    question: &str,
    turns: &[ConversationTurn],
    batch_size: usize,
    policy: &RetryPolicy,
) -> Result<Vec<ScoredCandidate>, RetryExhausted<ScoreError>> {
    let mut out = Vec::with_capacity(candidates.len());
    let mut pending = Vec::new();

    for (index, c) in candidates.iter().enumerate() {
        if c.is_critical {
            out.push(ScoredCandidate {
                index,
                score: CRITICAL_SCORE,
            });
        } else {
            pending.push(index);
        }
    }

    for indices in pending.chunks(batch_size.max(1)) {
        let batch: Vec<&Candidate> = indices.iter().map(|&i| &candidates[i]).collect();
        let messages = prompt::scoring_messages(&batch, question, turns);
        let msgs = messages.as_slice();
        let n = indices.len();

        let scores = retry::execute(policy, "score_batch", move || async move {
            let reply = llm.complete(msgs, SCORE_OPTIONS).await?;
            parse_scores(&reply, n)
        })
        .await?;

        debug!("score: batch of {n} -> {scores:?}");
        out.extend(
            indices
                .iter()
                .zip(scores)
                .map(|(&index, score)| ScoredCandidate { index, score }),
        );
    }

    Ok(out)
}
