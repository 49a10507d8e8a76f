//! Streaming answer producer.
//!
//! A spawned task writes [`StreamChunk`]s into a bounded channel. A cached
//! answer is replayed; otherwise the context is assembled, the completion
//! stream is opened (with retries up to its first delta) and every delta is
//! forwarded with typing-pace delays. Dropping the receiver stops the task at
//! its next await point (context assembly, stream opening, send or delay),
//! before any further cache write.

use std::{sync::Arc, time::Duration};

use ai_llm_service::{AiLlmError, ChatTurn, CompletionOptions, TextStream};
use futures::StreamExt;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::{
    Contextor,
    api_types::{ConversationRequest, StreamChunk},
    cache::{CacheNamespace, cache_key},
    cfg::{ContextorConfig, Pacing},
    error::ContextorError,
    prompt, retry,
};

const PROGRESS_EVERY: usize = 50;

/// How a conversation ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A cached answer was replayed.
    Replayed { chunks: usize },
    /// A live answer was streamed and cached.
    Completed { chunks: usize },
    /// A terminal error chunk was sent.
    Failed,
    /// The receiver went away.
    Cancelled,
}

/// Starts the producer task and returns the caller-facing receiver.
pub fn spawn_conversation(
    pipeline: Arc<Contextor>,
    req: ConversationRequest,
) -> mpsc::Receiver<StreamChunk> {
    let (tx, rx) = mpsc::channel(pipeline.config().channel_capacity.max(1));
    tokio::spawn(async move {
        let outcome = run(&pipeline, &req, &tx).await;
        debug!(?outcome, tenant = %req.tenant, mode = req.mode.as_str(), "conversation finished");
    });
    rx
}

/// Drives one conversation into `tx`.
pub async fn run(
    pipeline: &Contextor,
    req: &ConversationRequest,
    tx: &mpsc::Sender<StreamChunk>,
) -> Outcome {
    let key = cache_key(
        CacheNamespace::Conversation,
        pipeline.cache().deployment(),
        &req.tenant,
        req.mode,
        req.agent_scope(),
        &req.question,
    );
    let pacer = Pacer::new(tx, pipeline.config().pacing);

    if let Some(cached) = pipeline
        .cache()
        .get_json::<Vec<String>>(&key)
        .await
        .filter(|c| !c.is_empty())
    {
        info!(chunks = cached.len(), "replaying cached answer");
        return replay(&pacer, cached).await;
    }

    match live(pipeline, req, &key, &pacer).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "conversation failed");
            if tx.send(StreamChunk::error(e.user_message())).await.is_err() {
                Outcome::Cancelled
            } else {
                Outcome::Failed
            }
        }
    }
}

async fn replay(pacer: &Pacer<'_>, chunks: Vec<String>) -> Outcome {
    let n = chunks.len();
    if !pacer.warm_up().await {
        return Outcome::Cancelled;
    }
    for c in chunks {
        if !pacer.emit(StreamChunk::text(c)).await {
            return Outcome::Cancelled;
        }
    }
    if pacer.tx.send(StreamChunk::done()).await.is_err() {
        return Outcome::Cancelled;
    }
    Outcome::Replayed { chunks: n }
}

async fn live(
    pipeline: &Contextor,
    req: &ConversationRequest,
    key: &str,
    pacer: &Pacer<'_>,
) -> Result<Outcome, ContextorError> {
    let cfg = pipeline.config();
    let context = tokio::select! {
        biased;
        _ = pacer.tx.closed() => return Ok(Outcome::Cancelled),
        context = pipeline.find_context(req) => context?,
    };

    let messages = prompt::generation_messages(req, &context, cfg.max_ctx_chars);
    let (first, stream) = tokio::select! {
        biased;
        _ = pacer.tx.closed() => return Ok(Outcome::Cancelled),
        opened = open_stream(pipeline, &messages, cfg) => opened?,
    };
    // `first` is `None` when the stream already ended; polling it again must be a no-op.
    let mut stream = stream.fuse();

    let mut answer: Vec<String> = Vec::new();
    let mut pending = first;
    loop {
        let piece = match pending.take() {
            Some(p) => p,
            None => {
                let next = tokio::select! {
                    item = stream.next() => item,
                    _ = pacer.tx.closed() => return Ok(Outcome::Cancelled),
                };
                match next {
                    Some(Ok(p)) => p,
                    Some(Err(e)) => return Err(ContextorError::Stream(e)),
                    None => break,
                }
            }
        };
        if piece.is_empty() {
            continue;
        }
        if !pacer.emit(StreamChunk::text(piece.clone())).await {
            info!(chunks = answer.len(), "client disconnected mid-answer");
            return Ok(Outcome::Cancelled);
        }
        answer.push(piece);
        if answer.len() % PROGRESS_EVERY == 0 {
            info!(chunks = answer.len(), "streaming answer");
        }
    }

    if pacer.tx.is_closed() {
        return Ok(Outcome::Cancelled);
    }
    if !answer.is_empty() {
        pipeline.cache().set_json(key, &answer, cfg.answer_ttl).await;
    }
    if pacer.tx.send(StreamChunk::done()).await.is_err() {
        return Ok(Outcome::Cancelled);
    }
    Ok(Outcome::Completed {
        chunks: answer.len(),
    })
}

/// Opens the completion stream and pulls its first delta; both steps are
/// retried together.
async fn open_stream(
    pipeline: &Contextor,
    messages: &[ChatTurn],
    cfg: &ContextorConfig,
) -> Result<(Option<String>, TextStream), ContextorError> {
    let llm = pipeline.llm();
    let opened = retry::execute(&cfg.stream_retry, "open_completion_stream", move || async move {
        let mut stream = llm
            .complete_stream(messages, CompletionOptions::default())
            .await?;
        let first = stream.next().await.transpose()?;
        Ok::<_, AiLlmError>((first, stream))
    })
    .await?;
    Ok(opened)
}

/// Paced, cancellation-aware writer over the chunk channel.
struct Pacer<'a> {
    tx: &'a mpsc::Sender<StreamChunk>,
    pacing: Pacing,
}

impl<'a> Pacer<'a> {
    fn new(tx: &'a mpsc::Sender<StreamChunk>, pacing: Pacing) -> Self {
        Self { tx, pacing }
    }

    /// Sleeps unless the receiver goes away first; `false` when it did.
    async fn pause(&self, d: Duration) -> bool {
        if d.is_zero() {
            return !self.tx.is_closed();
        }
        tokio::select! {
            _ = tokio::time::sleep(d) => true,
            _ = self.tx.closed() => false,
        }
    }

    async fn warm_up(&self) -> bool {
        if !self.pacing.enabled {
            return !self.tx.is_closed();
        }
        self.pause(self.pacing.warmup).await
    }

    async fn emit(&self, chunk: StreamChunk) -> bool {
        if self.pacing.enabled && !self.pause(self.chunk_delay()).await {
            return false;
        }
        self.tx.send(chunk).await.is_ok()
    }

    fn chunk_delay(&self) -> Duration {
        let max = self.pacing.jitter.as_millis() as u64;
        let extra = if max == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=max)
        };
        self.pacing.chunk_delay + Duration::from_millis(extra)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use futures::stream;
    use rag_store::{DocumentRow, MemoryStore, StoredDocument};

    use super::*;
    use crate::{
        GENERATE_FAILED, MemoryCache, PromptMode, ResponseCache, RetryPolicy, STREAMING_FAILED,
        testing::{FixedEmbedder, ScriptedLlm},
    };

    struct Fixture {
        pipeline: Arc<Contextor>,
        llm: Arc<ScriptedLlm>,
        embedder: Arc<FixedEmbedder>,
        mem: Arc<MemoryCache>,
    }

    async fn fixture(cfg: ContextorConfig) -> Fixture {
        let store = Arc::new(MemoryStore::new("adev"));
        store
            .insert(StoredDocument {
                tenant: "acme".into(),
                row: DocumentRow {
                    id: "staking".into(),
                    content: "Stake with Pearl".into(),
                    name: "staking".into(),
                    location: "docs/staking".into(),
                    original_location: None,
                    kind: "adev".into(),
                    distance: None,
                },
                embedding: vec![1.0, 0.1],
            })
            .await;
        let llm = Arc::new(ScriptedLlm::new());
        let embedder = Arc::new(FixedEmbedder::new(vec![1.0, 0.0]));
        let mem = Arc::new(MemoryCache::new());
        let pipeline = Arc::new(Contextor::new(
            store,
            embedder.clone(),
            llm.clone(),
            ResponseCache::new(Some(mem.clone()), "prod"),
            cfg,
        ));
        Fixture {
            pipeline,
            llm,
            embedder,
            mem,
        }
    }

    fn request() -> ConversationRequest {
        ConversationRequest::new("How do I stake OLAS?", "acme", PromptMode::General)
    }

    async fn collect(mut rx: mpsc::Receiver<StreamChunk>) -> Vec<StreamChunk> {
        let mut out = Vec::new();
        while let Some(c) = rx.recv().await {
            out.push(c);
        }
        out
    }

    fn answer_key() -> String {
        cache_key(
            CacheNamespace::Conversation,
            "prod",
            "acme",
            PromptMode::General,
            None,
            "How do I stake OLAS?",
        )
    }

    #[tokio::test(start_paused = true)]
    async fn cache_hit_replays_then_done() {
        let f = fixture(ContextorConfig::default()).await;
        f.pipeline
            .cache()
            .set_json(&answer_key(), &vec!["Hello", " world"], Duration::from_secs(60))
            .await;

        let chunks = collect(f.pipeline.stream(request())).await;

        assert_eq!(
            chunks,
            vec![
                StreamChunk::text("Hello"),
                StreamChunk::text(" world"),
                StreamChunk::done()
            ]
        );
        assert_eq!(f.llm.stream_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn live_answer_is_streamed_and_cached() {
        let f = fixture(ContextorConfig::default()).await;

        let chunks = collect(f.pipeline.stream(request())).await;
        assert_eq!(
            chunks,
            vec![
                StreamChunk::text("Hello"),
                StreamChunk::text(" world"),
                StreamChunk::done()
            ]
        );

        let cached: Option<Vec<String>> = f.pipeline.cache().get_json(&answer_key()).await;
        assert_eq!(cached, Some(vec!["Hello".to_string(), " world".to_string()]));

        // second ask replays
        let again = collect(f.pipeline.stream(request())).await;
        assert_eq!(again.len(), 3);
        assert_eq!(f.llm.stream_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_skips_the_answer_cache() {
        let f = fixture(ContextorConfig::default()).await;
        f.llm.push_stream(Box::pin(stream::repeat_with(|| {
            Ok::<_, AiLlmError>("tick".to_string())
        })));

        let mut rx = f.pipeline.stream(request());
        assert_eq!(rx.recv().await, Some(StreamChunk::text("tick")));
        drop(rx);

        tokio::time::sleep(Duration::from_secs(60)).await;

        let keys = f.mem.written_keys();
        assert!(keys.iter().any(|k| k.starts_with("relevantContext:")));
        assert!(!keys.iter().any(|k| k.starts_with("conversation:")));
    }

    #[tokio::test(start_paused = true)]
    async fn pipeline_failure_is_one_error_chunk() {
        let mut cfg = ContextorConfig::default();
        cfg.embed_retry = RetryPolicy::fixed(1, Duration::from_millis(10));
        let f = fixture(cfg).await;
        f.embedder.failures_left.store(10, Ordering::SeqCst);

        let chunks = collect(f.pipeline.stream(request())).await;
        assert_eq!(chunks, vec![StreamChunk::error(GENERATE_FAILED)]);
        assert_eq!(f.embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_open_is_retried_then_fails() {
        let mut cfg = ContextorConfig::default();
        cfg.stream_retry = RetryPolicy::fixed(1, Duration::from_millis(10));
        let f = fixture(cfg).await;
        f.llm.push_stream_error(AiLlmError::Stream("503".into()));
        f.llm.push_stream(Box::pin(stream::iter(vec![Err(AiLlmError::Stream(
            "reset".into(),
        ))])));

        let chunks = collect(f.pipeline.stream(request())).await;
        assert_eq!(chunks, vec![StreamChunk::error(STREAMING_FAILED)]);
        assert_eq!(f.llm.stream_calls.load(Ordering::SeqCst), 2);
        assert!(!f.mem.written_keys().iter().any(|k| k.starts_with("conversation:")));
    }

    #[tokio::test(start_paused = true)]
    async fn mid_stream_error_ends_without_done() {
        let f = fixture(ContextorConfig::default()).await;
        f.llm.push_stream(Box::pin(stream::iter(vec![
            Ok("partial".to_string()),
            Err(AiLlmError::Stream("reset".into())),
        ])));

        let chunks = collect(f.pipeline.stream(request())).await;
        assert_eq!(
            chunks,
            vec![StreamChunk::text("partial"), StreamChunk::error(STREAMING_FAILED)]
        );
        assert_eq!(chunks.iter().filter(|c| c.is_terminal()).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_completion_stream_still_ends_with_done() {
        let f = fixture(ContextorConfig::default()).await;
        f.llm.push_stream(Box::pin(stream::unfold((), |_| async {
            None::<(Result<String, AiLlmError>, ())>
        })));

        let chunks = collect(f.pipeline.stream(request())).await;

        assert_eq!(chunks, vec![StreamChunk::done()]);
        assert!(!f.mem.written_keys().iter().any(|k| k.starts_with("conversation:")));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_before_context_skips_the_pipeline() {
        let f = fixture(ContextorConfig::default()).await;
        for _ in 0..8 {
            f.llm.push_reply("not a score");
        }

        drop(f.pipeline.stream(request()));
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(f.embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.llm.complete_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.llm.stream_calls.load(Ordering::SeqCst), 0);
        assert!(f.mem.written_keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_during_scoring_stops_retries() {
        let f = fixture(ContextorConfig::default()).await;
        for _ in 0..8 {
            f.llm.push_reply("not a score");
        }

        let rx = f.pipeline.stream(request());
        // first scoring attempt fails, the retry waits 1s
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.llm.complete_calls.load(Ordering::SeqCst), 1);
        drop(rx);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(f.llm.complete_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.llm.stream_calls.load(Ordering::SeqCst), 0);
        assert!(!f.mem.written_keys().iter().any(|k| k.starts_with("relevantContext:")));
    }
}
