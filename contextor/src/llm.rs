//! Chat-completion seam used by the scorer and the generator.

use std::{future::Future, pin::Pin};

use ai_llm_service::{AiLlmError, ChatTurn, CompletionOptions, LlmServiceProfiles, TextStream};

pub type LlmFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AiLlmError>> + Send + 'a>>;

/// What the pipeline needs from a language model.
///
/// Implemented for [`LlmServiceProfiles`]: `complete` runs on the **fast**
/// profile, `complete_stream` on the **slow** one.
pub trait CompletionService: Send + Sync {
    /// Single completion; `messages` include the system instruction.
    fn complete<'a>(
        &'a self,
        messages: &'a [ChatTurn],
        opts: CompletionOptions,
    ) -> LlmFuture<'a, String>;

    /// Streaming completion yielding text deltas.
    fn complete_stream<'a>(
        &'a self,
        messages: &'a [ChatTurn],
        opts: CompletionOptions,
    ) -> LlmFuture<'a, TextStream>;
}

impl CompletionService for LlmServiceProfiles {
    fn complete<'a>(
        &'a self,
        messages: &'a [ChatTurn],
        opts: CompletionOptions,
    ) -> LlmFuture<'a, String> {
        Box::pin(self.generate_fast(messages, opts))
    }

    fn complete_stream<'a>(
        &'a self,
        messages: &'a [ChatTurn],
        opts: CompletionOptions,
    ) -> LlmFuture<'a, TextStream> {
        Box::pin(self.stream_slow(messages, opts))
    }
}
