//! Shared LLM service for the support backend.
//!
//! Three logical profiles are exposed through [`service_profiles::LlmServiceProfiles`]:
//! - **fast**      → cheap, deterministic completions (relevance scoring)
//! - **slow**      → answer generation, consumed as a token stream
//! - **embedding** → question/document embeddings
//!
//! All providers speak the OpenAI-compatible `/v1` API (OpenAI itself or a
//! local Ollama server).

pub mod chat;
pub mod config;
pub mod error_handler;
pub mod service_profiles;
pub mod services;
pub mod telemetry;

pub use chat::{ChatRole, ChatTurn, CompletionOptions, TextStream};
pub use error_handler::AiLlmError;
pub use service_profiles::LlmServiceProfiles;
