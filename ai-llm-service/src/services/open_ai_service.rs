//! Client for OpenAI-compatible REST endpoints.
//!
//! Endpoints are derived from `LlmModelConfig::endpoint`:
//! - POST {endpoint}/v1/chat/completions (plain or `stream: true`)
//! - POST {endpoint}/v1/embeddings
//!
//! The same client serves OpenAI and a local Ollama server; only OpenAI
//! requires a bearer token.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use futures::StreamExt;
use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::{
    chat::{ChatTurn, CompletionOptions, TextStream},
    config::llm_model_config::LlmModelConfig,
    error_handler::{AiLlmError, HttpError, ProviderError, ProviderErrorKind, make_snippet},
    services::sse::{SseDecoder, SseEvent, delta_text},
};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Thin client bound to one model configuration.
///
/// Keeps a preconfigured `reqwest::Client` (timeout and default headers).
///
/// High-level operations:
/// - [`OpenAiService::generate`]: single chat completion
/// - [`OpenAiService::generate_stream`]: chat completion as a delta stream
/// - [`OpenAiService::embeddings`]: single embeddings vector
#[derive(Debug)]
pub struct OpenAiService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_chat: String,
    url_embeddings: String,
}

impl OpenAiService {
    /// Creates a new [`OpenAiService`] from the given config.
    ///
    /// # Errors
    /// - [`AiLlmError::Provider`] with `MissingApiKey` if the provider needs a key and none is set
    /// - [`AiLlmError::Provider`] with `InvalidEndpoint` if `cfg.endpoint` is invalid
    /// - [`AiLlmError::HttpTransport`] if the HTTP client cannot be built
    pub fn new(cfg: LlmModelConfig) -> Result<Self, AiLlmError> {
        let endpoint = cfg.endpoint.trim();
        if endpoint.is_empty()
            || !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(ProviderError::new(
                cfg.provider,
                ProviderErrorKind::InvalidEndpoint(cfg.endpoint.clone()),
            )
            .into());
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        match cfg.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {
                let value = header::HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                    ProviderError::new(
                        cfg.provider,
                        ProviderErrorKind::Decode(format!("invalid API key header: {e}")),
                    )
                })?;
                headers.insert(header::AUTHORIZATION, value);
            }
            _ if cfg.provider.requires_api_key() => {
                return Err(
                    ProviderError::new(cfg.provider, ProviderErrorKind::MissingApiKey).into(),
                );
            }
            _ => {}
        }

        let timeout = Duration::from_secs(cfg.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        let base = endpoint.trim_end_matches('/').to_string();
        let url_chat = format!("{base}/v1/chat/completions");
        let url_embeddings = format!("{base}/v1/embeddings");

        info!(
            provider = ?cfg.provider,
            model = %cfg.model,
            endpoint = %cfg.endpoint,
            timeout_secs = timeout.as_secs(),
            "OpenAiService initialized"
        );

        Ok(Self {
            client,
            cfg,
            url_chat,
            url_embeddings,
        })
    }

    pub fn config(&self) -> &LlmModelConfig {
        &self.cfg
    }

    /// Performs a **non-streaming** chat completion.
    ///
    /// `opts` override the profile's `max_tokens`/`temperature` when set.
    ///
    /// # Errors
    /// - [`AiLlmError::Provider`] with `HttpStatus` for non-2xx responses
    /// - [`AiLlmError::HttpTransport`] for client/network failures
    /// - [`AiLlmError::Provider`] with `Decode` if the JSON cannot be parsed
    /// - [`AiLlmError::Provider`] with `EmptyChoices` if no choices are returned
    pub async fn generate(
        &self,
        messages: &[ChatTurn],
        opts: CompletionOptions,
    ) -> Result<String, AiLlmError> {
        let started = Instant::now();
        let body = ChatCompletionRequest::new(&self.cfg, messages, opts, false);

        debug!(
            model = %self.cfg.model,
            messages = messages.len(),
            "POST {}", self.url_chat
        );

        let resp = self.client.post(&self.url_chat).json(&body).send().await?;
        let resp = self.ensure_success(resp, &self.url_chat, started).await?;

        let out: ChatCompletionResponse = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                error!(
                    error = %e,
                    model = %self.cfg.model,
                    latency_ms = started.elapsed().as_millis(),
                    "failed to decode /v1/chat/completions response"
                );
                return Err(ProviderError::new(
                    self.cfg.provider,
                    ProviderErrorKind::Decode(format!(
                        "serde error: {e}; expected `choices[0].message.content`"
                    )),
                )
                .into());
            }
        };

        let content = out
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .ok_or_else(|| ProviderError::new(self.cfg.provider, ProviderErrorKind::EmptyChoices))?;

        info!(
            model = %self.cfg.model,
            latency_ms = started.elapsed().as_millis(),
            "chat completion completed"
        );

        Ok(content)
    }

    /// Opens a **streaming** chat completion and yields text deltas.
    ///
    /// The returned stream ends after the provider's `[DONE]` marker or when
    /// the body closes. A transport or provider error is yielded once and
    /// then the stream ends.
    ///
    /// # Errors
    /// Errors before the first byte (transport, non-2xx status) are returned
    /// directly so callers can retry opening the stream.
    pub async fn generate_stream(
        &self,
        messages: &[ChatTurn],
        opts: CompletionOptions,
    ) -> Result<TextStream, AiLlmError> {
        let started = Instant::now();
        let body = ChatCompletionRequest::new(&self.cfg, messages, opts, true);

        debug!(
            model = %self.cfg.model,
            messages = messages.len(),
            "POST {} (stream)", self.url_chat
        );

        let resp = self
            .client
            .post(&self.url_chat)
            .header(header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await?;
        let resp = self.ensure_success(resp, &self.url_chat, started).await?;

        info!(
            model = %self.cfg.model,
            latency_ms = started.elapsed().as_millis(),
            "chat stream opened"
        );

        let state = DeltaState {
            body: Box::pin(resp.bytes_stream()),
            decoder: SseDecoder::new(),
            ready: VecDeque::new(),
            finished: false,
        };

        let stream = futures::stream::unfold(state, |mut st| async move {
            loop {
                if let Some(item) = st.ready.pop_front() {
                    return Some((item, st));
                }
                if st.finished {
                    return None;
                }
                match st.body.next().await {
                    Some(Ok(bytes)) => {
                        let events = st.decoder.push(&bytes);
                        st.absorb(events);
                    }
                    Some(Err(e)) => {
                        st.ready.push_back(Err(AiLlmError::HttpTransport(e)));
                        st.finished = true;
                    }
                    None => {
                        let events = st.decoder.finish();
                        st.absorb(events);
                        st.finished = true;
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }

    /// Retrieves a single embeddings vector via `/v1/embeddings`.
    ///
    /// # Errors
    /// - [`AiLlmError::Provider`] with `HttpStatus` for non-2xx responses
    /// - [`AiLlmError::HttpTransport`] for client/network failures
    /// - [`AiLlmError::Provider`] with `Decode` if the JSON cannot be parsed
    pub async fn embeddings(&self, input: &str) -> Result<Vec<f32>, AiLlmError> {
        let started = Instant::now();
        let body = EmbeddingsRequest {
            model: &self.cfg.model,
            input,
        };

        debug!(
            model = %self.cfg.model,
            input_len = input.len(),
            "POST {}", self.url_embeddings
        );

        let resp = self
            .client
            .post(&self.url_embeddings)
            .json(&body)
            .send()
            .await?;
        let resp = self
            .ensure_success(resp, &self.url_embeddings, started)
            .await?;

        let out: EmbeddingsResponse = resp.json().await.map_err(|e| {
            error!(
                error = %e,
                model = %self.cfg.model,
                latency_ms = started.elapsed().as_millis(),
                "failed to decode /v1/embeddings response"
            );
            ProviderError::new(
                self.cfg.provider,
                ProviderErrorKind::Decode(format!("serde error: {e}; expected `data[0].embedding`")),
            )
        })?;

        let first = out.data.into_iter().next().ok_or_else(|| {
            ProviderError::new(
                self.cfg.provider,
                ProviderErrorKind::Decode("empty `data` in embeddings response".into()),
            )
        })?;

        debug!(
            model = %self.cfg.model,
            dim = first.embedding.len(),
            latency_ms = started.elapsed().as_millis(),
            "embeddings completed"
        );

        Ok(first.embedding)
    }

    async fn ensure_success(
        &self,
        resp: reqwest::Response,
        url: &str,
        started: Instant,
    ) -> Result<reqwest::Response, AiLlmError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().await.unwrap_or_default();
        let snippet = make_snippet(&text);

        error!(
            %status,
            %url,
            %snippet,
            model = %self.cfg.model,
            latency_ms = started.elapsed().as_millis(),
            "provider returned non-success status"
        );

        Err(ProviderError::new(
            self.cfg.provider,
            ProviderErrorKind::HttpStatus(HttpError {
                status,
                url: url.to_string(),
                snippet,
            }),
        )
        .into())
    }
}

type ByteStream =
    std::pin::Pin<Box<dyn futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>;

struct DeltaState {
    body: ByteStream,
    decoder: SseDecoder,
    ready: VecDeque<Result<String, AiLlmError>>,
    finished: bool,
}

impl DeltaState {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for ev in events {
            if self.finished {
                return;
            }
            match ev {
                SseEvent::Done => self.finished = true,
                SseEvent::Data(payload) => match delta_text(&payload) {
                    Ok(Some(text)) => self.ready.push_back(Ok(text)),
                    Ok(None) => {}
                    Err(e) => {
                        self.ready.push_back(Err(e));
                        self.finished = true;
                    }
                },
            }
        }
    }
}

/* ===========================================================================
HTTP payloads
======================================================================== */

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

impl<'a> ChatCompletionRequest<'a> {
    fn new(
        cfg: &'a LlmModelConfig,
        messages: &'a [ChatTurn],
        opts: CompletionOptions,
        stream: bool,
    ) -> Self {
        Self {
            model: &cfg.model,
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: opts.temperature.or(cfg.temperature),
            top_p: cfg.top_p,
            max_tokens: opts.max_tokens.or(cfg.max_tokens),
            stream,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageOut,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::llm_provider::LlmProvider;

    fn cfg(provider: LlmProvider, key: Option<&str>) -> LlmModelConfig {
        LlmModelConfig {
            provider,
            model: "gpt-4o-mini".into(),
            endpoint: "https://api.openai.com/".into(),
            api_key: key.map(str::to_string),
            max_tokens: Some(50),
            temperature: Some(0.1),
            top_p: None,
            timeout_secs: Some(5),
        }
    }

    #[test]
    fn openai_requires_key_but_ollama_does_not() {
        assert!(OpenAiService::new(cfg(LlmProvider::OpenAI, None)).is_err());
        assert!(OpenAiService::new(cfg(LlmProvider::Ollama, None)).is_ok());
        let svc = OpenAiService::new(cfg(LlmProvider::OpenAI, Some("sk-test"))).unwrap();
        assert_eq!(svc.url_chat, "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn bad_endpoint_is_rejected() {
        let mut c = cfg(LlmProvider::Ollama, None);
        c.endpoint = "localhost:11434".into();
        assert!(OpenAiService::new(c).is_err());
    }

    #[test]
    fn request_applies_overrides_and_stream_flag() {
        let c = cfg(LlmProvider::OpenAI, Some("k"));
        let msgs = vec![ChatTurn::system("sys"), ChatTurn::user("hi")];
        let opts = CompletionOptions {
            max_tokens: Some(7),
            temperature: None,
        };

        let body = serde_json::to_value(ChatCompletionRequest::new(&c, &msgs, opts, true)).unwrap();
        assert_eq!(body["max_tokens"], 7);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");

        let plain =
            serde_json::to_value(ChatCompletionRequest::new(&c, &msgs, Default::default(), false))
                .unwrap();
        assert!(plain.get("stream").is_none());
        assert_eq!(plain["max_tokens"], 50);
    }

    #[test]
    fn delta_state_stops_at_done() {
        let mut st = DeltaState {
            body: Box::pin(futures::stream::empty::<reqwest::Result<bytes::Bytes>>()),
            decoder: SseDecoder::new(),
            ready: VecDeque::new(),
            finished: false,
        };
        let events = st.decoder.push(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n",
        );
        st.absorb(events);
        assert!(st.finished);
        assert_eq!(st.ready.len(), 1);
        assert_eq!(st.ready.pop_front().unwrap().unwrap(), "Hi");
    }
}
