/// Represents the provider (backend) used for large language model (LLM) inference.
///
/// Both providers are reached through the OpenAI-compatible `/v1` REST surface,
/// so one client implementation serves them; they differ in authentication
/// (OpenAI requires an API key, a local Ollama server does not).
///
/// # Examples
///
/// ```
/// use ai_llm_service::config::llm_provider::LlmProvider;
///
/// let p: LlmProvider = "ollama".parse().unwrap();
/// assert!(!p.requires_api_key());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmProvider {
    /// OpenAI's hosted API.
    OpenAI,
    /// Local Ollama runtime exposing its OpenAI-compatible endpoint.
    Ollama,
}

impl LlmProvider {
    /// Whether a bearer token must be configured for this provider.
    pub fn requires_api_key(self) -> bool {
        matches!(self, LlmProvider::OpenAI)
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "chatgpt" => Ok(LlmProvider::OpenAI),
            "ollama" => Ok(LlmProvider::Ollama),
            other => Err(other.to_string()),
        }
    }
}
