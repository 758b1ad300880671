use crate::error::SearchError;
use crate::models::RetrievedChunk;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions \
based on provided context. If the answer is not in the context, say \
'I don't have enough information to answer this question.'";

/// Stateless answer step: query plus retrieved context in, answer text out.
/// Fails with `GenerationUnavailable` when the backing service or credential
/// is unreachable or unset; retrieval results remain reportable either way.
#[async_trait]
pub trait AnswerGenerator {
    async fn generate(&self, query: &str, context: &str) -> Result<String, SearchError>;
}

/// Concatenates retrieved chunk texts into the context string handed to the
/// generator, each prefixed with its source filename and page.
pub fn build_context(hits: &[RetrievedChunk]) -> String {
    hits.iter()
        .map(|hit| {
            format!(
                "[Source: {}, Page {}]\n{}",
                hit.filename, hit.page, hit.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GeneratorConfig {
    /// Reads `DOC_RAG_ANSWER_ENDPOINT` / `DOC_RAG_ANSWER_API_KEY` /
    /// `DOC_RAG_ANSWER_MODEL`. Returns `None` when no endpoint is set.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("DOC_RAG_ANSWER_ENDPOINT").ok()?;
        let endpoint = endpoint.trim().to_string();
        if endpoint.is_empty() {
            return None;
        }

        let api_key = std::env::var("DOC_RAG_ANSWER_API_KEY").ok().and_then(|value| {
            let key = value.trim().to_string();
            if key.is_empty() {
                None
            } else {
                Some(key)
            }
        });

        let model = std::env::var("DOC_RAG_ANSWER_MODEL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "llama-3.3-70b-versatile".to_string());

        Some(Self {
            endpoint,
            api_key,
            model,
            temperature: 0.7,
            max_tokens: 1024,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Chat-completions client for the answer step.
pub struct ChatCompletionGenerator {
    config: Option<GeneratorConfig>,
    client: reqwest::Client,
}

impl ChatCompletionGenerator {
    pub fn new(config: Option<GeneratorConfig>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(GeneratorConfig::from_env())
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }
}

#[async_trait]
impl AnswerGenerator for ChatCompletionGenerator {
    async fn generate(&self, query: &str, context: &str) -> Result<String, SearchError> {
        let cfg = self.config.as_ref().ok_or_else(|| {
            SearchError::GenerationUnavailable("no answer endpoint configured".to_string())
        })?;

        let payload = ChatRequest {
            model: &cfg.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!(
                        "Context:\n{context}\n\nQuestion: {query}\n\nPlease provide a clear and \
                         concise answer based on the context above."
                    ),
                },
            ],
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            stream: false,
        };

        let mut request = self.client.post(&cfg.endpoint).json(&payload);
        if let Some(api_key) = &cfg.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|error| {
            SearchError::GenerationUnavailable(format!("answer service unreachable: {error}"))
        })?;

        if !response.status().is_success() {
            return Err(SearchError::GenerationUnavailable(format!(
                "answer service returned {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let answer = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| {
                SearchError::GenerationUnavailable("answer response had no choices".to_string())
            })?;

        Ok(answer)
    }
}
