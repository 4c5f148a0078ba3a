//! OpenAI-compatible HTTP bindings for both capabilities.
//!
//! - completions: `POST {base_url}/chat/completions` with a single user
//!   message and `n` choices
//! - embeddings: `POST {base_url}/embeddings` with a batched `input`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{CompletionClient, Embedding, EmbeddingClient, ServiceError};

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Connection settings for an OpenAI-compatible API
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Bearer token
    pub api_key: String,
    /// API root, without trailing slash (e.g. "https://api.openai.com/v1")
    pub base_url: String,
    /// Number of completions (`n`) requested per prompt
    pub completions_per_prompt: u32,
    /// Whole-request timeout applied by the HTTP client
    pub request_timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            completions_per_prompt: 1,
            request_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_completions_per_prompt(mut self, n: u32) -> Self {
        self.completions_per_prompt = n.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Client for an OpenAI-compatible API, implementing both
/// [`CompletionClient`] and [`EmbeddingClient`].
#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.config.base_url)
            .field("completions_per_prompt", &self.config.completions_per_prompt)
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, ServiceError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| ServiceError::Unavailable(format!("invalid API key header: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("prompt-eval/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ServiceError>
    where
        Req: Serialize + ?Sized,
        Resp: for<'de> Deserialize<'de>,
    {
        let response = self.http_client.post(self.url(path)).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorResponse>().await {
                Ok(body) => body.error.message,
                Err(_) => status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string(),
            };
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| ServiceError::MalformedResponse(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f64,
    max_tokens: u32,
    n: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    index: u32,
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f64>,
}

/// Completions in choice order. A choice without text is malformed.
fn collect_completions(mut response: ChatResponse) -> Result<Vec<String>, ServiceError> {
    response.choices.sort_by_key(|c| c.index);
    response
        .choices
        .into_iter()
        .map(|choice| {
            choice.message.content.ok_or_else(|| {
                ServiceError::MalformedResponse(format!("choice {} has no content", choice.index))
            })
        })
        .collect()
}

/// Vectors in input order; exactly one per input, uniform length.
fn collect_embeddings(
    response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Embedding>, ServiceError> {
    if response.data.len() != expected {
        return Err(ServiceError::MalformedResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            response.data.len()
        )));
    }

    let mut slots: Vec<Option<Embedding>> = vec![None; expected];
    for item in response.data {
        let slot = slots.get_mut(item.index).ok_or_else(|| {
            ServiceError::MalformedResponse(format!("embedding index {} out of range", item.index))
        })?;
        if slot.replace(item.embedding).is_some() {
            return Err(ServiceError::MalformedResponse(format!(
                "duplicate embedding index {}",
                item.index
            )));
        }
    }

    let vectors: Vec<Embedding> = slots.into_iter().flatten().collect();
    if let Some(first) = vectors.first() {
        let dim = first.len();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(ServiceError::MalformedResponse(format!(
                "embedding dimensions differ: {} vs {}",
                dim,
                bad.len()
            )));
        }
    }
    Ok(vectors)
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn get_completions(
        &self,
        prompt: &str,
        model: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<Vec<String>, ServiceError> {
        let request = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
            max_tokens,
            n: self.config.completions_per_prompt,
        };

        let response: ChatResponse = self.post("chat/completions", &request).await?;
        let completions = collect_completions(response)?;
        debug!(count = completions.len(), "received completions");
        Ok(completions)
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiClient {
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed(&self, texts: &[String], model: &str) -> Result<Vec<Embedding>, ServiceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model,
            input: texts,
        };
        let response: EmbeddingResponse = self.post("embeddings", &request).await?;
        collect_embeddings(response, texts.len())
    }
}
