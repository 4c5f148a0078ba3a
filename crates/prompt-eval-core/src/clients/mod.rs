//! Capability interfaces for the two external model services.
//!
//! - [`CompletionClient`]: text completions for a prompt
//! - [`EmbeddingClient`]: one vector per input text
//!
//! Concrete bindings are injected at startup: [`openai::OpenAiClient`] for
//! OpenAI-compatible HTTP APIs, [`fakes`] for tests.

use async_trait::async_trait;
use thiserror::Error;

pub mod fakes;
pub mod openai;

/// Embedding vector. Dimensionality is defined by the embeddings model.
pub type Embedding = Vec<f64>;

/// Failure reported by a completion or embedding backend.
///
/// Every variant is treated as transient by the retry layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    /// Transport failure (connect, TLS, body read, client-side timeout)
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Non-success HTTP status (auth, quota, server error)
    #[error("service returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("malformed service response: {0}")]
    MalformedResponse(String),

    /// Backend refused the request for another reason
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::Http(err.to_string())
    }
}

/// Obtain text completions from a configured model.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Request completions for `prompt`. Returns them in service order.
    async fn get_completions(
        &self,
        prompt: &str,
        model: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<Vec<String>, ServiceError>;
}

/// Obtain vector embeddings from a configured model.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed every text. The result has one vector per input, in input
    /// order, all of the same length; the call fails as a whole otherwise.
    async fn embed(&self, texts: &[String], model: &str) -> Result<Vec<Embedding>, ServiceError>;
}
