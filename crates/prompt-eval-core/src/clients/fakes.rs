//! Scripted in-process clients for exercising the evaluation pipeline
//! without network access.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{CompletionClient, Embedding, EmbeddingClient, ServiceError};

#[derive(Debug, Clone)]
enum Reply<T> {
    Ok(T),
    Fail(ServiceError),
    Hang,
}

impl<T: Clone> Reply<T> {
    async fn resolve(self) -> Result<T, ServiceError> {
        match self {
            Reply::Ok(value) => Ok(value),
            Reply::Fail(err) => Err(err),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Parameters of one completion request, as received.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Completion client that replays scripted replies, then a fallback.
#[derive(Debug)]
pub struct FakeCompletionClient {
    script: Mutex<VecDeque<Reply<Vec<String>>>>,
    fallback: Reply<Vec<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
}

impl FakeCompletionClient {
    fn with_fallback(fallback: Reply<Vec<String>>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call returns `completions`.
    pub fn replying<S: Into<String>>(completions: impl IntoIterator<Item = S>) -> Self {
        Self::with_fallback(Reply::Ok(completions.into_iter().map(Into::into).collect()))
    }

    /// Every call fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_fallback(Reply::Fail(ServiceError::Unavailable(message.into())))
    }

    /// Every call waits forever.
    pub fn hanging() -> Self {
        Self::with_fallback(Reply::Hang)
    }

    /// The first `n` calls fail with `message` before the fallback applies.
    pub fn fail_first(self, n: usize, message: impl Into<String>) -> Self {
        let message = message.into();
        if let Ok(mut script) = self.script.lock() {
            for _ in 0..n {
                script.push_back(Reply::Fail(ServiceError::Unavailable(message.clone())));
            }
        }
        self
    }

    /// Number of `get_completions` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionClient for FakeCompletionClient {
    async fn get_completions(
        &self,
        prompt: &str,
        model: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<Vec<String>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(CompletionRequest {
                prompt: prompt.to_string(),
                model: model.to_string(),
                temperature,
                max_tokens,
            });
        }
        let reply = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.fallback.clone());
        reply.resolve().await
    }
}

/// Embedding client backed by a text → vector table.
///
/// Unknown texts map to the default vector.
#[derive(Debug)]
pub struct FakeEmbeddingClient {
    vectors: HashMap<String, Embedding>,
    default: Embedding,
    script: Mutex<VecDeque<Reply<()>>>,
    fallback: Reply<()>,
    latency: Option<Duration>,
    batches: Mutex<Vec<Vec<String>>>,
    calls: AtomicUsize,
}

impl FakeEmbeddingClient {
    pub fn new(default: Embedding) -> Self {
        Self {
            vectors: HashMap::new(),
            default,
            script: Mutex::new(VecDeque::new()),
            fallback: Reply::Ok(()),
            latency: None,
            batches: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        let mut client = Self::new(Vec::new());
        client.fallback = Reply::Fail(ServiceError::Unavailable(message.into()));
        client
    }

    pub fn with_vector(mut self, text: impl Into<String>, vector: Embedding) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    /// The first `n` calls fail with `message`.
    pub fn fail_first(self, n: usize, message: impl Into<String>) -> Self {
        let message = message.into();
        if let Ok(mut script) = self.script.lock() {
            for _ in 0..n {
                script.push_back(Reply::Fail(ServiceError::Unavailable(message.clone())));
            }
        }
        self
    }

    /// Sleep before answering each call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Input batches received so far, in call order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmbeddingClient for FakeEmbeddingClient {
    async fn embed(&self, texts: &[String], _model: &str) -> Result<Vec<Embedding>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(texts.to_vec());
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let reply = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.fallback.clone());
        reply.resolve().await?;

        Ok(texts
            .iter()
            .map(|text| {
                self.vectors
                    .get(text)
                    .cloned()
                    .unwrap_or_else(|| self.default.clone())
            })
            .collect())
    }
}
