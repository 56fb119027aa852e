// src/retrieval/mod.rs
//! # Retrieval
//! Every annotated record becomes a document: rendered to text, embedded and
//! appended to an in-memory k-NN index. Questions are embedded the same way; the
//! top-k documents go into a fixed prompt for the text generator, whose answer is
//! returned verbatim.

pub mod embedding;
pub mod index;
pub mod llm;

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use std::fmt::Write as _;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::llm::MAX_LLM_RETRIES;
use crate::config::MonitorConfig;
use crate::event::EventRecord;

pub use embedding::{Embedder, HashingEmbedder, OpenAiEmbedder};
pub use index::{Document, KnnIndex};
pub use llm::{build_generator, DisabledGenerator, MockGenerator, OpenAiChat, TextGenerator};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl RetrievalError {
    /// Transport-level failures are worth another attempt; configuration gaps are not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RetrievalError::Unavailable(_))
    }
}

/// Bounded attempts with a per-attempt deadline; backoff doubles from `base_backoff`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u8,
    pub timeout: Duration,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            timeout: Duration::from_secs(20),
            base_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &MonitorConfig) -> Self {
        Self {
            max_retries: cfg.llm.max_retries.min(MAX_LLM_RETRIES),
            timeout: Duration::from_secs(cfg.llm.timeout_secs),
            ..Self::default()
        }
    }

    /// Run `op` until it succeeds, fails permanently or attempts run out.
    /// Exhausted retries surface as `Unavailable`.
    pub async fn run<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T, RetrievalError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RetrievalError>>,
    {
        let attempts = u32::from(self.max_retries) + 1;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match tokio::time::timeout(self.timeout, op()).await {
                Ok(Ok(v)) => return Ok(v),
                Ok(Err(e)) => e,
                Err(_) => RetrievalError::Timeout(self.timeout),
            };

            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= attempts {
                return Err(RetrievalError::Unavailable(format!(
                    "{what} failed after {attempt} attempts: {err}"
                )));
            }

            tracing::warn!(target: "retrieval", what, attempt, error = %err, "retrying");
            let shift = (attempt - 1).min(16);
            tokio::time::sleep(self.base_backoff.saturating_mul(1u32 << shift)).await;
        }
    }
}

/// Short anonymised id for logging user text.
pub fn query_id(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// One context block per document, blocks separated by a blank line.
pub fn render_context(docs: &[Document]) -> String {
    docs.iter()
        .map(|d| {
            let data = serde_json::to_string(&d.record.payload).unwrap_or_else(|_| "{}".into());
            let loc = serde_json::to_string(&d.record.location).unwrap_or_else(|_| "{}".into());
            format!("Source: {}\nData: {}\nLocation: {}", d.record.source, data, loc)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(question: &str, docs: &[Document]) -> String {
    format!(
        "Based on the following real-time data, answer the question.\n\n\
         Context:\n{}\n\n\
         Question: {}\n\n\
         Answer:",
        render_context(docs),
        question
    )
}

pub struct RagSystem {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn TextGenerator>,
    index: RwLock<KnnIndex>,
    retry: RetryPolicy,
    top_k: usize,
}

impl RagSystem {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn TextGenerator>,
        retry: RetryPolicy,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            generator,
            index: RwLock::new(KnnIndex::new()),
            retry,
            top_k: top_k.max(1),
        }
    }

    /// Embedder by `retrieval.embedder`, generator by `llm.provider`.
    pub fn from_config(cfg: &MonitorConfig) -> Self {
        let embedder: Arc<dyn Embedder> = match cfg.retrieval.embedder.as_str() {
            "openai" => Arc::new(OpenAiEmbedder::from_env(
                &cfg.retrieval.embedding_model,
                Duration::from_secs(cfg.llm.timeout_secs),
            )),
            "hashing" => Arc::new(HashingEmbedder::new(cfg.retrieval.dimensions)),
            other => {
                tracing::warn!(target: "retrieval", embedder = other, "unknown embedder, using hashing");
                Arc::new(HashingEmbedder::new(cfg.retrieval.dimensions))
            }
        };
        let generator = build_generator(&cfg.llm);
        tracing::info!(
            target: "retrieval",
            embedder = embedder.name(),
            generator = generator.name(),
            top_k = cfg.retrieval.top_k,
            "retrieval ready"
        );
        Self::new(embedder, generator, RetryPolicy::from_config(cfg), cfg.retrieval.top_k)
    }

    pub fn default_k(&self) -> usize {
        self.top_k
    }

    pub fn embedder_name(&self) -> &'static str {
        self.embedder.name()
    }

    pub fn generator_name(&self) -> &'static str {
        self.generator.name()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        self.retry.run("embedding", || self.embedder.embed(text)).await
    }

    /// Index one record. Embedding failures propagate; nothing is appended then.
    pub async fn add(&self, record: &EventRecord) -> Result<bool, RetrievalError> {
        let text = record.document_text();
        let embedding = self.embed(&text).await?;
        let count = {
            let mut idx = self.index.write().await;
            idx.insert(record.clone(), text, embedding, Utc::now());
            idx.len()
        };
        gauge!("index_documents").set(count as f64);
        Ok(true)
    }

    /// Up to `k` documents closest to `question`, best first.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<Document>, RetrievalError> {
        let q = self.embed(question).await?;
        let idx = self.index.read().await;
        Ok(idx
            .search(&q, k)
            .into_iter()
            .map(|(_, d)| d.clone())
            .collect())
    }

    /// Retrieve, prompt, generate. The generator's text is returned as is.
    pub async fn query(&self, question: &str, k: usize) -> Result<String, RetrievalError> {
        let id = query_id(question);
        let started = Instant::now();
        counter!("query_total").increment(1);

        let result = async {
            let docs = self.retrieve(question, k).await?;
            let prompt = build_prompt(question, &docs);
            let answer = self
                .retry
                .run("generation", || self.generator.generate(&prompt))
                .await?;
            Ok::<_, RetrievalError>((docs.len(), answer))
        }
        .await;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!("query_duration_ms").record(elapsed_ms);

        match result {
            Ok((docs, answer)) => {
                tracing::info!(target: "retrieval", %id, k, docs, elapsed_ms, "query answered");
                Ok(answer)
            }
            Err(e) => {
                counter!("query_errors_total").increment(1);
                tracing::warn!(target: "retrieval", %id, k, error = %e, "query failed");
                Err(e)
            }
        }
    }

    pub async fn document_count(&self) -> usize {
        self.index.read().await.len()
    }

    /// Snapshot of all indexed documents, oldest first.
    pub async fn documents(&self) -> Vec<Document> {
        self.index.read().await.documents().to_vec()
    }
}
