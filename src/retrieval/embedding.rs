// src/retrieval/embedding.rs
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

use super::RetrievalError;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
    /// Provider name for logs and `/api/config`.
    fn name(&self) -> &'static str;
}

/// Local feature-hashing embedder. Each lowercase token is hashed into one of
/// `dimensions` slots with a hash-derived sign; the result is L2-normalised.
/// Same text, same vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for tok in tokenize(text) {
            let digest = Sha256::digest(tok.as_bytes());
            let mut slot = [0u8; 8];
            slot.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(slot) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        l2_normalize(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        Ok(self.embed_sync(text))
    }

    fn name(&self) -> &'static str {
        "hashing"
    }
}

/// Lowercased alphanumeric runs (underscores kept, so `noise_level` is one token).
pub fn tokenize(text: &str) -> Vec<String> {
    static RE_TOKEN: OnceCell<Regex> = OnceCell::new();
    let re = RE_TOKEN.get_or_init(|| Regex::new(r"[\p{L}\p{N}_]+").expect("token regex"));
    let lower = text.to_lowercase();
    re.find_iter(&lower).map(|m| m.as_str().to_string()).collect()
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// OpenAI `/v1/embeddings`. Requires `OPENAI_API_KEY`.
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, model: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("urban-watch/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            api_key,
            model: model.to_string(),
        }
    }

    pub fn from_env(model: &str, timeout: Duration) -> Self {
        Self::new(std::env::var("OPENAI_API_KEY").unwrap_or_default(), model, timeout)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        if self.api_key.is_empty() {
            return Err(RetrievalError::Unavailable("OPENAI_API_KEY is not set".into()));
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            input: &'a str,
        }
        #[derive(Deserialize)]
        struct Resp {
            data: Vec<Item>,
        }
        #[derive(Deserialize)]
        struct Item {
            embedding: Vec<f32>,
        }

        let resp = self
            .http
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(&self.api_key)
            .json(&Req {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        if let Err(e) = resp.error_for_status_ref() {
            return Err(RetrievalError::Embedding(format!("HTTP error: {e}")));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;
        body.data
            .into_iter()
            .next()
            .map(|i| i.embedding)
            .ok_or_else(|| RetrievalError::Embedding("empty embedding response".into()))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
