// src/config/llm.rs
use serde::{Deserialize, Serialize};
use std::env;

fn default_provider() -> String {
    "mock".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_timeout_secs() -> u64 {
    20
}
/// Upper bound applied by `normalize`.
pub const MAX_LLM_RETRIES: u8 = 10;

fn default_max_retries() -> u8 {
    2
}

/// Text-generation settings for the query responder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai" | "mock" | "disabled" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default = "default_api_key", skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-attempt deadline for external calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra attempts after the first failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: default_api_key(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl LlmConfig {
    /// Normalize provider, resolve the API key and clamp numeric knobs.
    ///
    /// A missing `OPENAI_API_KEY` is not an error here: the OpenAI client then
    /// reports every call as unavailable, which keeps ingestion running.
    pub fn normalize(&mut self) {
        self.provider = self.provider.trim().to_ascii_lowercase();

        let key = self.api_key.trim();
        if key.is_empty() || key.eq_ignore_ascii_case("env") {
            self.api_key = match self.provider.as_str() {
                "openai" => env::var("OPENAI_API_KEY").unwrap_or_default(),
                _ => String::new(),
            };
        }

        if !self.temperature.is_finite() {
            self.temperature = default_temperature();
        }
        self.temperature = self.temperature.clamp(0.0, 2.0);
        if self.timeout_secs == 0 {
            self.timeout_secs = default_timeout_secs();
        }
        self.max_retries = self.max_retries.min(MAX_LLM_RETRIES);
    }
}

fn default_embedder() -> String {
    "hashing".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dimensions() -> usize {
    256
}
fn default_top_k() -> usize {
    5
}
fn default_queue_capacity() -> usize {
    1024
}

/// Embedding + index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// "hashing" | "openai"
    #[serde(default = "default_embedder")]
    pub embedder: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Vector size of the local hashing embedder.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Pending documents between the evaluator and the indexer task.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            embedder: default_embedder(),
            embedding_model: default_embedding_model(),
            dimensions: default_dimensions(),
            top_k: default_top_k(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl RetrievalConfig {
    pub fn normalize(&mut self) {
        self.embedder = self.embedder.trim().to_ascii_lowercase();
        self.dimensions = self.dimensions.clamp(8, 4096);
        self.top_k = self.top_k.max(1);
        self.queue_capacity = self.queue_capacity.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_and_clamps() {
        let mut c = LlmConfig {
            provider: " Mock ".into(),
            api_key: "ENV".into(),
            temperature: 9.0,
            timeout_secs: 0,
            max_retries: 255,
            ..LlmConfig::default()
        };
        c.normalize();
        assert_eq!(c.provider, "mock");
        assert!(c.api_key.is_empty());
        assert!((c.temperature - 2.0).abs() < 1e-6);
        assert_eq!(c.timeout_secs, 20);
        assert_eq!(c.max_retries, MAX_LLM_RETRIES);
    }

    #[test]
    fn retrieval_bounds() {
        let mut r = RetrievalConfig {
            dimensions: 1,
            top_k: 0,
            ..RetrievalConfig::default()
        };
        r.normalize();
        assert_eq!(r.dimensions, 8);
        assert_eq!(r.top_k, 1);
    }
}
