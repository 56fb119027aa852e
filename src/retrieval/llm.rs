// src/retrieval/llm.rs
//! Text generation providers behind one trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::RetrievalError;
use crate::config::LlmConfig;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, RetrievalError>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynGenerator = Arc<dyn TextGenerator>;

/// Factory by `llm.provider`: "openai", "mock", anything else disabled.
/// `AI_TEST_MODE=mock` has already been folded into the provider by config loading.
pub fn build_generator(cfg: &LlmConfig) -> DynGenerator {
    match cfg.provider.as_str() {
        "openai" => Arc::new(OpenAiChat::new(cfg)),
        "mock" => Arc::new(MockGenerator::default()),
        "disabled" => Arc::new(DisabledGenerator),
        other => {
            tracing::warn!(target: "retrieval", provider = other, "unknown llm provider, generation disabled");
            Arc::new(DisabledGenerator)
        }
    }
}

/// OpenAI Chat Completions.
pub struct OpenAiChat {
    http: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiChat {
    pub fn new(cfg: &LlmConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("urban-watch/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiChat {
    async fn generate(&self, prompt: &str) -> Result<String, RetrievalError> {
        if self.api_key.is_empty() {
            return Err(RetrievalError::Unavailable("OPENAI_API_KEY is not set".into()));
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| RetrievalError::Generation(e.to_string()))?;

        if let Err(e) = resp.error_for_status_ref() {
            return Err(RetrievalError::Generation(format!("HTTP error: {e}")));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| RetrievalError::Generation(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| RetrievalError::Generation("no choices in response".into()))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Deterministic generator for local runs and tests: a fixed answer plus the
/// number of context documents it was given.
#[derive(Debug, Clone)]
pub struct MockGenerator {
    pub fixed: String,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self {
            fixed: "Mock answer".to_string(),
        }
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, RetrievalError> {
        let docs = prompt.lines().filter(|l| l.starts_with("Source: ")).count();
        Ok(format!("{} ({docs} context documents)", self.fixed))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Always unavailable.
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, RetrievalError> {
        Err(RetrievalError::Unavailable("text generation is disabled".into()))
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn factory_picks_provider() {
        let mut cfg = LlmConfig {
            provider: "mock".into(),
            ..LlmConfig::default()
        };
        assert_eq!(build_generator(&cfg).name(), "mock");
        cfg.provider = "disabled".into();
        assert_eq!(build_generator(&cfg).name(), "disabled");
        cfg.provider = "claude".into();
        assert_eq!(build_generator(&cfg).name(), "disabled");
        cfg.provider = "openai".into();
        assert_eq!(build_generator(&cfg).name(), "openai");
    }

    #[tokio::test]
    async fn mock_counts_context_blocks() {
        let prompt = "Context:\nSource: traffic\nData: {}\n\nSource: transit\nData: {}\n";
        let out = MockGenerator::default().generate(prompt).await.unwrap();
        assert_eq!(out, "Mock answer (2 context documents)");
    }

    #[tokio::test]
    async fn openai_without_key_is_unavailable() {
        let cfg = LlmConfig {
            provider: "openai".into(),
            api_key: String::new(),
            ..LlmConfig::default()
        };
        let err = OpenAiChat::new(&cfg).generate("q").await.unwrap_err();
        assert!(matches!(err, RetrievalError::Unavailable(_)));
    }
}
