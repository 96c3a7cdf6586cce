mod json;
mod ollama;
mod openai;

pub use json::{get_i64, get_str, parse_json_response};
pub use ollama::{OllamaEmbedder, OllamaProvider};
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use tracing::info;

use crate::config::Summarization;
use crate::error::Result;

/// A text-generation provider.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String>;
    async fn is_configured(&self) -> bool;
}

/// An embedding provider. Returns one vector per input text, in order;
/// vectors share a dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>>;
}

/// Picks a generation provider from config: the configured one if it is
/// reachable, falling back from Ollama to OpenAI, or None when neither is
/// usable.
pub async fn create_provider(cfg: &Summarization) -> Option<Box<dyn Generator>> {
    if cfg.provider.eq_ignore_ascii_case("ollama") {
        let provider = OllamaProvider::new(cfg.model.clone(), cfg.ollama_url.clone());
        if provider.is_configured().await {
            info!("using Ollama with model: {}", cfg.model);
            return Some(Box::new(provider));
        }
        info!("Ollama not available, trying OpenAI fallback...");
    }

    let provider = OpenAiProvider::from_env(cfg.openai_model.clone(), &cfg.api_key_env);
    if provider.is_configured().await {
        info!("using OpenAI with model: {}", cfg.openai_model);
        return Some(Box::new(provider));
    }

    info!("no LLM provider available; check Ollama is running or set {}", cfg.api_key_env);
    None
}

/// Builds the embedding provider from config.
pub fn create_embedder(cfg: &Summarization) -> Box<dyn Embedder> {
    Box::new(OllamaEmbedder::new(
        cfg.embedding_model.clone(),
        cfg.ollama_url.clone(),
    ))
}
