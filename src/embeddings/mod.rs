// Embedding providers
// Turns chunk text into fixed-length vectors via a pluggable HTTP backend

pub mod ollama;
pub mod openai;

use crate::config::Config;
use crate::{RagError, Result};

pub use ollama::OllamaEmbedding;
pub use openai::OpenAiEmbedding;

/// A pluggable text-to-vector capability.
///
/// `dimension` is constant for the provider's lifetime, and every vector it
/// returns has exactly that length. Batching strategy is the provider's own
/// concern; callers see ordered output matching ordered input.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts. Output order matches input order; an empty
    /// input yields an empty output.
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>>;

    /// Fixed output dimension of this provider's vectors.
    fn dimension(&self) -> usize;

    /// Provider id for display.
    fn name(&self) -> String;
}

/// Build an embedding provider from its string id.
///
/// Credential validation happens here, before any folder I/O: selecting a
/// hosted provider without its API key fails immediately.
#[inline]
pub fn embedding_provider(id: &str, config: &Config) -> Result<Box<dyn EmbeddingProvider>> {
    match id {
        "ollama" => Ok(Box::new(OllamaEmbedding::new(config)?)),
        "openai" => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                RagError::Config(
                    "OPENAI_API_KEY is required for the openai embedding provider".to_string(),
                )
            })?;
            Ok(Box::new(OpenAiEmbedding::new(config, api_key)))
        }
        other => Err(RagError::Config(format!(
            "Unknown embedding provider: {other} (expected 'ollama' or 'openai')"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_a_config_error() {
        let config = Config::default();
        let result = embedding_provider("chroma", &config);
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[test]
    fn openai_without_key_fails_before_any_io() {
        let config = Config {
            openai_api_key: None,
            ..Config::default()
        };
        let err = embedding_provider("openai", &config).err().expect("must fail");
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn ollama_needs_no_credential() {
        let config = Config::default();
        let provider = embedding_provider("ollama", &config).expect("should build");
        assert_eq!(provider.dimension(), 768);
        assert_eq!(provider.name(), "ollama (nomic-embed-text)");
    }

    #[test]
    fn openai_with_key_builds() {
        let config = Config {
            openai_api_key: Some("sk-test".to_string()),
            ..Config::default()
        };
        let provider = embedding_provider("openai", &config).expect("should build");
        assert_eq!(provider.dimension(), 1536);
    }
}
