// Generation providers
// Prompt-to-text capability, synchronous or as an incremental token stream

pub mod anthropic;
pub mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::Config;
use crate::{RagError, Result};

pub use anthropic::AnthropicGeneration;
pub use openai::OpenAiGeneration;

/// A lazy, finite, non-restartable sequence of answer fragments.
///
/// Dropping the stream early cancels generation without side effects on any
/// persisted state.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// A pluggable prompt-to-text capability.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate a complete answer for the prompt.
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String>;

    /// Generate an answer as an incremental stream of text fragments, in
    /// emission order.
    async fn generate_stream(&self, prompt: &str, system: Option<&str>) -> Result<TokenStream>;

    /// Human-readable provider name for display.
    fn name(&self) -> String;
}

/// Build a generation provider from its string id.
///
/// Credential validation happens here, before any folder I/O.
#[inline]
pub fn generation_provider(id: &str, config: &Config) -> Result<Box<dyn GenerationProvider>> {
    match id {
        "anthropic" => {
            let api_key = config.anthropic_api_key.clone().ok_or_else(|| {
                RagError::Config(
                    "ANTHROPIC_API_KEY is required for the anthropic provider".to_string(),
                )
            })?;
            Ok(Box::new(AnthropicGeneration::new(config, api_key)))
        }
        "openai" => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                RagError::Config("OPENAI_API_KEY is required for the openai provider".to_string())
            })?;
            Ok(Box::new(OpenAiGeneration::new(config, api_key)))
        }
        other => Err(RagError::Config(format!(
            "Unknown LLM provider: {other} (expected 'anthropic' or 'openai')"
        ))),
    }
}

/// Incremental server-sent-events line buffer.
///
/// Byte chunks from the wire do not align with event boundaries; this
/// accumulates them and yields the payload of each complete `data:` line.
#[derive(Debug, Default)]
pub(crate) struct SseLineBuffer {
    buffer: String,
}

impl SseLineBuffer {
    /// Feed a decoded chunk, returning the `data:` payloads of every line
    /// completed by it.
    pub(crate) fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);

        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end();
            if let Some(payload) = line.strip_prefix("data:") {
                payloads.push(payload.trim_start().to_string());
            }
        }
        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_a_config_error() {
        let config = Config::default();
        assert!(matches!(
            generation_provider("gemini", &config),
            Err(RagError::Config(_))
        ));
    }

    #[test]
    fn missing_credentials_fail_with_named_error() {
        let config = Config {
            anthropic_api_key: None,
            openai_api_key: None,
            ..Config::default()
        };

        let err = generation_provider("anthropic", &config)
            .err()
            .expect("must fail");
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));

        let err = generation_provider("openai", &config)
            .err()
            .expect("must fail");
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn providers_build_when_credentials_present() {
        let config = Config {
            anthropic_api_key: Some("sk-ant".to_string()),
            openai_api_key: Some("sk-oai".to_string()),
            ..Config::default()
        };
        assert!(generation_provider("anthropic", &config).is_ok());
        assert!(generation_provider("openai", &config).is_ok());
    }

    #[test]
    fn sse_buffer_handles_split_lines() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push("data: {\"par").is_empty());
        let payloads = buffer.push("tial\": 1}\n\n");
        assert_eq!(payloads, vec!["{\"partial\": 1}".to_string()]);
    }

    #[test]
    fn sse_buffer_ignores_event_and_comment_lines() {
        let mut buffer = SseLineBuffer::default();
        let payloads = buffer.push("event: message_start\n: keepalive\ndata: hello\n");
        assert_eq!(payloads, vec!["hello".to_string()]);
    }

    #[test]
    fn sse_buffer_yields_multiple_payloads_from_one_chunk() {
        let mut buffer = SseLineBuffer::default();
        let payloads = buffer.push("data: a\n\ndata: b\n\ndata: [DONE]\n");
        assert_eq!(payloads, vec!["a", "b", "[DONE]"]);
    }
}
