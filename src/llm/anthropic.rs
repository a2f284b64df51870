use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, future, stream};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::llm::{GenerationProvider, SseLineBuffer, TokenStream};
use crate::{RagError, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;
const REQUEST_TIMEOUT_SECONDS: u64 = 300;

/// Generation provider backed by the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicGeneration {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicGeneration {
    #[inline]
    pub fn new(config: &Config, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
            .unwrap_or_default();

        Self {
            base_url: "https://api.anthropic.com".to_string(),
            api_key,
            model: config.anthropic_model.clone(),
            client,
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn send_request(
        &self,
        prompt: &str,
        system: Option<&str>,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            system,
            stream,
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Generation(format!("Anthropic request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!(
                "Anthropic returned HTTP {status}: {body}"
            )));
        }

        Ok(response)
    }
}

/// Extract the text fragment from one SSE data payload, if it carries any.
fn text_from_payload(payload: &str) -> Option<String> {
    let event: StreamEvent = serde_json::from_str(payload).ok()?;
    if event.event_type != "content_block_delta" {
        return None;
    }
    event.delta.and_then(|d| d.text).filter(|t| !t.is_empty())
}

#[async_trait]
impl GenerationProvider for AnthropicGeneration {
    #[inline]
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        debug!("Requesting Anthropic completion ({} chars)", prompt.len());

        let response = self.send_request(prompt, system, false).await?;
        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| RagError::Generation(format!("Failed to parse Anthropic response: {e}")))?;

        Ok(parsed
            .content
            .into_iter()
            .map(|block| block.text)
            .collect())
    }

    #[inline]
    async fn generate_stream(&self, prompt: &str, system: Option<&str>) -> Result<TokenStream> {
        debug!("Requesting Anthropic stream ({} chars)", prompt.len());

        let response = self.send_request(prompt, system, true).await?;

        let stream = response
            .bytes_stream()
            .map_err(|e| RagError::Generation(format!("Anthropic stream failed: {e}")))
            .scan(SseLineBuffer::default(), |buffer, chunk| {
                let fragments: Vec<Result<String>> = match chunk {
                    Ok(bytes) => buffer
                        .push(&String::from_utf8_lossy(&bytes))
                        .iter()
                        .filter_map(|payload| text_from_payload(payload))
                        .map(Ok)
                        .collect(),
                    Err(e) => vec![Err(e)],
                };
                future::ready(Some(stream::iter(fragments)))
            })
            .flatten();

        Ok(Box::pin(stream))
    }

    #[inline]
    fn name(&self) -> String {
        format!("Anthropic ({})", self.model)
    }
}
