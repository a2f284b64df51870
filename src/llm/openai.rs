use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, future, stream};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::llm::{GenerationProvider, SseLineBuffer, TokenStream};
use crate::{RagError, Result};

const MAX_TOKENS: u32 = 4096;
const REQUEST_TIMEOUT_SECONDS: u64 = 300;

/// Generation provider backed by the OpenAI Chat Completions API.
#[derive(Debug, Clone)]
pub struct OpenAiGeneration {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiGeneration {
    #[inline]
    pub fn new(config: &Config, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
            .unwrap_or_default();

        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key,
            model: config.openai_model.clone(),
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
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: MAX_TOKENS,
            stream,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Generation(format!("OpenAI request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!(
                "OpenAI returned HTTP {status}: {body}"
            )));
        }

        Ok(response)
    }
}

/// Extract the text fragment from one SSE data payload, if it carries any.
fn text_from_payload(payload: &str) -> Option<String> {
    if payload == "[DONE]" {
        return None;
    }
    let chunk: StreamChunk = serde_json::from_str(payload).ok()?;
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl GenerationProvider for OpenAiGeneration {
    #[inline]
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        debug!("Requesting OpenAI completion ({} chars)", prompt.len());

        let response = self.send_request(prompt, system, false).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RagError::Generation(format!("Failed to parse OpenAI response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RagError::Generation("OpenAI returned no choices".to_string()))
    }

    #[inline]
    async fn generate_stream(&self, prompt: &str, system: Option<&str>) -> Result<TokenStream> {
        debug!("Requesting OpenAI stream ({} chars)", prompt.len());

        let response = self.send_request(prompt, system, true).await?;

        let stream = response
            .bytes_stream()
            .map_err(|e| RagError::Generation(format!("OpenAI stream failed: {e}")))
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
        format!("OpenAI ({})", self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server_url: &str) -> OpenAiGeneration {
        OpenAiGeneration::new(&Config::default(), "sk-test".to_string()).with_base_url(server_url)
    }

    #[test]
    fn delta_payloads_yield_text() {
        let payload = r#"{"choices":[{"delta":{"content":"Hi"}}]}"#;
        assert_eq!(text_from_payload(payload), Some("Hi".to_string()));
    }

    #[test]
    fn done_marker_and_empty_deltas_yield_nothing() {
        assert_eq!(text_from_payload("[DONE]"), None);
        assert_eq!(text_from_payload(r#"{"choices":[{"delta":{}}]}"#), None);
        assert_eq!(
            text_from_payload(r#"{"choices":[{"delta":{"content":""}}]}"#),
            None
        );
    }

    #[tokio::test]
    async fn generate_returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [
                    { "message": { "role": "assistant", "content": "The answer." } }
                ]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let answer = client
            .generate("question", Some("system"))
            .await
            .expect("generate should succeed");
        assert_eq!(answer, "The answer.");
    }

    #[tokio::test]
    async fn generate_stream_emits_fragments_until_done() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"One\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" two\"}}]}\n\n",
            "data: [DONE]\n\n",
        );

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let stream = client
            .generate_stream("question", None)
            .await
            .expect("stream should open");

        let fragments: Vec<String> = stream
            .map(|f| f.expect("fragment should be ok"))
            .collect()
            .await;
        assert_eq!(fragments, vec!["One".to_string(), " two".to_string()]);
    }

    #[tokio::test]
    async fn http_error_surfaces_as_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result = client.generate("question", None).await;
        assert!(matches!(result, Err(RagError::Generation(_))));
    }
}
