#[cfg(test)]
mod tests;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::embeddings::EmbeddingProvider;
use crate::{RagError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
const BATCH_SIZE: usize = 100;

/// Hosted embedding provider backed by the OpenAI embeddings API.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedding {
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedding {
    #[inline]
    pub fn new(config: &Config, api_key: String) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key,
            model: config.openai_embedding_model.clone(),
            dimension: config.openai_embedding_dimension,
            agent,
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingsRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| RagError::Embedding(format!("Failed to serialize request: {e}")))?;

        let url = format!("{}/v1/embeddings", self.base_url);
        let response_text = self
            .agent
            .post(&url)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| RagError::Embedding(format!("OpenAI embeddings request failed: {e}")))?;

        let response: EmbeddingsResponse = serde_json::from_str(&response_text).map_err(|e| {
            RagError::Embedding(format!("Failed to parse embeddings response: {e}"))
        })?;

        if response.data.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "Embedding count mismatch: sent {} texts, got {} vectors",
                texts.len(),
                response.data.len()
            )));
        }

        // The API reports each vector's position; order by it rather than
        // trusting response ordering.
        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

impl EmbeddingProvider for OpenAiEmbedding {
    #[inline]
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating OpenAI embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            results.extend(self.embed_batch(batch)?);
        }

        Ok(results)
    }

    #[inline]
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("OpenAI returned no embedding".to_string()))
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    fn name(&self) -> String {
        format!("openai ({})", self.model)
    }
}
