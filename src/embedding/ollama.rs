//! Ollama 임베딩 프로바이더 (로컬)
//!
//! ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-embeddings

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;
use crate::http::post_json_with_retry;

/// 로컬 서버이므로 재시도는 짧게
const MAX_RETRIES: u32 = 1;

/// Ollama 임베딩 구현체
#[derive(Debug)]
pub struct OllamaEmbedding {
    endpoint: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
}

impl OllamaEmbedding {
    /// # Arguments
    /// * `base_url` - Ollama 서버 주소 (예: http://localhost:11434)
    /// * `model` - 임베딩 모델 이름 (예: bge-m3)
    /// * `dimension` - 모델 출력 차원
    pub fn new(base_url: &str, model: &str, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Embedding dimension must be positive");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint: format!("{}/api/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimension,
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let body = post_json_with_retry(
            &self.client,
            &self.endpoint,
            &[],
            &EmbeddingsRequest {
                model: &self.model,
                prompt: text,
            },
            MAX_RETRIES,
        )
        .await
        .context("Ollama embedding request failed")?;

        let response: EmbeddingsResponse =
            serde_json::from_str(&body).context("Failed to parse Ollama embedding response")?;

        if response.embedding.len() != self.dimension {
            anyhow::bail!(
                "Embedding dimension mismatch: model {} returned {}, expected {}",
                self.model,
                response.embedding.len(),
                self.dimension
            );
        }

        Ok(response.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trailing_slash() {
        let e = OllamaEmbedding::new("http://localhost:11434/", "bge-m3", 1024).unwrap();
        assert_eq!(e.endpoint, "http://localhost:11434/api/embeddings");
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(OllamaEmbedding::new("http://localhost:11434", "bge-m3", 0).is_err());
    }
}
