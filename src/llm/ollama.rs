//! Ollama 생성 게이트웨이 (로컬)
//!
//! `/api/generate`는 시스템 메시지가 따로 없어서 지시문과 질문을
//! 하나의 프롬프트로 합쳐 보냅니다.
//! ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-completion

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{resolve_system_prompt, LlmGateway};
use crate::agent::Domain;
use crate::config::LlmConfig;
use crate::http::post_json_with_retry;

/// 로컬 서버이므로 재시도는 짧게
const MAX_RETRIES: u32 = 1;

/// Ollama 구현체
#[derive(Debug)]
pub struct OllamaGateway {
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OllamaGateway {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint: format!("{}/api/generate", config.local_base_url.trim_end_matches('/')),
            model: config.local_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// 지시문 + 질문을 단일 프롬프트로 합침
fn combine_prompt(system_prompt: &str, user_prompt: &str) -> String {
    format!("[지시]\n{}\n\n[사용자 질문]\n{}", system_prompt, user_prompt)
}

#[async_trait]
impl LlmGateway for OllamaGateway {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        domain: Domain,
    ) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: combine_prompt(resolve_system_prompt(system_prompt, domain), user_prompt),
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        tracing::debug!("Calling local LLM {} at {}", self.model, self.endpoint);

        let body = post_json_with_retry(&self.client, &self.endpoint, &[], &request, MAX_RETRIES)
            .await
            .context("Ollama generate request failed")?;

        let response: GenerateResponse =
            serde_json::from_str(&body).context("Failed to parse Ollama generate response")?;

        Ok(response.response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
