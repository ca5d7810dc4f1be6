//! OpenAI 호환 Chat Completions 게이트웨이 (클라우드)
//!
//! ref: https://platform.openai.com/docs/api-reference/chat/create

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{resolve_system_prompt, LlmGateway};
use crate::agent::Domain;
use crate::config::LlmConfig;
use crate::http::{post_json_with_retry, RateLimiter};

const RATE_LIMIT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
const MIN_DELAY: Duration = Duration::from_millis(200);
const MAX_RETRIES: u32 = 3;

/// OpenAI 호환 API 구현체
#[derive(Debug)]
pub struct OpenAiGateway {
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl OpenAiGateway {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(
                RATE_LIMIT_RPM,
                RATE_LIMIT_WINDOW,
                MIN_DELAY,
            ))),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmGateway for OpenAiGateway {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        domain: Domain,
    ) -> Result<String> {
        self.rate_limiter.lock().await.acquire().await;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: resolve_system_prompt(system_prompt, domain),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let authorization = format!("Bearer {}", self.api_key);
        tracing::debug!("Calling {} at {}", self.model, self.endpoint);

        let body = post_json_with_retry(
            &self.client,
            &self.endpoint,
            &[("Authorization", authorization.as_str())],
            &request,
            MAX_RETRIES,
        )
        .await
        .context("Chat completion request failed")?;

        let response: ChatResponse =
            serde_json::from_str(&body).context("Failed to parse chat completion response")?;

        let output = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("No choices in chat completion response"))?;

        Ok(output)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_from_api_base() {
        let config = LlmConfig {
            api_base: "https://llm.example.com/v1/".to_string(),
            ..LlmConfig::default()
        };
        let gateway = OpenAiGateway::new(&config, "sk-test".to_string()).unwrap();
        assert_eq!(gateway.endpoint, "https://llm.example.com/v1/chat/completions");
        assert_eq!(gateway.model(), "gpt-4o-mini");
    }

    #[test]
    fn test_parse_chat_response() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}]}"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.choices[0].message.content.as_deref(), Some("hi"));
    }
}
