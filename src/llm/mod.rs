//! LLM 모듈 - 텍스트 생성 게이트웨이
//!
//! 클라우드(OpenAI 호환)와 로컬(Ollama) 백엔드가 같은 트레이트 뒤에 있습니다.
//! RAG 답변, 분석 서술, 최적화 초안, Judge 채점이 모두 이 게이트웨이를 씁니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let llm = create_gateway(&config.llm)?;
//! let answer = llm.generate("", "질문", Domain::General).await?;
//! ```

mod ollama;
mod openai;
pub mod prompts;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::agent::Domain;
use crate::config::{LlmBackend, LlmConfig};
use crate::error::{HubError, HubResult};

pub use ollama::OllamaGateway;
pub use openai::OpenAiGateway;

// ============================================================================
// LlmGateway Trait
// ============================================================================

/// LLM 게이트웨이 트레이트
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// 텍스트 생성
    ///
    /// `system_prompt`가 비어 있으면 도메인 기본 프롬프트를 사용합니다.
    async fn generate(&self, system_prompt: &str, user_prompt: &str, domain: Domain)
        -> Result<String>;

    /// 모델 이름
    fn model(&self) -> &str;
}

/// 실제로 보낼 시스템 프롬프트 결정
pub fn resolve_system_prompt(system_prompt: &str, domain: Domain) -> &str {
    if system_prompt.trim().is_empty() {
        prompts::system_prompt_for(domain)
    } else {
        system_prompt
    }
}

// ============================================================================
// Direct Prompt
// ============================================================================

/// 직접 프롬프트 결과
#[derive(Debug, Clone, Serialize)]
pub struct PromptOutput {
    pub output: String,
    pub model: String,
}

/// 검색 없이 프롬프트 하나로 생성
///
/// `system_override`가 없거나 비어 있으면 도메인 기본 시스템 프롬프트를 씁니다.
pub async fn generate_with_domain(
    llm: &dyn LlmGateway,
    user_prompt: &str,
    domain: Domain,
    system_override: Option<&str>,
) -> HubResult<PromptOutput> {
    if user_prompt.trim().is_empty() {
        return Err(HubError::InvalidArgument("prompt must not be empty".into()));
    }

    let system = resolve_system_prompt(system_override.unwrap_or(""), domain);
    let output = llm
        .generate(system, user_prompt, domain)
        .await
        .map_err(|e| HubError::GenerationFailure(format!("{:#}", e)))?;

    Ok(PromptOutput {
        output,
        model: llm.model().to_string(),
    })
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 따라 LLM 게이트웨이 생성
pub fn create_gateway(config: &LlmConfig) -> Result<Arc<dyn LlmGateway>> {
    let gateway: Arc<dyn LlmGateway> = match config.backend {
        LlmBackend::Openai => {
            let Some(api_key) = config.api_key.clone() else {
                anyhow::bail!(
                    "LLM API key not set.\n\
                     Set: export LLM_API_KEY=your-api-key\n\
                     Or switch to a local model: AGENTHUB_LLM__BACKEND=local"
                );
            };
            Arc::new(OpenAiGateway::new(config, api_key)?)
        }
        LlmBackend::Local => Arc::new(OllamaGateway::new(config)?),
    };

    tracing::info!("Using LLM model {}", gateway.model());
    Ok(gateway)
}
