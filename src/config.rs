//! 설정 모듈 - figment 기반 계층형 설정
//!
//! 우선순위 (뒤가 앞을 덮어씀):
//! 1. 내장 기본값
//! 2. `~/.agenthub-rag/config.toml`
//! 3. `./agenthub.toml`
//! 4. `AGENTHUB_*` 환경변수 (`__`로 섹션 구분, 예: `AGENTHUB_LLM__BACKEND=openai`)
//!
//! 코어는 환경을 직접 읽지 않습니다. 여기서 만든 `AppConfig` 값이
//! 각 생성자에 명시적으로 전달됩니다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::HubError;

/// 환경변수 접두사
const ENV_PREFIX: &str = "AGENTHUB_";

/// 프로젝트 로컬 설정 파일
const LOCAL_CONFIG_FILE: &str = "agenthub.toml";

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.agenthub-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agenthub-rag")
}

// ============================================================================
// Types
// ============================================================================

/// 전체 애플리케이션 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 데이터 디렉토리 (미지정 시 ~/.agenthub-rag/)
    pub data_dir: Option<PathBuf>,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub pipeline: PipelineConfig,
    pub ingest: IngestConfig,
}

/// LLM 백엔드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// OpenAI 호환 API (클라우드)
    #[serde(alias = "cloud")]
    Openai,
    /// 로컬 LLM (Ollama)
    #[serde(alias = "ollama")]
    Local,
}

/// LLM 게이트웨이 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    /// OpenAI 호환 API 베이스 URL
    pub api_base: String,
    /// API 키 (없으면 LLM_API_KEY / OPENAI_API_KEY 환경변수)
    pub api_key: Option<String>,
    pub model: String,
    /// 로컬 LLM 베이스 URL (Ollama)
    pub local_base_url: String,
    pub local_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// HTTP 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// 샘플링 설정 검증
    pub fn validate(&self) -> Result<(), HubError> {
        if !(self.temperature.is_finite() && (0.0..=2.0).contains(&self.temperature)) {
            return Err(HubError::Config(format!(
                "llm.temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(HubError::Config("llm.max_tokens must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Local,
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            local_base_url: "http://localhost:11434".to_string(),
            local_model: "qwen2.5:7b".to_string(),
            temperature: 0.2,
            max_tokens: 512,
            timeout_secs: 120,
        }
    }
}

/// 임베딩 백엔드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Gemini API (클라우드)
    Gemini,
    /// Ollama 임베딩 (로컬)
    #[serde(alias = "local")]
    Ollama,
}

/// 임베딩 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub dimension: usize,
    pub local_base_url: String,
    pub local_model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Gemini,
            dimension: 768,
            local_base_url: "http://localhost:11434".to_string(),
            local_model: "bge-m3".to_string(),
        }
    }
}

/// 하이브리드 검색 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// 퓨전 후 최종 결과 수
    pub top_k: usize,
    /// 백엔드별 후보 수 (퓨전 전)
    pub candidate_k: usize,
    /// RRF 평활 상수
    pub rrf_constant: f64,
    /// 기본 하이브리드 모드 여부
    pub use_hybrid: bool,
    /// 백엔드별 타임아웃 (ms)
    pub backend_timeout_ms: u64,
    /// 컨텍스트 예산 (문자 수)
    pub context_budget_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            candidate_k: 20,
            rrf_constant: 60.0,
            use_hybrid: false,
            backend_timeout_ms: 5000,
            context_budget_chars: 6000,
        }
    }
}

impl RetrievalConfig {
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

/// 에이전트 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 통과 기준 점수 (0~100)
    pub judge_threshold: u8,
    /// 최대 시도 횟수 (구조 실패 + Judge 실패 공유)
    pub retry_budget: u32,
    /// LLM 호출당 타임아웃 (ms)
    pub call_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            judge_threshold: 80,
            retry_budget: 3,
            call_timeout_ms: 120_000,
        }
    }
}

impl PipelineConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// 파이프라인 설정 검증
    pub fn validate(&self) -> Result<(), HubError> {
        if self.judge_threshold > 100 {
            return Err(HubError::Config(format!(
                "pipeline.judge_threshold must be within 0..=100, got {}",
                self.judge_threshold
            )));
        }
        if self.retry_budget == 0 {
            return Err(HubError::Config(
                "pipeline.retry_budget must be at least 1".to_string(),
            ));
        }
        if self.call_timeout_ms == 0 {
            return Err(HubError::Config(
                "pipeline.call_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// 수집(ingest) 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// 청크 당 단어 수
    pub chunk_size: usize,
    /// 청크 간 중첩 단어 수
    pub overlap: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            overlap: 64,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl AppConfig {
    /// 기본 위치에서 설정 로드
    pub fn load() -> Result<Self> {
        let global = get_data_dir().join("config.toml");
        Self::load_from(&[global.as_path(), Path::new(LOCAL_CONFIG_FILE)])
    }

    /// 지정된 TOML 파일들에서 설정 로드 (없는 파일은 무시)
    pub fn load_from(files: &[&Path]) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        for file in files {
            figment = figment.merge(Toml::file(file));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config: AppConfig = figment
            .extract()
            .context("Failed to load configuration")?;

        if config.llm.api_key.is_none() {
            config.llm.api_key = env_api_key();
        }

        config.validate()?;
        tracing::debug!("Configuration loaded: {:?}", config.redacted());
        Ok(config)
    }

    /// 실제 데이터 디렉토리
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(get_data_dir)
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<(), HubError> {
        if self.retrieval.top_k == 0 {
            return Err(HubError::Config("retrieval.top_k must be at least 1".into()));
        }
        if self.retrieval.candidate_k == 0 {
            return Err(HubError::Config(
                "retrieval.candidate_k must be at least 1".into(),
            ));
        }
        if !(self.retrieval.rrf_constant.is_finite() && self.retrieval.rrf_constant > 0.0) {
            return Err(HubError::Config(format!(
                "retrieval.rrf_constant must be a positive number, got {}",
                self.retrieval.rrf_constant
            )));
        }
        if self.ingest.chunk_size == 0 || self.ingest.overlap >= self.ingest.chunk_size {
            return Err(HubError::Config(format!(
                "ingest.overlap ({}) must be smaller than ingest.chunk_size ({})",
                self.ingest.overlap, self.ingest.chunk_size
            )));
        }
        self.llm.validate()?;
        self.pipeline.validate()
    }

    /// 로그 출력용 (API 키 마스킹)
    fn redacted(&self) -> AppConfig {
        let mut copy = self.clone();
        if copy.llm.api_key.is_some() {
            copy.llm.api_key = Some("***".to_string());
        }
        copy
    }
}

/// LLM API 키 환경변수 조회
///
/// 우선순위: LLM_API_KEY > OPENAI_API_KEY
fn env_api_key() -> Option<String> {
    ["LLM_API_KEY", "OPENAI_API_KEY"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|key| !key.is_empty())
}

// ============================================================================
// Tests
// ============================================================================
