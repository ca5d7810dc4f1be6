//! RAG 서비스 - 검색 결과를 근거로 답변 생성
//!
//! 하이브리드 검색 -> 컨텍스트 조립 -> LLM 답변 순서입니다.
//! 컨텍스트가 비면 LLM을 부르지 않고 `no_context`로 답합니다.

use std::sync::Arc;

use serde::Serialize;

use crate::agent::Domain;
use crate::error::{HubError, HubResult};
use crate::llm::{prompts, LlmGateway};
use crate::retrieval::{assemble, FusedHit, HybridRetriever, RetrievalRequest, SearchMethod};

/// 스니펫 최대 길이 (문자)
const SNIPPET_CHARS: usize = 200;

/// 컨텍스트가 없을 때의 답변
const NO_CONTEXT_ANSWER: &str = "관련 문서를 찾지 못했습니다. 먼저 문서를 수집하거나 질문을 바꿔 보세요.";

// ============================================================================
// Types
// ============================================================================

/// 답변 방식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RagStrategy {
    /// 문서 근거 답변
    #[default]
    Standard,
    /// 개체/관계 정리 후 답변 (도메인 기본 시스템 프롬프트)
    Graph,
}

/// 답변 근거 청크
#[derive(Debug, Clone, Serialize)]
pub struct SourceChunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub score: f64,
    pub method: SearchMethod,
    /// 컨텍스트에 포함되었는지 (예산 초과/백필 실패 시 false)
    pub in_context: bool,
    pub snippet: String,
}

/// RAG 답변
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    /// "hybrid" | "vector" | "graph_rag" | "no_context"
    pub strategy: String,
    pub sources: Vec<SourceChunk>,
    pub model: String,
    /// 강등 사유 (백엔드 장애 등)
    pub degraded: Vec<String>,
}

// ============================================================================
// RagService
// ============================================================================

/// 질문 응답 서비스
pub struct RagService {
    retriever: Arc<HybridRetriever>,
    llm: Arc<dyn LlmGateway>,
    domain: Domain,
    strategy: RagStrategy,
}

impl RagService {
    pub fn new(retriever: Arc<HybridRetriever>, llm: Arc<dyn LlmGateway>) -> Self {
        Self {
            retriever,
            llm,
            domain: Domain::General,
            strategy: RagStrategy::Standard,
        }
    }

    pub fn with_strategy(mut self, strategy: RagStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// 답변 도메인 지정 (시스템 프롬프트가 비었을 때 쓰임)
    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    /// 질문에 답변
    ///
    /// # Arguments
    /// * `question` - 사용자 질문
    /// * `use_hybrid` - 키워드 검색 병행 여부 (None이면 설정값)
    /// * `top_k` - 최종 결과 수 (None이면 설정값)
    pub async fn ask(
        &self,
        question: &str,
        use_hybrid: Option<bool>,
        top_k: Option<usize>,
    ) -> HubResult<RagAnswer> {
        let config = self.retriever.config();
        let use_hybrid = use_hybrid.unwrap_or(config.use_hybrid);
        let top_k = top_k.unwrap_or(config.top_k);
        let budget = config.context_budget_chars;

        let retrieval = self
            .retriever
            .retrieve(RetrievalRequest {
                question,
                use_hybrid,
                top_k,
            })
            .await?;

        let context = assemble(&retrieval.hits, budget);
        let mut degraded = retrieval.degraded;
        if let Some(partial) = retrieval.backfill.as_error() {
            degraded.push(partial.to_string());
        }

        let sources = retrieval
            .hits
            .iter()
            .map(|hit| source_chunk(hit, context.blocks().iter().any(|b| b.chunk_id == hit.chunk_id)))
            .collect::<Vec<_>>();

        if context.is_empty() {
            tracing::info!("No context for question, skipping generation");
            return Ok(RagAnswer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                strategy: "no_context".to_string(),
                sources,
                model: self.llm.model().to_string(),
                degraded,
            });
        }

        tracing::info!(
            "Answering with {} context blocks ({} / {} chars)",
            context.len(),
            context.size(),
            context.budget()
        );

        let (system, user, strategy) = match self.strategy {
            RagStrategy::Standard => (
                prompts::RAG_SYSTEM_PROMPT,
                prompts::rag_prompt(question, &context.render()),
                if use_hybrid { "hybrid" } else { "vector" },
            ),
            RagStrategy::Graph => (
                "",
                prompts::graph_rag_prompt(question, &context.render()),
                "graph_rag",
            ),
        };

        let answer = self
            .llm
            .generate(system, &user, self.domain)
            .await
            .map_err(|e| HubError::GenerationFailure(format!("{:#}", e)))?;

        Ok(RagAnswer {
            answer,
            strategy: strategy.to_string(),
            sources,
            model: self.llm.model().to_string(),
            degraded,
        })
    }
}

fn source_chunk(hit: &FusedHit, in_context: bool) -> SourceChunk {
    let doc_id = hit
        .metadata
        .get("doc_id")
        .cloned()
        .unwrap_or_else(|| crate::knowledge::doc_id_of(&hit.chunk_id).to_string());

    let snippet = hit
        .text
        .as_deref()
        .or_else(|| hit.metadata.get("snippet").map(String::as_str))
        .map(|text| text.chars().take(SNIPPET_CHARS).collect())
        .unwrap_or_default();

    SourceChunk {
        chunk_id: hit.chunk_id.clone(),
        doc_id,
        score: hit.fused_score,
        method: hit.method(),
        in_context,
        snippet,
    }
}

// ============================================================================
// Tests
// ============================================================================
