//! agenthub-rag - 하이브리드 RAG + 자기교정 에이전트 파이프라인
//!
//! LanceDB 벡터 검색과 SQLite FTS5 키워드 검색을 RRF로 결합하고,
//! 데이터 분석 -> 최적화 초안 -> AI Judge 채점 루프로 실행안을 만듭니다.

pub mod agent;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
mod http;
pub mod hub;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod rag;
pub mod recommend;
pub mod retrieval;

// Re-exports
pub use agent::{
    AgentOrchestrator, AgentRunOutcome, AgentTask, AiJudge, Domain, JudgeVerdict, PipelineState,
    Recommendation, RunStatus,
};
pub use config::{get_data_dir, AppConfig};
pub use embedding::{create_embedder, get_api_key, has_api_key, EmbeddingProvider};
pub use error::{HubError, HubResult};
pub use hub::{build_orchestrator, AgentHub, HubStatus};
pub use ingest::{EmbeddedText, IngestReport, Ingestor};
pub use knowledge::{ChunkStore, LanceVectorIndex, LexicalIndex, VectorIndex};
pub use llm::{create_gateway, generate_with_domain, LlmGateway, PromptOutput};
pub use rag::{RagAnswer, RagService, RagStrategy, SourceChunk};
pub use recommend::{RecommendedItem, Recommender};
pub use retrieval::{
    assemble, fuse, Context, FusedHit, HybridRetriever, RetrievalHit, SearchMethod,
};
