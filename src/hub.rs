//! 구성 조립 - 설정값으로 저장소와 서비스 생성
//!
//! 저장소(SQLite, LanceDB)는 한 번 열어 `Arc`로 공유하고,
//! 서비스(수집, RAG, 파이프라인)는 필요할 때 만듭니다.
//! 모든 생성자는 `AppConfig` 값을 명시적으로 받습니다.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::agent::{AgentOrchestrator, LlmDrafter, LlmJudge, LlmNarrator};
use crate::config::AppConfig;
use crate::embedding::create_embedder;
use crate::ingest::Ingestor;
use crate::knowledge::{ChunkStore, LanceVectorIndex, StoreStats, VectorIndex};
use crate::llm::create_gateway;
use crate::rag::RagService;
use crate::recommend::Recommender;
use crate::retrieval::HybridRetriever;

/// SQLite 파일 이름
const KNOWLEDGE_DB: &str = "knowledge.db";

/// LanceDB 디렉토리 이름
const VECTORS_DIR: &str = "vectors.lance";

/// 상태 요약
#[derive(Debug, Clone, Serialize)]
pub struct HubStatus {
    pub data_dir: PathBuf,
    pub store: StoreStats,
    pub vector_count: usize,
    pub embedding_dimension: usize,
}

/// 저장소 핸들 묶음
pub struct AgentHub {
    config: AppConfig,
    chunks: Arc<ChunkStore>,
    vectors: Arc<LanceVectorIndex>,
}

impl AgentHub {
    /// 데이터 디렉토리의 저장소 열기 (없으면 생성)
    pub async fn open(config: AppConfig) -> Result<Self> {
        let data_dir = config.data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let chunks = ChunkStore::open(&data_dir.join(KNOWLEDGE_DB))
            .context("Failed to open chunk store")?;
        let vectors = LanceVectorIndex::open(&data_dir.join(VECTORS_DIR), config.embedding.dimension)
            .await
            .context("Failed to open vector index")?;

        tracing::debug!("Opened stores under {}", data_dir.display());

        Ok(Self {
            config,
            chunks: Arc::new(chunks),
            vectors: Arc::new(vectors),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn chunks(&self) -> &ChunkStore {
        &self.chunks
    }

    /// 수집기 생성 (임베딩 프로바이더 필요)
    pub fn ingestor(&self) -> Result<Ingestor> {
        Ok(Ingestor::new(
            create_embedder(&self.config.embedding)?,
            self.vectors.clone(),
            self.chunks.clone(),
            self.config.ingest.clone(),
        ))
    }

    /// 하이브리드 검색기 생성
    pub fn retriever(&self) -> Result<HybridRetriever> {
        Ok(HybridRetriever::new(
            create_embedder(&self.config.embedding)?,
            self.vectors.clone(),
            self.chunks.clone(),
            self.chunks.clone(),
            self.config.retrieval.clone(),
        ))
    }

    /// RAG 서비스 생성 (임베딩 + LLM 필요)
    pub fn rag(&self) -> Result<RagService> {
        let retriever = self.retriever()?;
        let llm = create_gateway(&self.config.llm)?;
        Ok(RagService::new(Arc::new(retriever), llm))
    }

    /// 추천기 생성 (벡터 인덱스만 사용)
    pub fn recommender(&self) -> Result<Recommender> {
        Ok(Recommender::new(
            create_embedder(&self.config.embedding)?,
            self.vectors.clone(),
        ))
    }

    /// 두 인덱스에서 문서 삭제 - (벡터, 청크) 삭제 수
    pub async fn delete_document(&self, doc_id: &str) -> Result<(usize, usize)> {
        let vectors = self
            .vectors
            .delete_document(doc_id)
            .await
            .context("Failed to delete vectors")?;
        let chunks = self
            .chunks
            .delete_document(doc_id)
            .context("Failed to delete chunks")?;
        Ok((vectors, chunks))
    }

    /// 저장소 상태
    pub async fn status(&self) -> Result<HubStatus> {
        Ok(HubStatus {
            data_dir: self.config.data_dir(),
            store: self.chunks.stats()?,
            vector_count: self.vectors.count().await?,
            embedding_dimension: self.vectors.dimension(),
        })
    }
}

/// 파이프라인 생성 (저장소 불필요, LLM만 사용)
pub fn build_orchestrator(config: &AppConfig) -> Result<AgentOrchestrator> {
    let llm = create_gateway(&config.llm)?;
    let orchestrator = AgentOrchestrator::new(
        Arc::new(LlmNarrator::new(llm.clone())),
        Arc::new(LlmDrafter::new(llm.clone())),
        Arc::new(LlmJudge::new(llm)),
        config.pipeline.clone(),
    )?;
    Ok(orchestrator)
}
