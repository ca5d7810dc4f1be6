//! Vector Index - 벡터 검색 트레이트 및 유틸리티
//!
//! LanceDB ANN (Approximate Nearest Neighbor) 검색을 사용합니다.

use anyhow::Result;
use async_trait::async_trait;

use crate::retrieval::{Metadata, RetrievalHit};

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// 청크 ID (`{doc_id}#{chunk_index}`)
    pub chunk_id: String,
    /// 원본 문서 ID
    pub doc_id: String,
    /// 청크 텍스트
    pub text: String,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
    /// 부가 메타데이터
    pub metadata: Metadata,
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// 벡터 인덱스 클라이언트 (async)
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 벡터 검색 - 순위가 매겨진 결과 (rank 1부터)
    async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<RetrievalHit>>;

    /// 단일 청크 upsert (같은 chunk_id는 교체)
    async fn upsert(&self, entry: VectorEntry) -> Result<()>;

    /// 배치 upsert (기본 구현: 순차 호출)
    async fn upsert_batch(&self, entries: Vec<VectorEntry>) -> Result<usize> {
        let count = entries.len();
        for entry in entries {
            self.upsert(entry).await?;
        }
        Ok(count)
    }

    /// 문서 단위 삭제
    async fn delete_document(&self, doc_id: &str) -> Result<usize>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 텍스트를 단어 단위 청크로 분할
///
/// overlap으로 청크 간 중첩 단어 수를 지정합니다.
///
/// # Arguments
/// * `text` - 분할할 텍스트
/// * `chunk_size` - 청크 당 단어 수
/// * `overlap` - 청크 간 중첩 단어 수 (`chunk_size`보다 작아야 함)
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();

    if words.is_empty() {
        return vec![];
    }

    if words.len() <= chunk_size || overlap >= chunk_size {
        return vec![words.join(" ")];
    }

    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));

        if end >= words.len() {
            break;
        }

        start += step;
    }

    chunks
}

// ============================================================================
// Tests
// ============================================================================
