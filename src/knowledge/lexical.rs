//! 키워드 인덱스 / 콘텐츠 저장소 트레이트

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use async_trait::async_trait;

use crate::retrieval::{Metadata, RetrievalHit};

/// 키워드 인덱스 클라이언트 (BM25 계열)
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// 키워드 검색 - 관련도 순으로 순위가 매겨진 결과
    async fn search(&self, query_text: &str, top_k: usize) -> Result<Vec<RetrievalHit>>;

    /// 청크 색인 (같은 chunk_id는 교체)
    async fn index(&self, chunk_id: &str, text: &str, metadata: &Metadata) -> Result<()>;

    /// 문서 단위 삭제 - 삭제된 청크 수
    async fn delete_document(&self, doc_id: &str) -> Result<usize>;
}

/// 콘텐츠 저장소 - 백필용 배치 조회
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// chunk_id 배치로 전체 텍스트 조회
    ///
    /// 부분 결과 허용: 찾지 못한 ID는 반환 맵에 없습니다.
    async fn batch_get(&self, chunk_ids: &BTreeSet<String>) -> Result<HashMap<String, String>>;
}
