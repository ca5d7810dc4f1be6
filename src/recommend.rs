//! 추천 - 최근 질문과 비슷한 문서 추천
//!
//! 최근 질문들을 한 줄씩 이어 임베딩하고 벡터 인덱스에서 가까운 청크를 찾습니다.
//! 선호 태그가 있으면 태그가 하나라도 겹치는 문서만 남깁니다.
//! 같은 문서의 청크는 가장 점수가 높은 하나만 추천합니다.

use std::sync::Arc;

use serde::Serialize;

use crate::embedding::EmbeddingProvider;
use crate::error::{HubError, HubResult};
use crate::knowledge::{doc_id_of, VectorIndex};
use crate::retrieval::{normalize_tags, tags_of, RetrievalHit, INGESTED_AT_KEY, TITLE_KEY};

/// 스니펫 최대 길이 (문자)
const SNIPPET_CHARS: usize = 200;

/// 태그/문서 필터 전에 더 뽑아 둘 배수
const CANDIDATE_FACTOR: usize = 4;

// ============================================================================
// Types
// ============================================================================

/// 추천 항목
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedItem {
    pub chunk_id: String,
    pub doc_id: String,
    pub title: String,
    pub snippet: String,
    pub tags: Vec<String>,
    /// 수집 시각 (RFC 3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingested_at: Option<String>,
    pub score: f64,
}

// ============================================================================
// Recommender
// ============================================================================

/// 문서 추천기
pub struct Recommender {
    embedder: Arc<dyn EmbeddingProvider>,
    vector: Arc<dyn VectorIndex>,
}

impl Recommender {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, vector: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, vector }
    }

    /// 최근 질문 기반 추천
    ///
    /// # Arguments
    /// * `recent_queries` - 최근 질문 (빈 문자열은 무시)
    /// * `preferred_tags` - 선호 태그 (비면 필터 없음)
    /// * `top_k` - 최대 추천 수
    pub async fn recommend(
        &self,
        recent_queries: &[String],
        preferred_tags: &[String],
        top_k: usize,
    ) -> HubResult<Vec<RecommendedItem>> {
        if top_k == 0 {
            return Err(HubError::InvalidArgument("top_k must be positive".into()));
        }
        let query = join_queries(recent_queries)
            .ok_or_else(|| HubError::InvalidArgument("at least one recent query is required".into()))?;
        let preferred = normalize_tags(preferred_tags);

        let embedding = self
            .embedder
            .embed(&query)
            .await
            .map_err(|e| HubError::BackendUnavailable {
                backend: "embedding",
                reason: format!("{:#}", e),
            })?;

        let hits = self
            .vector
            .search(&embedding, top_k * CANDIDATE_FACTOR)
            .await
            .map_err(|e| HubError::BackendUnavailable {
                backend: "vector",
                reason: format!("{:#}", e),
            })?;

        let mut items: Vec<RecommendedItem> = Vec::new();
        for hit in RetrievalHit::rank_in_order(hits) {
            let item = recommended_item(&hit);
            if !preferred.is_empty() && !item.tags.iter().any(|t| preferred.contains(t)) {
                continue;
            }
            if items.iter().any(|existing| existing.doc_id == item.doc_id) {
                continue;
            }
            items.push(item);
            if items.len() == top_k {
                break;
            }
        }

        tracing::info!(
            "Recommended {} documents from {} recent queries",
            items.len(),
            recent_queries.len()
        );
        Ok(items)
    }
}

/// 질문을 한 줄씩 이어 붙임 (모두 비면 None)
fn join_queries(queries: &[String]) -> Option<String> {
    let lines: Vec<&str> = queries
        .iter()
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn recommended_item(hit: &RetrievalHit) -> RecommendedItem {
    let doc_id = hit
        .metadata
        .get("doc_id")
        .cloned()
        .unwrap_or_else(|| doc_id_of(&hit.chunk_id).to_string());
    let title = hit
        .metadata
        .get(TITLE_KEY)
        .cloned()
        .unwrap_or_else(|| doc_id.clone());

    RecommendedItem {
        chunk_id: hit.chunk_id.clone(),
        title,
        snippet: hit
            .text
            .as_deref()
            .map(|text| text.chars().take(SNIPPET_CHARS).collect())
            .unwrap_or_default(),
        tags: tags_of(&hit.metadata),
        ingested_at: hit.metadata.get(INGESTED_AT_KEY).cloned(),
        score: hit.raw_score,
        doc_id,
    }
}

// ============================================================================
// Tests
// ============================================================================
