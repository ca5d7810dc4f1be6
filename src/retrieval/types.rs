//! 검색 결과 타입
//!
//! 백엔드 원시 결과(`RetrievalHit`)와 RRF 통합 결과(`FusedHit`)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 청크 메타데이터 (키 순서 고정)
pub type Metadata = BTreeMap<String, String>;

/// 태그 메타데이터 키 (쉼표 구분)
pub const TAGS_KEY: &str = "tags";
/// 제목 메타데이터 키
pub const TITLE_KEY: &str = "title";
/// 수집 시각 메타데이터 키 (RFC 3339)
pub const INGESTED_AT_KEY: &str = "ingested_at";

/// 태그 정규화 - 공백 제거, 빈 값/중복 제거, 입력 순서 유지
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// 메타데이터에서 태그 목록
pub fn tags_of(metadata: &Metadata) -> Vec<String> {
    metadata
        .get(TAGS_KEY)
        .map(|raw| normalize_tags(&raw.split(',').collect::<Vec<_>>()))
        .unwrap_or_default()
}

/// 메타데이터에 태그 기록 (비어 있으면 키 제거)
pub fn set_tags(metadata: &mut Metadata, tags: &[String]) {
    let tags = normalize_tags(tags);
    if tags.is_empty() {
        metadata.remove(TAGS_KEY);
    } else {
        metadata.insert(TAGS_KEY.to_string(), tags.join(","));
    }
}

// ============================================================================
// HitSource / SearchMethod
// ============================================================================

/// 결과를 만든 검색 백엔드
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitSource {
    /// 벡터 유사도 검색 (LanceDB)
    Vector,
    /// 키워드 검색 (FTS5 BM25)
    Lexical,
}

impl HitSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            HitSource::Vector => "vector",
            HitSource::Lexical => "lexical",
        }
    }
}

/// 통합 결과가 어느 검색에서 왔는지
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    /// 벡터 검색에서만 발견
    Vector,
    /// 키워드 검색에서만 발견
    Lexical,
    /// 양쪽 모두에서 발견
    Hybrid,
}

// ============================================================================
// RetrievalHit
// ============================================================================

/// 단일 백엔드의 검색 결과
///
/// `rank`는 해당 백엔드 목록 안에서 1부터 시작하는 조밀한 순위이고,
/// `raw_score`는 순위가 내려갈수록 증가하지 않습니다 (높을수록 좋음).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub chunk_id: String,
    pub source: HitSource,
    pub raw_score: f64,
    pub rank: usize,
    /// 전체 텍스트 (없으면 백필 대상)
    pub text: Option<String>,
    pub metadata: Metadata,
}

impl RetrievalHit {
    /// 순위 없는 결과 생성 (순위는 `rank_in_order`에서 부여)
    pub fn unranked(
        chunk_id: impl Into<String>,
        source: HitSource,
        raw_score: f64,
        text: Option<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            source,
            raw_score,
            rank: 0,
            text,
            metadata,
        }
    }

    /// 점수 내림차순으로 정렬하고 1부터 조밀한 순위를 부여
    ///
    /// 백엔드가 이미 정렬해서 주더라도 다시 정렬합니다 (안정 정렬이라 동점은 원래 순서 유지).
    pub fn rank_in_order(mut hits: Vec<RetrievalHit>) -> Vec<RetrievalHit> {
        hits.sort_by(|a, b| b.raw_score.total_cmp(&a.raw_score));
        for (i, hit) in hits.iter_mut().enumerate() {
            hit.rank = i + 1;
        }
        hits
    }
}

// ============================================================================
// FusedHit
// ============================================================================

/// RRF 통합 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedHit {
    pub chunk_id: String,
    /// Σ 1 / (c + rank)
    pub fused_score: f64,
    /// 백엔드별 순위
    pub contributing_ranks: BTreeMap<HitSource, usize>,
    pub text: Option<String>,
    pub metadata: Metadata,
}

impl FusedHit {
    /// 검색 방법 (vector, lexical, hybrid)
    pub fn method(&self) -> SearchMethod {
        let vector = self.contributing_ranks.contains_key(&HitSource::Vector);
        let lexical = self.contributing_ranks.contains_key(&HitSource::Lexical);
        match (vector, lexical) {
            (true, true) => SearchMethod::Hybrid,
            (false, true) => SearchMethod::Lexical,
            _ => SearchMethod::Vector,
        }
    }

    /// 특정 백엔드에서의 순위
    pub fn rank_in(&self, source: HitSource) -> Option<usize> {
        self.contributing_ranks.get(&source).copied()
    }
}
