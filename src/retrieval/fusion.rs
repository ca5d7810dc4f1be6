//! RRF (Reciprocal Rank Fusion) 통합 + 백필
//!
//! 벡터 검색과 키워드 검색 결과를 순위 기반으로 통합합니다.
//! ref: https://www.elastic.co/blog/hybrid-search-rrf
//!
//! RRF Score = Σ 1 / (c + rank),  c = 60 (기본값)
//!
//! - 같은 chunk_id는 하나로 병합 (양쪽 순위 모두 반영)
//! - 텍스트 충돌 시 벡터 쪽 텍스트 우선
//! - 동점은 chunk_id 오름차순
//! - 하이브리드 비활성화 시 키워드 목록을 비워서 같은 경로로 호출

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{HubError, HubResult};
use crate::knowledge::ContentStore;

use super::types::{FusedHit, HitSource, RetrievalHit};

/// 기본 RRF 평활 상수
pub const DEFAULT_RRF_CONSTANT: f64 = 60.0;

// ============================================================================
// Fusion
// ============================================================================

/// 병합 중간 상태
struct Accumulator {
    ranks: BTreeMap<HitSource, usize>,
    text: Option<String>,
    text_source: Option<HitSource>,
    metadata: BTreeMap<String, String>,
}

/// 두 순위 목록을 RRF로 통합
///
/// 퓨전은 양쪽 후보 전체를 본 뒤에 top-k를 자릅니다.
/// 결과의 출처는 각 결과의 `source` 필드로 판단하므로 인자 순서와 무관합니다.
///
/// # Arguments
/// * `vector_hits` - 벡터 검색 결과 (rank 1부터)
/// * `lexical_hits` - 키워드 검색 결과 (하이브리드 비활성화 시 빈 목록)
/// * `k` - 최종 결과 수 (1 이상)
/// * `rrf_constant` - 평활 상수 (0보다 커야 함)
///
/// # Returns
/// fused_score 내림차순, 동점은 chunk_id 오름차순
pub fn fuse(
    vector_hits: &[RetrievalHit],
    lexical_hits: &[RetrievalHit],
    k: usize,
    rrf_constant: f64,
) -> HubResult<Vec<FusedHit>> {
    if k == 0 {
        return Err(HubError::InvalidArgument("k must be at least 1".to_string()));
    }
    if !(rrf_constant.is_finite() && rrf_constant > 0.0) {
        return Err(HubError::InvalidArgument(format!(
            "rrf_constant must be a positive finite number, got {}",
            rrf_constant
        )));
    }

    let mut merged: HashMap<&str, Accumulator> = HashMap::new();

    for hit in vector_hits.iter().chain(lexical_hits.iter()) {
        if hit.rank == 0 {
            return Err(HubError::InvalidArgument(format!(
                "{} hit {} has rank 0 (ranks are 1-based)",
                hit.source.as_str(),
                hit.chunk_id
            )));
        }

        let acc = merged.entry(hit.chunk_id.as_str()).or_insert_with(|| Accumulator {
            ranks: BTreeMap::new(),
            text: None,
            text_source: None,
            metadata: BTreeMap::new(),
        });

        // 같은 백엔드 안의 중복: 가장 좋은 순위만 반영
        if matches!(acc.ranks.get(&hit.source), Some(&existing) if existing <= hit.rank) {
            continue;
        }
        acc.ranks.insert(hit.source, hit.rank);

        if let Some(text) = &hit.text {
            let replace = match acc.text_source {
                None => true,
                Some(current) => current != HitSource::Vector && hit.source == HitSource::Vector,
            };
            if replace {
                acc.text = Some(text.clone());
                acc.text_source = Some(hit.source);
            }
        }

        for (key, value) in &hit.metadata {
            let vector_owned = hit.source == HitSource::Vector;
            if vector_owned || !acc.metadata.contains_key(key) {
                acc.metadata.insert(key.clone(), value.clone());
            }
        }
    }

    let mut fused: Vec<FusedHit> = merged
        .into_iter()
        .map(|(chunk_id, acc)| FusedHit {
            chunk_id: chunk_id.to_string(),
            fused_score: fused_score(rrf_constant, &acc.ranks),
            contributing_ranks: acc.ranks,
            text: acc.text,
            metadata: acc.metadata,
        })
        .collect();

    fused.sort_by(|a, b| {
        b.fused_score
            .total_cmp(&a.fused_score)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    fused.truncate(k);

    tracing::debug!(
        "RRF fused {} vector + {} lexical hits into {} results",
        vector_hits.len(),
        lexical_hits.len(),
        fused.len()
    );

    Ok(fused)
}

/// 1 / (c + rank)
fn rrf_term(rrf_constant: f64, rank: usize) -> f64 {
    1.0 / (rrf_constant + rank as f64)
}

/// 최종 순위 맵에서 점수 계산
///
/// BTreeMap 순서로 더하므로 같은 순위 조합은 인자 순서와 상관없이 같은 점수가 됩니다.
fn fused_score(rrf_constant: f64, ranks: &BTreeMap<HitSource, usize>) -> f64 {
    ranks.values().map(|&rank| rrf_term(rrf_constant, rank)).sum()
}

// ============================================================================
// Backfill
// ============================================================================

/// 백필 결과 요약
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackfillReport {
    /// 텍스트를 요청한 ID 수
    pub requested: usize,
    /// 채워진 ID 수
    pub filled: usize,
    /// 끝내 텍스트를 얻지 못한 ID
    pub missing: Vec<String>,
}

impl BackfillReport {
    /// 일부 누락이 있으면 `BackfillPartial`로 표현
    pub fn as_error(&self) -> Option<HubError> {
        if self.missing.is_empty() {
            None
        } else {
            Some(HubError::BackfillPartial {
                missing: self.missing.clone(),
            })
        }
    }
}

/// 텍스트가 없는 결과를 콘텐츠 저장소에서 한 번에 채움
///
/// 누락 ID 전체를 단일 배치 호출로 조회합니다.
/// 조회 실패나 부분 결과는 요청 전체를 실패시키지 않고,
/// 해당 결과의 텍스트를 비워 둔 채 컨텍스트에서 제외되도록 합니다.
pub async fn backfill(fused: &mut [FusedHit], store: &dyn ContentStore) -> BackfillReport {
    let missing_ids: BTreeSet<String> = fused
        .iter()
        .filter(|hit| hit.text.is_none())
        .map(|hit| hit.chunk_id.clone())
        .collect();

    if missing_ids.is_empty() {
        return BackfillReport::default();
    }

    let requested = missing_ids.len();
    let found = match store.batch_get(&missing_ids).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!("Backfill lookup failed for {} chunk(s): {:#}", requested, e);
            HashMap::new()
        }
    };

    let mut filled = 0;
    let mut missing = Vec::new();
    for hit in fused.iter_mut().filter(|hit| hit.text.is_none()) {
        match found.get(&hit.chunk_id) {
            Some(text) => {
                hit.text = Some(text.clone());
                filled += 1;
            }
            None => missing.push(hit.chunk_id.clone()),
        }
    }

    let report = BackfillReport {
        requested,
        filled,
        missing,
    };
    if let Some(err) = report.as_error() {
        tracing::warn!("{}; dropping them from context", err);
    }
    report
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::retrieval::Metadata;

    const C: f64 = DEFAULT_RRF_CONSTANT;

    fn hit(id: &str, source: HitSource, rank: usize, text: Option<&str>) -> RetrievalHit {
        RetrievalHit {
            chunk_id: id.to_string(),
            source,
            raw_score: 1.0 / rank as f64,
            rank,
            text: text.map(str::to_string),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_rrf_score_calculation() {
        // 1위: 1 / (60 + 1) ≈ 0.0164
        assert!((rrf_term(C, 1) - 0.0164).abs() < 0.001);
        // 5위: 1 / (60 + 5) ≈ 0.0154
        assert!((rrf_term(C, 5) - 0.0154).abs() < 0.001);
        assert!(rrf_term(C, 1) > rrf_term(C, 5));
    }

    #[test]
    fn test_overlap_sums_both_contributions() {
        let vector = vec![hit("a", HitSource::Vector, 1, Some("va")), hit("b", HitSource::Vector, 2, None)];
        let lexical = vec![hit("b", HitSource::Lexical, 1, None), hit("c", HitSource::Lexical, 2, None)];

        let fused = fuse(&vector, &lexical, 10, C).unwrap();
        assert_eq!(fused.len(), 3);

        // b: 1/62 + 1/61 가 가장 높음
        assert_eq!(fused[0].chunk_id, "b");
        let expected = 1.0 / (C + 2.0) + 1.0 / (C + 1.0);
        assert!((fused[0].fused_score - expected).abs() < 1e-12);
        assert_eq!(fused[0].rank_in(HitSource::Vector), Some(2));
        assert_eq!(fused[0].rank_in(HitSource::Lexical), Some(1));
    }

    #[test]
    fn test_ties_broken_by_chunk_id() {
        let vector = vec![hit("z", HitSource::Vector, 1, None)];
        let lexical = vec![hit("m", HitSource::Lexical, 1, None)];
        let fused = fuse(&vector, &lexical, 10, C).unwrap();
        let ids: Vec<_> = fused.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["m", "z"]);
    }

    #[test]
    fn test_vector_text_wins_on_conflict() {
        let vector = vec![hit("a", HitSource::Vector, 3, Some("from vector"))];
        let lexical = vec![hit("a", HitSource::Lexical, 1, Some("from lexical"))];

        let fused = fuse(&vector, &lexical, 5, C).unwrap();
        assert_eq!(fused[0].text.as_deref(), Some("from vector"));

        // 인자 순서를 바꿔도 같음
        let swapped = fuse(&lexical, &vector, 5, C).unwrap();
        assert_eq!(swapped, fused);
    }

    #[test]
    fn test_lexical_text_used_when_vector_has_none() {
        let vector = vec![hit("a", HitSource::Vector, 1, None)];
        let lexical = vec![hit("a", HitSource::Lexical, 1, Some("kw"))];
        let fused = fuse(&vector, &lexical, 5, C).unwrap();
        assert_eq!(fused[0].text.as_deref(), Some("kw"));
    }

    #[test]
    fn test_metadata_merged_vector_keys_win() {
        let mut v = hit("a", HitSource::Vector, 1, None);
        v.metadata.insert("doc_id".into(), "vec-doc".into());
        let mut l = hit("a", HitSource::Lexical, 1, None);
        l.metadata.insert("doc_id".into(), "lex-doc".into());
        l.metadata.insert("snippet".into(), "...".into());

        let fused = fuse(&[v], &[l], 1, C).unwrap();
        assert_eq!(fused[0].metadata.get("doc_id").map(String::as_str), Some("vec-doc"));
        assert!(fused[0].metadata.contains_key("snippet"));
    }

    #[test]
    fn test_top_k_applied_after_fusion() {
        // 양쪽에 있는 v3가 벡터 1위보다 앞서야 함
        let vector: Vec<_> = (1..=3).map(|r| hit(&format!("v{}", r), HitSource::Vector, r, None)).collect();
        let mut lexical = vec![hit("v3", HitSource::Lexical, 1, None)];
        lexical.push(hit("l2", HitSource::Lexical, 2, None));

        let fused = fuse(&vector, &lexical, 2, C).unwrap();
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].chunk_id, "v3");
    }

    #[test]
    fn test_duplicate_within_source_keeps_best_rank() {
        let vector = vec![hit("a", HitSource::Vector, 1, None), hit("a", HitSource::Vector, 4, None)];
        let fused = fuse(&vector, &[], 5, C).unwrap();
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].rank_in(HitSource::Vector), Some(1));
        assert!((fused[0].fused_score - 1.0 / (C + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_vector_only_mode_uses_same_path() {
        let vector = vec![hit("a", HitSource::Vector, 1, Some("t")), hit("b", HitSource::Vector, 2, Some("u"))];
        let fused = fuse(&vector, &[], 5, C).unwrap();
        assert_eq!(fused.len(), 2);
        assert!(fused.iter().all(|h| h.method() == crate::retrieval::SearchMethod::Vector));
    }

    #[test]
    fn test_empty_inputs_yield_empty_result() {
        let fused = fuse(&[], &[], 5, C).unwrap();
        assert!(fused.is_empty());
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(fuse(&[], &[], 0, C), Err(HubError::InvalidArgument(_))));
        assert!(matches!(fuse(&[], &[], 3, 0.0), Err(HubError::InvalidArgument(_))));
        assert!(matches!(fuse(&[], &[], 3, -1.0), Err(HubError::InvalidArgument(_))));
        let mut bad = vec![hit("a", HitSource::Vector, 1, None)];
        bad[0].rank = 0;
        assert!(matches!(fuse(&bad, &[], 3, C), Err(HubError::InvalidArgument(_))));
    }

    // ------------------------------------------------------------------------
    // Backfill
    // ------------------------------------------------------------------------

    struct FakeStore {
        texts: HashMap<String, String>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeStore {
        fn new(pairs: &[(&str, &str)], fail: bool) -> Self {
            Self {
                texts: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl ContentStore for FakeStore {
        async fn batch_get(&self, chunk_ids: &BTreeSet<String>) -> anyhow::Result<HashMap<String, String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("content store offline");
            }
            Ok(chunk_ids
                .iter()
                .filter_map(|id| self.texts.get(id).map(|t| (id.clone(), t.clone())))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_backfill_single_batched_call() {
        let lexical = vec![
            hit("a", HitSource::Lexical, 1, None),
            hit("b", HitSource::Lexical, 2, None),
            hit("c", HitSource::Lexical, 3, Some("inline")),
        ];
        let mut fused = fuse(&[], &lexical, 5, C).unwrap();
        let store = FakeStore::new(&[("a", "text a"), ("b", "text b")], false);

        let report = backfill(&mut fused, &store).await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.requested, 2);
        assert_eq!(report.filled, 2);
        assert!(report.missing.is_empty());
        assert!(fused.iter().all(|h| h.text.is_some()));
    }

    #[tokio::test]
    async fn test_backfill_partial_leaves_text_null() {
        let lexical = vec![hit("a", HitSource::Lexical, 1, None), hit("gone", HitSource::Lexical, 2, None)];
        let mut fused = fuse(&[], &lexical, 5, C).unwrap();
        let store = FakeStore::new(&[("a", "text a")], false);

        let report = backfill(&mut fused, &store).await;
        assert_eq!(report.missing, vec!["gone".to_string()]);
        assert!(matches!(report.as_error(), Some(HubError::BackfillPartial { .. })));
        let gone = fused.iter().find(|h| h.chunk_id == "gone").unwrap();
        assert!(gone.text.is_none());
    }

    #[tokio::test]
    async fn test_backfill_store_failure_is_absorbed() {
        let lexical = vec![hit("a", HitSource::Lexical, 1, None)];
        let mut fused = fuse(&[], &lexical, 5, C).unwrap();
        let store = FakeStore::new(&[], true);

        let report = backfill(&mut fused, &store).await;
        assert_eq!(report.missing.len(), 1);
        assert!(fused[0].text.is_none());
    }

    #[tokio::test]
    async fn test_backfill_skips_call_when_nothing_missing() {
        let vector = vec![hit("a", HitSource::Vector, 1, Some("t"))];
        let mut fused = fuse(&vector, &[], 5, C).unwrap();
        let store = FakeStore::new(&[], false);

        let report = backfill(&mut fused, &store).await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(report, BackfillReport::default());
    }
}
