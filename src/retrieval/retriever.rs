//! 하이브리드 검색기 - 벡터 + 키워드 동시 검색 후 RRF 통합
//!
//! 두 백엔드를 동시에 호출하고 각각 타임아웃을 겁니다.
//! 한쪽이 실패하거나 느리면 나머지 한쪽만으로 통합합니다.

use std::sync::Arc;
use std::time::Duration;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{HubError, HubResult};
use crate::knowledge::{ContentStore, LexicalIndex, VectorIndex};

use super::fusion::{backfill, fuse, BackfillReport};
use super::types::{FusedHit, HitSource, RetrievalHit};

// ============================================================================
// Types
// ============================================================================

/// 검색 요청
#[derive(Debug, Clone)]
pub struct RetrievalRequest<'a> {
    pub question: &'a str,
    /// false면 벡터 검색만 (키워드 목록은 빈 채로 같은 퓨전 경로)
    pub use_hybrid: bool,
    pub top_k: usize,
}

/// 검색 결과
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    /// fused_score 내림차순 (백필 완료)
    pub hits: Vec<FusedHit>,
    /// 강등 사유 (BackendUnavailable 등)
    pub degraded: Vec<String>,
    pub backfill: BackfillReport,
}

impl Retrieval {
    /// 관련 컨텍스트를 찾지 못함
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

// ============================================================================
// HybridRetriever
// ============================================================================

/// 하이브리드 검색기
pub struct HybridRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    vector: Arc<dyn VectorIndex>,
    lexical: Arc<dyn LexicalIndex>,
    content: Arc<dyn ContentStore>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vector: Arc<dyn VectorIndex>,
        lexical: Arc<dyn LexicalIndex>,
        content: Arc<dyn ContentStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            vector,
            lexical,
            content,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// 질문에 대한 통합 검색
    ///
    /// 1. 벡터(임베딩 + 검색)와 키워드 검색을 동시에 실행
    /// 2. 실패/타임아웃 백엔드는 빈 목록으로 강등
    /// 3. RRF 통합 후 top-k
    /// 4. 텍스트 없는 결과를 단일 배치로 백필
    pub async fn retrieve(&self, request: RetrievalRequest<'_>) -> HubResult<Retrieval> {
        if request.question.trim().is_empty() {
            return Err(HubError::InvalidArgument("question must not be empty".to_string()));
        }
        if request.top_k == 0 {
            return Err(HubError::InvalidArgument("top_k must be at least 1".to_string()));
        }

        let timeout = self.config.backend_timeout();
        let candidate_k = self.config.candidate_k.max(request.top_k);

        let vector_search = async {
            let query_vector = self.embedder.embed(request.question).await?;
            self.vector.search(&query_vector, candidate_k).await
        };
        let lexical_search = async {
            if request.use_hybrid {
                self.lexical.search(request.question, candidate_k).await
            } else {
                Ok(Vec::new())
            }
        };

        let (vector_result, lexical_result) = tokio::join!(
            with_timeout(HitSource::Vector, timeout, vector_search),
            with_timeout(HitSource::Lexical, timeout, lexical_search),
        );

        let mut degraded = Vec::new();
        let vector_hits = absorb(vector_result, &mut degraded);
        let lexical_hits = absorb(lexical_result, &mut degraded);

        let mut hits = fuse(
            &vector_hits,
            &lexical_hits,
            request.top_k,
            self.config.rrf_constant,
        )?;

        let backfill = backfill(&mut hits, self.content.as_ref()).await;

        tracing::info!(
            "Retrieved {} hits (vector={}, lexical={}, hybrid={}, degraded={})",
            hits.len(),
            vector_hits.len(),
            lexical_hits.len(),
            request.use_hybrid,
            degraded.len()
        );

        Ok(Retrieval {
            hits,
            degraded,
            backfill,
        })
    }
}

/// 백엔드 호출에 타임아웃을 걸고 실패를 `BackendUnavailable`로 변환
async fn with_timeout<F>(
    source: HitSource,
    timeout: Duration,
    search: F,
) -> HubResult<Vec<RetrievalHit>>
where
    F: std::future::Future<Output = anyhow::Result<Vec<RetrievalHit>>>,
{
    let backend = source.as_str();
    match tokio::time::timeout(timeout, search).await {
        Ok(Ok(hits)) => Ok(normalize(source, hits)),
        Ok(Err(e)) => Err(HubError::BackendUnavailable {
            backend,
            reason: format!("{:#}", e),
        }),
        Err(_) => Err(HubError::BackendUnavailable {
            backend,
            reason: format!("timed out after {:?}", timeout),
        }),
    }
}

/// 백엔드가 돌려준 결과의 출처/순위 불변식을 보정
///
/// 순서는 백엔드 순서를 그대로 믿고 rank만 1부터 다시 매깁니다.
fn normalize(source: HitSource, hits: Vec<RetrievalHit>) -> Vec<RetrievalHit> {
    hits.into_iter()
        .enumerate()
        .map(|(i, mut hit)| {
            hit.source = source;
            hit.rank = i + 1;
            hit
        })
        .collect()
}

/// 강등 가능한 에러는 기록하고 빈 목록으로 대체
fn absorb(result: HubResult<Vec<RetrievalHit>>, degraded: &mut Vec<String>) -> Vec<RetrievalHit> {
    match result {
        Ok(hits) => hits,
        Err(e) => {
            tracing::warn!("{}; continuing with remaining modality", e);
            degraded.push(e.to_string());
            Vec::new()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::Result;
    use async_trait::async_trait;

    use super::*;
    use crate::knowledge::VectorEntry;
    use crate::retrieval::Metadata;

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.1; 4])
        }
        fn dimension(&self) -> usize {
            4
        }
        fn name(&self) -> &str {
            "fake"
        }
    }

    #[derive(Clone, Copy)]
    enum Behaviour {
        Ok,
        Fail,
        Hang,
    }

    struct FakeVector {
        ids: Vec<&'static str>,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl VectorIndex for FakeVector {
        async fn search(&self, _q: &[f32], top_k: usize) -> Result<Vec<RetrievalHit>> {
            match self.behaviour {
                Behaviour::Fail => anyhow::bail!("lance offline"),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(vec![])
                }
                Behaviour::Ok => Ok(self
                    .ids
                    .iter()
                    .take(top_k)
                    .enumerate()
                    .map(|(i, id)| RetrievalHit {
                        chunk_id: id.to_string(),
                        source: HitSource::Vector,
                        raw_score: 1.0 - i as f64 * 0.1,
                        rank: i + 1,
                        text: Some(format!("vector text {}", id)),
                        metadata: Metadata::new(),
                    })
                    .collect()),
            }
        }
        async fn upsert(&self, _entry: VectorEntry) -> Result<()> {
            Ok(())
        }
        async fn delete_document(&self, _doc_id: &str) -> Result<usize> {
            Ok(0)
        }
        async fn count(&self) -> Result<usize> {
            Ok(self.ids.len())
        }
    }

    struct FakeLexical {
        ids: Vec<&'static str>,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LexicalIndex for FakeLexical {
        async fn search(&self, _q: &str, top_k: usize) -> Result<Vec<RetrievalHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Fail => anyhow::bail!("fts offline"),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(vec![])
                }
                Behaviour::Ok => Ok(self
                    .ids
                    .iter()
                    .take(top_k)
                    .enumerate()
                    .map(|(i, id)| RetrievalHit {
                        chunk_id: id.to_string(),
                        source: HitSource::Lexical,
                        raw_score: 10.0 - i as f64,
                        rank: i + 1,
                        text: None,
                        metadata: Metadata::new(),
                    })
                    .collect()),
            }
        }
        async fn index(&self, _chunk_id: &str, _text: &str, _metadata: &Metadata) -> Result<()> {
            Ok(())
        }
        async fn delete_document(&self, _doc_id: &str) -> Result<usize> {
            Ok(0)
        }
    }

    struct FakeContent;

    #[async_trait]
    impl ContentStore for FakeContent {
        async fn batch_get(&self, ids: &BTreeSet<String>) -> Result<HashMap<String, String>> {
            Ok(ids.iter().map(|id| (id.clone(), format!("stored text {}", id))).collect())
        }
    }

    fn retriever(vector: Behaviour, lexical: Behaviour) -> (HybridRetriever, Arc<FakeLexical>) {
        let lexical_index = Arc::new(FakeLexical {
            ids: vec!["b#0", "c#0"],
            behaviour: lexical,
            calls: AtomicUsize::new(0),
        });
        let config = RetrievalConfig {
            backend_timeout_ms: 200,
            ..RetrievalConfig::default()
        };
        let retriever = HybridRetriever::new(
            Arc::new(FakeEmbedder),
            Arc::new(FakeVector {
                ids: vec!["a#0", "b#0"],
                behaviour: vector,
            }),
            lexical_index.clone(),
            Arc::new(FakeContent),
            config,
        );
        (retriever, lexical_index)
    }

    fn request(use_hybrid: bool) -> RetrievalRequest<'static> {
        RetrievalRequest {
            question: "what is rrf?",
            use_hybrid,
            top_k: 5,
        }
    }

    #[tokio::test]
    async fn test_hybrid_fuses_and_backfills() {
        let (retriever, _) = retriever(Behaviour::Ok, Behaviour::Ok);
        let result = retriever.retrieve(request(true)).await.unwrap();

        assert_eq!(result.hits.len(), 3);
        assert_eq!(result.hits[0].chunk_id, "b#0");
        assert!(result.degraded.is_empty());
        // c#0은 키워드에서만 와서 백필됨
        let c = result.hits.iter().find(|h| h.chunk_id == "c#0").unwrap();
        assert_eq!(c.text.as_deref(), Some("stored text c#0"));
        assert_eq!(result.backfill.filled, 1);
    }

    #[tokio::test]
    async fn test_vector_only_skips_lexical_backend() {
        let (retriever, lexical) = retriever(Behaviour::Ok, Behaviour::Ok);
        let result = retriever.retrieve(request(false)).await.unwrap();

        assert_eq!(lexical.calls.load(Ordering::SeqCst), 0);
        let ids: Vec<_> = result.hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a#0", "b#0"]);
    }

    #[tokio::test]
    async fn test_failed_vector_degrades_to_lexical() {
        let (retriever, _) = retriever(Behaviour::Fail, Behaviour::Ok);
        let result = retriever.retrieve(request(true)).await.unwrap();

        assert_eq!(result.hits.len(), 2);
        assert_eq!(result.degraded.len(), 1);
        assert!(result.degraded[0].contains("vector backend unavailable"));
    }

    #[tokio::test]
    async fn test_slow_lexical_times_out_and_degrades() {
        let (retriever, _) = retriever(Behaviour::Ok, Behaviour::Hang);
        let result = retriever.retrieve(request(true)).await.unwrap();

        assert_eq!(result.hits.len(), 2);
        assert!(result.degraded[0].contains("timed out"));
    }

    #[tokio::test]
    async fn test_locked_sqlite_store_times_out_and_degrades() {
        use crate::knowledge::{hold_connection, ChunkStore};

        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(ChunkStore::open(&dir.path().join("knowledge.db")).unwrap());
        let mut meta = Metadata::new();
        meta.insert("doc_id".to_string(), "c".to_string());
        store.put_chunk("c#0", "what is rrf fusion", &meta).unwrap();

        let retriever = HybridRetriever::new(
            Arc::new(FakeEmbedder),
            Arc::new(FakeVector {
                ids: vec!["a#0", "b#0"],
                behaviour: Behaviour::Ok,
            }),
            store.clone(),
            store.clone(),
            RetrievalConfig {
                backend_timeout_ms: 100,
                ..RetrievalConfig::default()
            },
        );

        let release = hold_connection(&store);
        let started = std::time::Instant::now();
        let result = retriever.retrieve(request(true)).await.unwrap();
        let elapsed = started.elapsed();
        release.join().unwrap();

        assert!(elapsed < Duration::from_millis(800), "took {:?}", elapsed);
        assert_eq!(result.degraded.len(), 1);
        assert!(result.degraded[0].contains("lexical backend unavailable"));
        assert!(result.degraded[0].contains("timed out"));
        let ids: Vec<_> = result.hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a#0", "b#0"]);
    }

    #[tokio::test]
    async fn test_both_backends_down_is_empty_not_error() {
        let (retriever, _) = retriever(Behaviour::Fail, Behaviour::Fail);
        let result = retriever.retrieve(request(true)).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(result.degraded.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let (retriever, _) = retriever(Behaviour::Ok, Behaviour::Ok);
        let err = retriever
            .retrieve(RetrievalRequest {
                question: "  ",
                use_hybrid: true,
                top_k: 5,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::InvalidArgument(_)));
    }

    #[test]
    fn test_normalize_reassigns_dense_ranks() {
        let hits = vec![
            RetrievalHit::unranked("x", HitSource::Vector, 0.9, None, Metadata::new()),
            RetrievalHit::unranked("y", HitSource::Vector, 0.8, None, Metadata::new()),
        ];
        let normalized = normalize(HitSource::Lexical, hits);
        assert_eq!(normalized[0].rank, 1);
        assert_eq!(normalized[1].rank, 2);
        assert!(normalized.iter().all(|h| h.source == HitSource::Lexical));
    }
}
