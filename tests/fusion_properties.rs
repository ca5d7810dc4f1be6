//! RRF 퓨전 + 컨텍스트 조립 속성 테스트

use agenthub_rag::retrieval::{assemble, fuse, FusedHit, HitSource, Metadata, RetrievalHit};
use proptest::prelude::*;

const C: f64 = 60.0;

fn ranked(ids: &[String], source: HitSource, text_prefix: &str) -> Vec<RetrievalHit> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            let mut metadata = Metadata::new();
            metadata.insert("origin".to_string(), source.as_str().to_string());
            RetrievalHit {
                chunk_id: id.clone(),
                source,
                raw_score: 1.0 / (i as f64 + 1.0),
                rank: i + 1,
                text: Some(format!("{} {}", text_prefix, id)),
                metadata,
            }
        })
        .collect()
}

fn ids(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{}{:02}", prefix, i)).collect()
}

/// 0..20 풀에서 중복 없는 chunk_id 순열
fn arb_id_list() -> impl Strategy<Value = Vec<String>> {
    prop::sample::subsequence((0..20).collect::<Vec<usize>>(), 0..=20)
        .prop_shuffle()
        .prop_map(|picked| picked.into_iter().map(|i| format!("c{:02}", i)).collect())
}

fn arb_fused() -> impl Strategy<Value = Vec<FusedHit>> {
    prop::collection::vec(prop::option::weighted(0.9, "[a-z ]{0,40}"), 0..15).prop_map(|texts| {
        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| FusedHit {
                chunk_id: format!("doc#{}", i),
                fused_score: 1.0 / (C + i as f64 + 1.0),
                contributing_ranks: [(HitSource::Vector, i + 1)].into_iter().collect(),
                text,
                metadata: Metadata::new(),
            })
            .collect()
    })
}

// ── Fusion ───────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn disjoint_lists_keep_single_source_scores(
        n in 0usize..15,
        m in 0usize..15,
        k in 1usize..40,
    ) {
        let vector = ranked(&ids("v", n), HitSource::Vector, "vec");
        let lexical = ranked(&ids("l", m), HitSource::Lexical, "lex");

        let fused = fuse(&vector, &lexical, k, C).unwrap();
        prop_assert_eq!(fused.len(), (n + m).min(k));

        for hit in &fused {
            prop_assert_eq!(hit.contributing_ranks.len(), 1);
            let (_, &rank) = hit.contributing_ranks.iter().next().unwrap();
            prop_assert_eq!(hit.fused_score, 1.0 / (C + rank as f64));
        }
    }

    #[test]
    fn overlapping_hits_sum_both_ranks(
        vector_ids in arb_id_list(),
        lexical_ids in arb_id_list(),
    ) {
        let vector = ranked(&vector_ids, HitSource::Vector, "vec");
        let lexical = ranked(&lexical_ids, HitSource::Lexical, "lex");

        let fused = fuse(&vector, &lexical, 100, C).unwrap();

        for hit in &fused {
            let expected: f64 = [
                vector_ids.iter().position(|id| *id == hit.chunk_id),
                lexical_ids.iter().position(|id| *id == hit.chunk_id),
            ]
            .iter()
            .flatten()
            .map(|&i| 1.0 / (C + (i + 1) as f64))
            .sum();
            prop_assert!((hit.fused_score - expected).abs() < 1e-12);

            // 양쪽에 있으면 벡터 텍스트 우선
            if vector_ids.contains(&hit.chunk_id) {
                let expected_text = format!("vec {}", hit.chunk_id);
                prop_assert_eq!(hit.text.as_deref(), Some(expected_text.as_str()));
                prop_assert_eq!(hit.metadata.get("origin").map(String::as_str), Some("vector"));
            }
        }
    }

    #[test]
    fn fusion_ignores_argument_order(
        vector_ids in arb_id_list(),
        lexical_ids in arb_id_list(),
        k in 1usize..25,
    ) {
        let vector = ranked(&vector_ids, HitSource::Vector, "vec");
        let lexical = ranked(&lexical_ids, HitSource::Lexical, "lex");

        let forward = fuse(&vector, &lexical, k, C).unwrap();
        let swapped = fuse(&lexical, &vector, k, C).unwrap();
        prop_assert_eq!(forward, swapped);
    }

    #[test]
    fn fused_order_is_descending_with_id_ties(
        vector_ids in arb_id_list(),
        lexical_ids in arb_id_list(),
    ) {
        let vector = ranked(&vector_ids, HitSource::Vector, "vec");
        let lexical = ranked(&lexical_ids, HitSource::Lexical, "lex");

        let fused = fuse(&vector, &lexical, 100, C).unwrap();
        for pair in fused.windows(2) {
            prop_assert!(
                pair[0].fused_score > pair[1].fused_score
                    || (pair[0].fused_score == pair[1].fused_score
                        && pair[0].chunk_id < pair[1].chunk_id)
            );
        }
    }

    #[test]
    fn empty_inputs_fuse_to_empty(k in 1usize..100) {
        prop_assert!(fuse(&[], &[], k, C).unwrap().is_empty());
    }
}

// ── Context assembly ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn context_never_exceeds_budget(fused in arb_fused(), budget in 0usize..300) {
        let context = assemble(&fused, budget);
        prop_assert!(context.size() <= budget);

        let counted: usize = context.blocks().iter().map(|b| b.text.chars().count()).sum();
        prop_assert_eq!(counted, context.size());
    }

    #[test]
    fn dropping_lowest_hit_never_grows_context(fused in arb_fused(), budget in 0usize..300) {
        prop_assume!(!fused.is_empty());

        let full = assemble(&fused, budget);
        let trimmed = assemble(&fused[..fused.len() - 1], budget);
        prop_assert!(trimmed.size() <= full.size());
    }

    #[test]
    fn context_follows_fused_order(fused in arb_fused(), budget in 0usize..300) {
        let context = assemble(&fused, budget);
        let positions: Vec<usize> = context
            .blocks()
            .iter()
            .filter_map(|b| fused.iter().position(|h| h.chunk_id == b.chunk_id))
            .collect();
        prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
