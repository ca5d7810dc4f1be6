//! 자기교정 파이프라인 통합 테스트
//!
//! 실제 LLM 협력자(LlmNarrator, LlmDrafter, LlmJudge)에 각본대로 답하는
//! 게이트웨이를 물려서 프롬프트 -> 파싱 -> 판정 -> 재시도 흐름을 검증합니다.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agenthub_rag::agent::{
    AgentOrchestrator, AgentTask, AttemptOutcome, Domain, LlmDrafter, LlmJudge,
    LlmNarrator, Narrator, Row, RunStatus,
};
use agenthub_rag::config::PipelineConfig;
use agenthub_rag::error::HubError;
use agenthub_rag::llm::{prompts, LlmGateway};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use tokio_util::sync::CancellationToken;

const VALID_DRAFT: &str = r#"{"action": "Move 20% of budget from campaign b to campaign a", "rationale": "campaign a has the lowest cpa", "expected_impact": "about 15% more conversions", "targets": ["a", "b"]}"#;

// ============================================================================
// Scripted gateway
// ============================================================================

/// 시스템 프롬프트로 단계를 구분해 각본 응답을 돌려주는 게이트웨이
///
/// 각본이 끝나면 마지막 응답을 반복합니다.
#[derive(Default)]
struct ScriptedLlm {
    drafts: Vec<String>,
    verdicts: Vec<String>,
    fail_analysis: bool,
    fail_drafts: bool,
    fail_judge: bool,
    /// 초안 응답 전 대기 (호출 타임아웃 확인용)
    draft_delay: Option<Duration>,
    draft_prompts: Mutex<Vec<String>>,
    analysis_calls: AtomicUsize,
    judge_calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(drafts: &[&str], verdicts: &[&str]) -> Self {
        Self {
            drafts: drafts.iter().map(|s| s.to_string()).collect(),
            verdicts: verdicts.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    fn draft_prompts(&self) -> Vec<String> {
        self.draft_prompts.lock().unwrap().clone()
    }

    fn total_calls(&self) -> usize {
        self.analysis_calls.load(Ordering::SeqCst)
            + self.judge_calls.load(Ordering::SeqCst)
            + self.draft_prompts().len()
    }
}

fn scripted(list: &[String], index: usize) -> Result<String> {
    list.get(index)
        .or_else(|| list.last())
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("script is empty"))
}

#[async_trait]
impl LlmGateway for ScriptedLlm {
    async fn generate(&self, system_prompt: &str, user_prompt: &str, _domain: Domain) -> Result<String> {
        if system_prompt == prompts::ANALYSIS_SYSTEM_PROMPT {
            self.analysis_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_analysis {
                anyhow::bail!("analysis model unavailable");
            }
            return Ok("campaign a converts cheaper than campaign b".to_string());
        }

        if system_prompt == prompts::DRAFT_SYSTEM_PROMPT {
            let index = {
                let mut recorded = self.draft_prompts.lock().unwrap();
                recorded.push(user_prompt.to_string());
                recorded.len() - 1
            };
            if let Some(delay) = self.draft_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_drafts {
                anyhow::bail!("draft model overloaded");
            }
            return scripted(&self.drafts, index);
        }

        if system_prompt == prompts::JUDGE_SYSTEM_PROMPT {
            let index = self.judge_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_judge {
                anyhow::bail!("judge model unreachable");
            }
            return scripted(&self.verdicts, index);
        }

        anyhow::bail!("unexpected system prompt: {}", system_prompt)
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn ads_rows() -> Vec<Row> {
    let rows = json!([
        {"date": "2024-01-01", "campaign_name": "a", "impressions": 1000, "clicks": 50, "conversions": 5, "spend": 100.0},
        {"date": "2024-01-02", "campaign_name": "a", "impressions": 1200, "clicks": 60, "conversions": 7, "spend": 110.0},
        {"date": "2024-01-01", "campaign_name": "b", "impressions": 800, "clicks": 20, "conversions": 1, "spend": 120.0},
        {"date": "2024-01-02", "campaign_name": "b", "impressions": 900, "clicks": 25, "conversions": 1, "spend": 130.0}
    ]);

    rows.as_array()
        .unwrap()
        .iter()
        .map(|row| row.as_object().unwrap().clone())
        .collect()
}

fn ads_task() -> AgentTask {
    AgentTask::new("Reduce cost per acquisition", Domain::Ads, ads_rows()).unwrap()
}

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        judge_threshold: 80,
        retry_budget: 3,
        call_timeout_ms: 5_000,
    }
}

fn orchestrator(llm: Arc<ScriptedLlm>) -> AgentOrchestrator {
    orchestrator_with(llm, pipeline_config())
}

fn orchestrator_with(llm: Arc<ScriptedLlm>, config: PipelineConfig) -> AgentOrchestrator {
    AgentOrchestrator::new(
        Arc::new(LlmNarrator::new(llm.clone())),
        Arc::new(LlmDrafter::new(llm.clone())),
        Arc::new(LlmJudge::new(llm)),
        config,
    )
    .unwrap()
}

// ============================================================================
// Retry loop
// ============================================================================

#[tokio::test]
async fn accepted_on_first_cycle() {
    let llm = Arc::new(ScriptedLlm::new(
        &[VALID_DRAFT],
        &[r#"{"score": 95, "reasons": []}"#],
    ));

    let outcome = orchestrator(llm.clone())
        .run(&ads_task(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Accepted);
    assert!(outcome.met_quality_bar);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.best_score, Some(95));
    assert_eq!(outcome.recommendation.unwrap().targets, vec!["a", "b"]);
    assert_eq!(llm.judge_calls.load(Ordering::SeqCst), 1);

    let names: Vec<&str> = outcome.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["DataPrep", "Analysis", "OptimizationDraft#1"]);
    assert_eq!(outcome.steps[0].summary, "4 rows validated, 0 outside date range");
    assert!(outcome.steps[2].summary.starts_with("accepted with score 95: Move 20%"));
    assert!(outcome.data_summary.contains("cpa"));
}

#[tokio::test]
async fn rejected_after_exhausting_budget() {
    let llm = Arc::new(ScriptedLlm::new(
        &[VALID_DRAFT],
        &[r#"{"score": 40, "reasons": ["no budget numbers"]}"#],
    ));

    let outcome = orchestrator(llm.clone())
        .run(&ads_task(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Rejected);
    assert!(!outcome.met_quality_bar);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.history.len(), 3);
    assert!(outcome
        .history
        .iter()
        .all(|r| r.outcome == AttemptOutcome::BelowThreshold));
    assert_eq!(outcome.final_reasons, ["no budget numbers"]);
    assert_eq!(outcome.best_score, Some(40));
    assert!(outcome.recommendation.is_some());
    assert_eq!(llm.judge_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn judge_reasons_feed_the_next_draft() {
    let llm = Arc::new(ScriptedLlm::new(
        &[VALID_DRAFT],
        &[
            r#"{"score": 40, "reasons": ["cite the cpa numbers", "name the campaigns"]}"#,
            r#"{"score": 90, "reasons": []}"#,
        ],
    ));

    let outcome = orchestrator(llm.clone())
        .run(&ads_task(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Accepted);
    assert_eq!(outcome.attempts, 2);

    let drafts = llm.draft_prompts();
    assert_eq!(drafts.len(), 2);
    assert!(!drafts[0].contains("cite the cpa numbers"));
    assert!(drafts[1].ends_with("1. cite the cpa numbers\n2. name the campaigns"));
}

#[tokio::test]
async fn invalid_draft_consumes_attempt_without_judging() {
    let llm = Arc::new(ScriptedLlm::new(
        &["I think you should spend less.", r#"{"action": "pause b"}"#, VALID_DRAFT],
        &[r#"{"score": 88, "reasons": []}"#],
    ));

    let outcome = orchestrator(llm.clone())
        .run(&ads_task(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Accepted);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.history[0].outcome, AttemptOutcome::SchemaViolation);
    assert_eq!(outcome.history[1].outcome, AttemptOutcome::SchemaViolation);
    assert!(outcome.history[1].reasons[0].contains("rationale"));
    assert_eq!(llm.judge_calls.load(Ordering::SeqCst), 1);

    // 구조 실패 사유도 다음 초안에 전달
    assert!(llm.draft_prompts()[1].contains("schema violation"));
}

#[tokio::test]
async fn out_of_range_score_fails_with_contract_reason() {
    let llm = Arc::new(ScriptedLlm::new(
        &[VALID_DRAFT],
        &[r#"{"score": 150, "reasons": ["excellent"]}"#],
    ));

    let outcome = orchestrator(llm)
        .run(&ads_task(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Rejected);
    assert_eq!(outcome.best_score, Some(0));
    assert!(outcome.final_reasons[0].starts_with("judge contract violation"));
    assert_eq!(outcome.final_reasons[1], "excellent");
}

// ============================================================================
// Call failures share the attempt budget
// ============================================================================

#[tokio::test]
async fn draft_timeout_consumes_an_attempt() {
    let llm = Arc::new(ScriptedLlm {
        draft_delay: Some(Duration::from_millis(500)),
        ..ScriptedLlm::new(&[VALID_DRAFT], &[r#"{"score": 95, "reasons": []}"#])
    });
    let config = PipelineConfig {
        call_timeout_ms: 50,
        ..pipeline_config()
    };

    let outcome = orchestrator_with(llm.clone(), config)
        .run(&ads_task(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Rejected);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(llm.draft_prompts().len(), 3);
    assert_eq!(llm.judge_calls.load(Ordering::SeqCst), 0);
    assert!(outcome
        .history
        .iter()
        .all(|r| r.outcome == AttemptOutcome::GenerationFailed));
    assert_eq!(outcome.final_reasons.len(), 1);
    assert!(outcome.final_reasons[0].contains("draft call timed out"), "{:?}", outcome.final_reasons);
    assert!(outcome.recommendation.is_none());
    assert_eq!(outcome.best_score, None);
}

#[tokio::test]
async fn draft_errors_consume_budget_without_judging() {
    let llm = Arc::new(ScriptedLlm {
        fail_drafts: true,
        ..ScriptedLlm::new(&[VALID_DRAFT], &[r#"{"score": 95, "reasons": []}"#])
    });

    let outcome = orchestrator(llm.clone())
        .run(&ads_task(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Rejected);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(llm.judge_calls.load(Ordering::SeqCst), 0);
    assert!(outcome
        .history
        .iter()
        .all(|r| r.outcome == AttemptOutcome::GenerationFailed));
    assert!(outcome.final_reasons[0].contains("draft model overloaded"));

    // 호출 실패 사유는 다음 초안에 되먹이지 않음
    assert!(llm.draft_prompts().iter().all(|p| !p.contains("overloaded")));
}

#[tokio::test]
async fn judge_errors_consume_budget() {
    let llm = Arc::new(ScriptedLlm {
        fail_judge: true,
        ..ScriptedLlm::new(&[VALID_DRAFT], &[r#"{"score": 95, "reasons": []}"#])
    });

    let outcome = orchestrator(llm.clone())
        .run(&ads_task(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Rejected);
    assert!(!outcome.met_quality_bar);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(llm.draft_prompts().len(), 3);
    assert_eq!(llm.judge_calls.load(Ordering::SeqCst), 3);
    assert!(outcome
        .history
        .iter()
        .all(|r| r.outcome == AttemptOutcome::JudgeFailed));
    assert!(outcome.final_reasons[0].contains("judge call failed"), "{:?}", outcome.final_reasons);
    assert!(outcome.final_reasons[0].contains("judge model unreachable"));
    // 채점된 시도가 없으므로 최고 점수안도 없음
    assert!(outcome.recommendation.is_none());
    assert_eq!(outcome.best_score, None);
}

#[tokio::test]
async fn narration_failure_uses_deterministic_insights() {
    let llm = Arc::new(ScriptedLlm {
        fail_analysis: true,
        ..ScriptedLlm::new(&[VALID_DRAFT], &[r#"{"score": 85, "reasons": []}"#])
    });

    let outcome = orchestrator(llm.clone())
        .run(&ads_task(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Accepted);
    assert_eq!(llm.analysis_calls.load(Ordering::SeqCst), 1);
    assert!(!outcome.analysis_insights.is_empty());
    assert!(!outcome.analysis_insights.contains("converts cheaper"));
}

// ============================================================================
// Input errors
// ============================================================================

#[tokio::test]
async fn invalid_row_is_rejected_before_any_llm_call() {
    let mut rows = ads_rows();
    rows[2].insert("clicks".to_string(), json!("many"));
    let task = AgentTask::new("Reduce cpa", Domain::Ads, rows).unwrap();

    let llm = Arc::new(ScriptedLlm::new(&[VALID_DRAFT], &[r#"{"score": 95}"#]));
    let err = orchestrator(llm.clone())
        .run(&task, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        HubError::InvalidArgument(message) => {
            assert!(message.contains("row 2"), "{}", message);
            assert!(message.contains("clicks"), "{}", message);
        }
        other => panic!("expected InvalidArgument, got {:?}", other),
    }
    assert_eq!(llm.total_calls(), 0);
}

#[tokio::test]
async fn date_range_without_rows_is_invalid() {
    let task = ads_task()
        .with_date_range(NaiveDate::from_ymd_opt(2024, 2, 1), NaiveDate::from_ymd_opt(2024, 2, 28))
        .unwrap();

    let llm = Arc::new(ScriptedLlm::new(&[VALID_DRAFT], &[r#"{"score": 95}"#]));
    let err = orchestrator(llm)
        .run(&task, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, HubError::InvalidArgument(_)));
}

#[test]
fn zero_retry_budget_is_a_config_error() {
    let llm = Arc::new(ScriptedLlm::default());
    let result = AgentOrchestrator::new(
        Arc::new(LlmNarrator::new(llm.clone())),
        Arc::new(LlmDrafter::new(llm.clone())),
        Arc::new(LlmJudge::new(llm)),
        PipelineConfig {
            retry_budget: 0,
            ..pipeline_config()
        },
    );

    assert!(matches!(result, Err(HubError::Config(_))));
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn cancelled_token_stops_before_data_prep() {
    let llm = Arc::new(ScriptedLlm::new(&[VALID_DRAFT], &[r#"{"score": 95}"#]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = orchestrator(llm.clone()).run(&ads_task(), &cancel).await.unwrap_err();
    assert!(matches!(err, HubError::Cancelled));
    assert_eq!(llm.total_calls(), 0);
}

/// 서술 도중 취소 신호를 보내는 협력자
struct CancellingNarrator(CancellationToken);

#[async_trait]
impl Narrator for CancellingNarrator {
    async fn narrate(&self, _task: &AgentTask, _summary: &str) -> Result<String> {
        self.0.cancel();
        Ok("insights".to_string())
    }
}

#[tokio::test]
async fn cancellation_between_stages_skips_drafting() {
    let llm = Arc::new(ScriptedLlm::new(&[VALID_DRAFT], &[r#"{"score": 95}"#]));
    let cancel = CancellationToken::new();

    let orchestrator = AgentOrchestrator::new(
        Arc::new(CancellingNarrator(cancel.clone())),
        Arc::new(LlmDrafter::new(llm.clone())),
        Arc::new(LlmJudge::new(llm.clone())),
        pipeline_config(),
    )
    .unwrap();

    let err = orchestrator.run(&ads_task(), &cancel).await.unwrap_err();
    assert!(matches!(err, HubError::Cancelled));
    assert!(llm.draft_prompts().is_empty());
}
