//! Agent Orchestrator - 자기교정 파이프라인
//!
//! ```text
//! DataPrep -> Analysis -> OptimizationDraft -> Judging -> Accepted
//!                               ^                 |
//!                               +-- Regenerating -+ (점수 미달, 예산 남음)
//!                                                 +-> Rejected (예산 소진)
//! ```
//!
//! 생성 실패, 구조 실패, Judge 호출 실패, Judge 반려가 하나의 시도 예산을
//! 공유합니다. 각 LLM 호출은 타임아웃과 취소 토큰으로 감쌉니다.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::judge::{AiJudge, Judge, JudgeVerdict};
use super::stages::{
    aggregate, prepare, AnalysisReport, Drafter, Narrator, Recommendation, StageArtifact,
};
use super::task::AgentTask;
use crate::config::PipelineConfig;
use crate::error::{HubError, HubResult};

/// 단계 요약 최대 길이 (문자)
const STEP_SUMMARY_CHARS: usize = 200;

// ============================================================================
// Types
// ============================================================================

/// 파이프라인 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    DataPrep,
    Analysis,
    OptimizationDraft,
    Judging,
    Regenerating,
    Accepted,
    Rejected,
}

/// 시도 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted,
    BelowThreshold,
    SchemaViolation,
    GenerationFailed,
    JudgeFailed,
}

/// 초안 시도 기록
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub recommendation: Option<Recommendation>,
    pub score: Option<u8>,
    pub reasons: Vec<String>,
}

/// 실행 상태 (run 호출 동안만 존재)
#[derive(Debug)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub state: PipelineState,
    pub attempts: u32,
    pub history: Vec<AttemptRecord>,
    pub started_at: DateTime<Utc>,
}

impl PipelineRun {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: PipelineState::DataPrep,
            attempts: 0,
            history: Vec::new(),
            started_at: Utc::now(),
        }
    }

    fn transition(&mut self, next: PipelineState) {
        tracing::debug!("Run {}: {:?} -> {:?}", self.run_id, self.state, next);
        self.state = next;
    }

    /// 판정된 시도 중 최고 점수 (동점이면 먼저 나온 시도)
    fn best_attempt(&self) -> Option<&AttemptRecord> {
        self.history
            .iter()
            .filter(|r| r.score.is_some() && r.recommendation.is_some())
            .fold(None, |best: Option<&AttemptRecord>, r| match best {
                Some(b) if b.score >= r.score => Some(b),
                _ => Some(r),
            })
    }
}

/// 최종 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Accepted,
    Rejected,
}

/// 단계 요약
#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub name: String,
    pub summary: String,
}

impl StepSummary {
    fn of(artifact: StageArtifact<'_>) -> Self {
        Self {
            name: artifact.stage_name().to_string(),
            summary: truncate(&artifact.summary(), STEP_SUMMARY_CHARS),
        }
    }
}

/// 실행 결과
#[derive(Debug, Clone, Serialize)]
pub struct AgentRunOutcome {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// 품질 기준 충족 여부 (Rejected면 항상 false)
    pub met_quality_bar: bool,
    pub data_summary: String,
    pub analysis_insights: String,
    /// 채택안 또는 최고 점수 시도안
    pub recommendation: Option<Recommendation>,
    pub best_score: Option<u8>,
    pub attempts: u32,
    pub final_reasons: Vec<String>,
    pub history: Vec<AttemptRecord>,
    pub steps: Vec<StepSummary>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

// ============================================================================
// AgentOrchestrator
// ============================================================================

/// 자기교정 파이프라인 실행기
///
/// 상태가 없으므로 여러 실행이 같은 인스턴스를 공유할 수 있습니다.
pub struct AgentOrchestrator {
    narrator: Arc<dyn Narrator>,
    drafter: Arc<dyn Drafter>,
    judge: AiJudge,
    config: PipelineConfig,
}

impl AgentOrchestrator {
    pub fn new(
        narrator: Arc<dyn Narrator>,
        drafter: Arc<dyn Drafter>,
        judge: Arc<dyn Judge>,
        config: PipelineConfig,
    ) -> HubResult<Self> {
        config.validate()?;
        Ok(Self {
            narrator,
            drafter,
            judge: AiJudge::new(judge, config.judge_threshold),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 파이프라인 실행
    ///
    /// 반환 에러는 입력 오류(`InvalidArgument`)와 취소(`Cancelled`)뿐입니다.
    /// 예산 소진은 에러가 아니라 `RunStatus::Rejected` 결과입니다.
    pub async fn run(
        &self,
        task: &AgentTask,
        cancel: &CancellationToken,
    ) -> HubResult<AgentRunOutcome> {
        let mut run = PipelineRun::new();
        let mut steps = Vec::new();
        tracing::info!(
            "Pipeline run {} started ({} domain, {} rows)",
            run.run_id,
            task.domain(),
            task.raw_data().len()
        );

        // 1. DataPrep
        ensure_active(cancel)?;
        let prepared = prepare(task)?;
        steps.push(StepSummary::of(StageArtifact::Prepared(&prepared)));

        // 2. Analysis
        ensure_active(cancel)?;
        run.transition(PipelineState::Analysis);
        let report = self.analyze(task, &prepared, cancel).await?;
        steps.push(StepSummary::of(StageArtifact::Analysis(&report)));

        // 3. OptimizationDraft <-> Judging
        let mut feedback = String::new();
        let mut last_verdict_reasons: Option<Vec<String>> = None;

        for attempt in 1..=self.config.retry_budget {
            ensure_active(cancel)?;
            run.attempts = attempt;
            run.transition(PipelineState::OptimizationDraft);

            let record = self
                .attempt(task, &report, &feedback, attempt, &mut run, cancel)
                .await?;

            steps.push(StepSummary {
                name: format!("OptimizationDraft#{}", attempt),
                summary: describe_attempt(&record),
            });

            if record.outcome == AttemptOutcome::Accepted {
                let score = record.score;
                let reasons = record.reasons.clone();
                let recommendation = record.recommendation.clone();
                run.history.push(record);
                run.transition(PipelineState::Accepted);
                tracing::info!(
                    "Pipeline run {} accepted on attempt {} (score {:?})",
                    run.run_id,
                    attempt,
                    score
                );
                return Ok(finish(run, RunStatus::Accepted, report, recommendation, score, reasons, steps));
            }

            if record.score.is_some() {
                last_verdict_reasons = Some(record.reasons.clone());
            }
            if matches!(
                record.outcome,
                AttemptOutcome::BelowThreshold | AttemptOutcome::SchemaViolation
            ) {
                feedback = compose_feedback(&record.reasons);
            }
            run.history.push(record);

            if attempt < self.config.retry_budget {
                run.transition(PipelineState::Regenerating);
            }
        }

        run.transition(PipelineState::Rejected);
        let final_reasons = last_verdict_reasons
            .or_else(|| run.history.last().map(|r| r.reasons.clone()))
            .unwrap_or_default();
        let (recommendation, best_score) = match run.best_attempt() {
            Some(best) => (best.recommendation.clone(), best.score),
            None => (None, None),
        };

        tracing::warn!(
            "Pipeline run {} rejected after {} attempts (best score {:?})",
            run.run_id,
            run.attempts,
            best_score
        );
        Ok(finish(run, RunStatus::Rejected, report, recommendation, best_score, final_reasons, steps))
    }

    /// 집계 + 서술 (서술 실패는 대체 텍스트로 흡수)
    async fn analyze(
        &self,
        task: &AgentTask,
        prepared: &super::stages::PreparedData,
        cancel: &CancellationToken,
    ) -> HubResult<AnalysisReport> {
        let aggregate = aggregate(prepared);
        let summary = aggregate.to_markdown();

        let narration = self
            .guarded(cancel, self.narrator.narrate(task, &summary))
            .await?;

        let (insights, narrated) = match narration {
            Some(Ok(text)) if !text.trim().is_empty() => (text, true),
            Some(Ok(_)) => {
                tracing::warn!("Narration returned empty text, using deterministic insights");
                (aggregate.fallback_insights(), false)
            }
            Some(Err(e)) => {
                tracing::warn!("Narration failed, using deterministic insights: {:#}", e);
                (aggregate.fallback_insights(), false)
            }
            None => {
                tracing::warn!(
                    "Narration timed out after {:?}, using deterministic insights",
                    self.config.call_timeout()
                );
                (aggregate.fallback_insights(), false)
            }
        };

        Ok(AnalysisReport {
            aggregate,
            summary,
            insights,
            narrated,
        })
    }

    /// 초안 1회 + (유효하면) 채점 1회
    async fn attempt(
        &self,
        task: &AgentTask,
        report: &AnalysisReport,
        feedback: &str,
        attempt: u32,
        run: &mut PipelineRun,
        cancel: &CancellationToken,
    ) -> HubResult<AttemptRecord> {
        let failed = |outcome, reason: String| AttemptRecord {
            attempt,
            outcome,
            recommendation: None,
            score: None,
            reasons: vec![reason],
        };

        let raw = match self
            .guarded(cancel, self.drafter.draft(task, report, feedback))
            .await?
        {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => {
                let failure = HubError::GenerationFailure(format!("draft call failed: {:#}", e));
                tracing::warn!("Attempt {}: {}", attempt, failure);
                return Ok(failed(AttemptOutcome::GenerationFailed, failure.to_string()));
            }
            None => {
                let failure = HubError::GenerationFailure(format!(
                    "draft call timed out after {:?}",
                    self.config.call_timeout()
                ));
                tracing::warn!("Attempt {}: {}", attempt, failure);
                return Ok(failed(AttemptOutcome::GenerationFailed, failure.to_string()));
            }
        };

        let draft = match Recommendation::parse(&raw) {
            Ok(draft) => draft,
            Err(violation) => {
                tracing::warn!("Attempt {}: {}", attempt, violation);
                return Ok(failed(AttemptOutcome::SchemaViolation, violation));
            }
        };

        run.transition(PipelineState::Judging);
        let verdict: JudgeVerdict = match self
            .guarded(cancel, self.judge.score(&draft, task))
            .await?
        {
            Some(Ok(verdict)) => verdict,
            Some(Err(failure)) => {
                tracing::warn!("Attempt {}: {}", attempt, failure);
                return Ok(failed(AttemptOutcome::JudgeFailed, failure.to_string()));
            }
            None => {
                let failure = HubError::GenerationFailure(format!(
                    "judge call timed out after {:?}",
                    self.config.call_timeout()
                ));
                tracing::warn!("Attempt {}: {}", attempt, failure);
                return Ok(failed(AttemptOutcome::JudgeFailed, failure.to_string()));
            }
        };

        tracing::info!(
            "Attempt {}: judge score {} (threshold {}, pass: {})",
            attempt,
            verdict.score(),
            self.judge.threshold(),
            verdict.pass()
        );

        Ok(AttemptRecord {
            attempt,
            outcome: if verdict.pass() {
                AttemptOutcome::Accepted
            } else {
                AttemptOutcome::BelowThreshold
            },
            recommendation: Some(draft),
            score: Some(verdict.score()),
            reasons: verdict.reasons().to_vec(),
        })
    }

    /// LLM 호출 래퍼 - 취소 우선, 타임아웃 시 None
    async fn guarded<F: Future>(
        &self,
        cancel: &CancellationToken,
        call: F,
    ) -> HubResult<Option<F::Output>> {
        ensure_active(cancel)?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HubError::Cancelled),
            result = tokio::time::timeout(self.config.call_timeout(), call) => Ok(result.ok()),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 반려 사유를 다음 초안용 번호 목록으로 변환 (사유는 그대로)
pub fn compose_feedback(reasons: &[String]) -> String {
    reasons
        .iter()
        .enumerate()
        .map(|(i, reason)| format!("{}. {}", i + 1, reason))
        .collect::<Vec<_>>()
        .join("\n")
}

fn ensure_active(cancel: &CancellationToken) -> HubResult<()> {
    if cancel.is_cancelled() {
        tracing::info!("Pipeline run cancelled");
        return Err(HubError::Cancelled);
    }
    Ok(())
}

fn describe_attempt(record: &AttemptRecord) -> String {
    let head = match (record.outcome, record.score) {
        (AttemptOutcome::Accepted, Some(score)) => format!("accepted with score {}", score),
        (AttemptOutcome::BelowThreshold, Some(score)) => format!("rejected with score {}", score),
        (AttemptOutcome::SchemaViolation, _) => "schema violation".to_string(),
        (AttemptOutcome::JudgeFailed, _) => "judge unavailable".to_string(),
        _ => "draft unavailable".to_string(),
    };

    // 사유가 없으면 (통과) 채택안 요약
    let detail = match (record.reasons.first(), &record.recommendation) {
        (Some(reason), _) => Some(reason.clone()),
        (None, Some(draft)) => Some(StageArtifact::Draft(draft).summary()),
        (None, None) => None,
    };

    match detail {
        Some(detail) => truncate(&format!("{}: {}", head, detail), STEP_SUMMARY_CHARS),
        None => head,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    }
}

fn finish(
    run: PipelineRun,
    status: RunStatus,
    report: AnalysisReport,
    recommendation: Option<Recommendation>,
    best_score: Option<u8>,
    final_reasons: Vec<String>,
    steps: Vec<StepSummary>,
) -> AgentRunOutcome {
    let elapsed_ms = (Utc::now() - run.started_at).num_milliseconds().max(0) as u64;
    AgentRunOutcome {
        run_id: run.run_id,
        status,
        met_quality_bar: status == RunStatus::Accepted,
        data_summary: report.summary,
        analysis_insights: report.insights,
        recommendation,
        best_score,
        attempts: run.attempts,
        final_reasons,
        history: run.history,
        steps,
        started_at: run.started_at,
        elapsed_ms,
    }
}

// ============================================================================
// Tests
// ============================================================================
