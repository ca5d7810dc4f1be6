//! Agent 모듈 - 자기교정 에이전트 파이프라인
//!
//! DataPrep -> Analysis -> OptimizationDraft -> Judging 순서로 실행하고,
//! Judge 점수가 기준에 못 미치면 사유를 되먹여 초안을 다시 만듭니다.
//!
//! - `task`: 작업 정의와 도메인
//! - `schema`: 도메인별 행 스키마
//! - `stages`: 단계별 처리와 LLM 협력자 트레이트
//! - `judge`: 판정 계약과 AI Judge
//! - `orchestrator`: 상태 기계와 재시도 루프

mod judge;
mod orchestrator;
mod schema;
mod stages;
mod task;

pub use judge::{parse_judge_output, AiJudge, Judge, JudgeOutput, JudgeVerdict, LlmJudge};
pub use orchestrator::{
    compose_feedback, AgentOrchestrator, AgentRunOutcome, AttemptOutcome, AttemptRecord,
    PipelineRun, PipelineState, RunStatus, StepSummary,
};
pub use schema::{Direction, FieldSpec, FieldType, RowSchema, ValidRow};
pub use stages::{
    aggregate, prepare, Aggregate, AnalysisReport, Drafter, GroupStats, LlmDrafter, LlmNarrator,
    MetricLeader, Narrator, PreparedData, Recommendation, StageArtifact, TrendDelta,
};
pub use task::{AgentTask, Domain, Row};
