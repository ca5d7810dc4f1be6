//! AI Judge - 초안 품질 채점
//!
//! Judge 원시 출력은 `JudgeVerdict::evaluate`를 거쳐야만 판정이 됩니다.
//! 점수 누락/범위 밖은 0점 실패로, 사유 없는 실패는 계약 위반 사유를
//! 넣어서 돌려줍니다. 실패한 판정의 사유는 절대 비어 있지 않습니다.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::stages::{extract_json_object, Recommendation};
use super::task::AgentTask;
use crate::error::{HubError, HubResult};
use crate::llm::{prompts, LlmGateway};

// ============================================================================
// Types
// ============================================================================

/// Judge 원시 출력 (검증 전)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JudgeOutput {
    pub score: Option<i64>,
    pub reasons: Vec<String>,
}

/// 확정 판정 (생성 후 불변)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgeVerdict {
    score: u8,
    pass: bool,
    reasons: Vec<String>,
}

impl JudgeVerdict {
    /// 원시 출력을 계약에 맞게 판정으로 변환
    ///
    /// # Arguments
    /// * `output` - Judge 원시 출력
    /// * `threshold` - 통과 기준 점수 (이상이면 통과)
    pub fn evaluate(output: JudgeOutput, threshold: u8) -> Self {
        let reasons: Vec<String> = output
            .reasons
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();

        let score = match output.score {
            None => return Self::contract_violation("score is missing", reasons),
            Some(s) if !(0..=100).contains(&s) => {
                return Self::contract_violation(&format!("score {} is outside 0..=100", s), reasons)
            }
            Some(s) => s as u8,
        };

        let pass = score >= threshold;
        if !pass && reasons.is_empty() {
            return Self::contract_violation_with_score(
                score,
                "failing verdict without reasons",
                reasons,
            );
        }

        Self { score, pass, reasons }
    }

    fn contract_violation(detail: &str, reasons: Vec<String>) -> Self {
        Self::contract_violation_with_score(0, detail, reasons)
    }

    fn contract_violation_with_score(score: u8, detail: &str, mut reasons: Vec<String>) -> Self {
        let violation = HubError::JudgeContractViolation(detail.to_string());
        tracing::warn!("{}", violation);
        reasons.insert(0, violation.to_string());
        Self {
            score,
            pass: false,
            reasons,
        }
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn pass(&self) -> bool {
        self.pass
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }
}

// ============================================================================
// Judge Trait
// ============================================================================

/// Judge 협력자 - 초안을 과제 기준으로 채점
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, task: &AgentTask, draft: &Recommendation) -> Result<JudgeOutput>;
}

/// 판정 계약을 강제하는 Judge 래퍼
pub struct AiJudge {
    judge: Arc<dyn Judge>,
    threshold: u8,
}

impl AiJudge {
    pub fn new(judge: Arc<dyn Judge>, threshold: u8) -> Self {
        Self { judge, threshold }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// 초안 채점
    ///
    /// 구조 검증을 통과한 초안만 받습니다. Judge 호출 자체가 실패하면
    /// `GenerationFailure`를 반환합니다 (호출자가 시도 1회로 계산).
    pub async fn score(&self, draft: &Recommendation, task: &AgentTask) -> HubResult<JudgeVerdict> {
        let output = self
            .judge
            .judge(task, draft)
            .await
            .map_err(|e| HubError::GenerationFailure(format!("judge call failed: {:#}", e)))?;

        Ok(JudgeVerdict::evaluate(output, self.threshold))
    }
}

// ============================================================================
// LlmJudge
// ============================================================================

/// LLM 기반 Judge
///
/// `{"score": int, "reasons": [..]}` 형식을 요청합니다. JSON이 아니거나
/// 점수가 정수가 아니면 점수 없는 출력으로 넘겨 계약 위반으로 처리됩니다.
pub struct LlmJudge {
    llm: Arc<dyn LlmGateway>,
}

impl LlmJudge {
    pub fn new(llm: Arc<dyn LlmGateway>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Judge for LlmJudge {
    async fn judge(&self, task: &AgentTask, draft: &Recommendation) -> Result<JudgeOutput> {
        let raw = self
            .llm
            .generate(
                prompts::JUDGE_SYSTEM_PROMPT,
                &prompts::judge_prompt(task.description(), &draft.to_json()),
                task.domain(),
            )
            .await?;

        Ok(parse_judge_output(&raw))
    }
}

/// Judge 응답 파싱 (관대하게 읽고 판정은 evaluate에 맡김)
pub fn parse_judge_output(raw: &str) -> JudgeOutput {
    let Some(value) = extract_json_object(raw).and_then(|s| serde_json::from_str::<Value>(s).ok())
    else {
        tracing::debug!("Judge output is not JSON: {}", raw);
        return JudgeOutput::default();
    };

    let score = value.get("score").and_then(Value::as_i64);
    let reasons = match value.get("reasons") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(reason)) => vec![reason.clone()],
        _ => vec![],
    };

    JudgeOutput { score, reasons }
}

// ============================================================================
// Tests
// ============================================================================
