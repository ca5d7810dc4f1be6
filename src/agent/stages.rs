//! 파이프라인 단계 - DataPrep / Analysis / OptimizationDraft
//!
//! - DataPrep: 스키마 검증 + 날짜 범위 필터 (순수 함수)
//! - Analysis: 결정적 집계 + LLM 서술 (서술은 참고용, 채점 대상 아님)
//! - OptimizationDraft: JSON 제안 생성 + 구조 검증

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::schema::{Direction, Reduce, RowSchema, ValidRow};
use super::task::AgentTask;
use crate::error::{HubError, HubResult};
use crate::llm::{prompts, LlmGateway};

/// 응답에서 JSON 객체 부분 (첫 `{` ~ 마지막 `}`)
static JSON_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("JSON object pattern is a valid literal"));

// ============================================================================
// Artifacts
// ============================================================================

/// 단계 산출물 - 각 단계 출력을 가리키는 태그 뷰
///
/// 산출물 자체는 실행(run)이 독점 소유하고, 오케스트레이터는 이 뷰로
/// 단계 이름과 요약을 만듭니다.
#[derive(Debug, Clone, Copy)]
pub enum StageArtifact<'a> {
    Prepared(&'a PreparedData),
    Analysis(&'a AnalysisReport),
    Draft(&'a Recommendation),
}

impl StageArtifact<'_> {
    /// 산출물을 만든 단계 이름
    pub fn stage_name(&self) -> &'static str {
        match self {
            StageArtifact::Prepared(_) => "DataPrep",
            StageArtifact::Analysis(_) => "Analysis",
            StageArtifact::Draft(_) => "OptimizationDraft",
        }
    }

    /// 한 줄 요약 (자르지 않음)
    pub fn summary(&self) -> String {
        match self {
            StageArtifact::Prepared(data) => format!(
                "{} rows validated, {} outside date range",
                data.rows.len(),
                data.excluded
            ),
            StageArtifact::Analysis(report) => report.insights.clone(),
            StageArtifact::Draft(draft) => draft.action.clone(),
        }
    }
}

/// DataPrep 결과
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub schema: &'static RowSchema,
    /// 날짜 범위 안의 검증된 행
    pub rows: Vec<ValidRow>,
    /// 날짜 범위 밖이라 제외된 행 수
    pub excluded: usize,
}

/// 그룹별 집계
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub group: String,
    pub rows: usize,
    /// 기본 지표 + 파생 지표 (스키마 순서)
    pub metrics: Vec<(String, f64)>,
}

impl GroupStats {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

/// 지표별 최고/최저 그룹
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricLeader {
    pub metric: String,
    pub best: String,
    pub best_value: f64,
    pub worst: String,
    pub worst_value: f64,
}

/// 그룹별 첫 날짜 -> 마지막 날짜 변화량
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendDelta {
    pub group: String,
    pub metric: String,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub first: f64,
    pub last: f64,
    pub delta: f64,
}

/// 결정적 집계 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregate {
    pub group_field: String,
    pub period: (NaiveDate, NaiveDate),
    pub groups: Vec<GroupStats>,
    pub leaders: Vec<MetricLeader>,
    pub trends: Vec<TrendDelta>,
}

/// Analysis 결과
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub aggregate: Aggregate,
    /// 마크다운 요약 (표 + 최고/최저 + 추세)
    pub summary: String,
    /// 서술형 인사이트 (LLM 또는 대체 텍스트)
    pub insights: String,
    /// LLM 서술 성공 여부
    pub narrated: bool,
}

// ============================================================================
// DataPrep
// ============================================================================

/// 입력 데이터 검증 + 날짜 범위 필터
///
/// 모든 행을 먼저 검증하고 첫 위반에서 실패합니다.
pub fn prepare(task: &AgentTask) -> HubResult<PreparedData> {
    let schema = RowSchema::for_domain(task.domain());

    if task.raw_data().is_empty() {
        return Err(HubError::InvalidArgument("raw_data must not be empty".to_string()));
    }

    let validated = task
        .raw_data()
        .iter()
        .enumerate()
        .map(|(i, row)| schema.validate_row(i, row))
        .collect::<HubResult<Vec<_>>>()?;

    let total = validated.len();
    let rows: Vec<ValidRow> = validated
        .into_iter()
        .filter(|row| task.in_range(row.date))
        .collect();

    if rows.is_empty() {
        return Err(HubError::InvalidArgument(format!(
            "no rows left after applying date range {} ~ {}",
            task.date_start().map(|d| d.to_string()).unwrap_or_else(|| "*".into()),
            task.date_end().map(|d| d.to_string()).unwrap_or_else(|| "*".into()),
        )));
    }

    tracing::debug!("Prepared {} of {} rows", rows.len(), total);

    Ok(PreparedData {
        schema,
        excluded: total - rows.len(),
        rows,
    })
}

// ============================================================================
// Analysis (deterministic part)
// ============================================================================

/// 그룹별 집계 (순수 함수)
pub fn aggregate(prepared: &PreparedData) -> Aggregate {
    let schema = prepared.schema;

    let mut by_group: BTreeMap<&str, Vec<&ValidRow>> = BTreeMap::new();
    for row in &prepared.rows {
        by_group.entry(row.group.as_str()).or_default().push(row);
    }

    let mut groups = Vec::with_capacity(by_group.len());
    let mut trends = Vec::new();

    for (group, rows) in &by_group {
        let mut metrics = Vec::new();
        for spec in schema.metrics {
            metrics.push((spec.name.to_string(), reduce(rows, spec.name, spec.reduce)));
        }

        for spec in schema.derived {
            let numerator = reduce(rows, spec.numerator, Reduce::Sum);
            let denominator = reduce(rows, spec.denominator, Reduce::Sum).max(1.0);
            metrics.push((spec.name.to_string(), numerator / denominator));
        }

        groups.push(GroupStats {
            group: group.to_string(),
            rows: rows.len(),
            metrics,
        });

        trends.extend(group_trends(group, rows, schema));
    }

    let leaders = metric_leaders(&groups, schema);

    // prepare()가 빈 결과를 거부하므로 rows는 비어 있지 않음
    let first = prepared.rows.iter().map(|r| r.date).min();
    let last = prepared.rows.iter().map(|r| r.date).max();
    let period = match (first, last) {
        (Some(first), Some(last)) => (first, last),
        _ => (NaiveDate::MIN, NaiveDate::MIN),
    };

    Aggregate {
        group_field: schema.group_field.to_string(),
        period,
        groups,
        leaders,
        trends,
    }
}

fn reduce(rows: &[&ValidRow], field: &str, how: Reduce) -> f64 {
    let sum: f64 = rows.iter().filter_map(|r| r.values.get(field)).sum();
    match how {
        Reduce::Sum => sum,
        Reduce::Mean if rows.is_empty() => 0.0,
        Reduce::Mean => sum / rows.len() as f64,
    }
}

fn group_trends(group: &str, rows: &[&ValidRow], schema: &RowSchema) -> Vec<TrendDelta> {
    let (Some(first_date), Some(last_date)) = (
        rows.iter().map(|r| r.date).min(),
        rows.iter().map(|r| r.date).max(),
    ) else {
        return vec![];
    };

    if first_date == last_date {
        return vec![];
    }

    let on = |date: NaiveDate| {
        rows.iter()
            .copied()
            .filter(|r| r.date == date)
            .collect::<Vec<_>>()
    };
    let first_rows = on(first_date);
    let last_rows = on(last_date);

    schema
        .metrics
        .iter()
        .map(|spec| {
            let first = reduce(&first_rows, spec.name, spec.reduce);
            let last = reduce(&last_rows, spec.name, spec.reduce);
            TrendDelta {
                group: group.to_string(),
                metric: spec.name.to_string(),
                first_date,
                last_date,
                first,
                last,
                delta: last - first,
            }
        })
        .collect()
}

fn metric_leaders(groups: &[GroupStats], schema: &RowSchema) -> Vec<MetricLeader> {
    let names = schema
        .metrics
        .iter()
        .map(|m| m.name)
        .chain(schema.derived.iter().map(|d| d.name));

    let mut leaders = Vec::new();
    for name in names {
        let direction = schema.direction_of(name);
        if direction == Direction::Neutral {
            continue;
        }

        let values: Vec<(&str, f64)> = groups
            .iter()
            .filter_map(|g| g.metric(name).map(|v| (g.group.as_str(), v)))
            .collect();

        // 동점이면 그룹 이름 순으로 먼저 나온 쪽
        let mut max = None::<(&str, f64)>;
        let mut min = None::<(&str, f64)>;
        for (group, value) in values {
            if max.map_or(true, |(_, m)| value > m) {
                max = Some((group, value));
            }
            if min.map_or(true, |(_, m)| value < m) {
                min = Some((group, value));
            }
        }

        let (Some(max), Some(min)) = (max, min) else {
            continue;
        };
        let (best, worst) = match direction {
            Direction::LowerIsBetter => (min, max),
            _ => (max, min),
        };

        leaders.push(MetricLeader {
            metric: name.to_string(),
            best: best.0.to_string(),
            best_value: best.1,
            worst: worst.0.to_string(),
            worst_value: worst.1,
        });
    }

    leaders
}

impl Aggregate {
    /// 마크다운 요약 (표 + 최고/최저 + 추세)
    pub fn to_markdown(&self) -> String {
        let mut out = format!("기간: {} ~ {}\n\n", self.period.0, self.period.1);

        let metric_names: Vec<&str> = self
            .groups
            .first()
            .map(|g| g.metrics.iter().map(|(n, _)| n.as_str()).collect())
            .unwrap_or_default();

        out.push_str(&format!("| {} | rows | {} |\n", self.group_field, metric_names.join(" | ")));
        out.push_str(&format!(
            "| --- | ---: | {} |\n",
            vec!["---:"; metric_names.len()].join(" | ")
        ));
        for group in &self.groups {
            let cells: Vec<String> = group.metrics.iter().map(|(_, v)| format_value(*v)).collect();
            out.push_str(&format!("| {} | {} | {} |\n", group.group, group.rows, cells.join(" | ")));
        }

        if !self.leaders.is_empty() {
            out.push_str("\n최고/최저:\n");
            for leader in &self.leaders {
                out.push_str(&format!(
                    "- {}: 최고 {} ({}), 최저 {} ({})\n",
                    leader.metric,
                    leader.best,
                    format_value(leader.best_value),
                    leader.worst,
                    format_value(leader.worst_value)
                ));
            }
        }

        if !self.trends.is_empty() {
            out.push_str("\n추세 (첫 날짜 -> 마지막 날짜):\n");
            for trend in &self.trends {
                out.push_str(&format!(
                    "- {} {}: {} -> {} ({:+.2})\n",
                    trend.group,
                    trend.metric,
                    format_value(trend.first),
                    format_value(trend.last),
                    trend.delta
                ));
            }
        }

        out
    }

    /// LLM 서술이 없을 때 쓰는 결정적 인사이트
    pub fn fallback_insights(&self) -> String {
        let mut lines = vec![format!(
            "{}개 {} 그룹, 기간 {} ~ {} 집계 결과입니다.",
            self.groups.len(),
            self.group_field,
            self.period.0,
            self.period.1
        )];

        for leader in &self.leaders {
            lines.push(format!(
                "{} 기준 가장 좋은 그룹은 {}, 가장 나쁜 그룹은 {}입니다.",
                leader.metric, leader.best, leader.worst
            ));
        }

        let mut declines: Vec<&TrendDelta> = self.trends.iter().filter(|t| t.delta < 0.0).collect();
        declines.sort_by(|a, b| a.delta.total_cmp(&b.delta));
        if let Some(worst) = declines.first() {
            lines.push(format!(
                "가장 큰 하락은 {}의 {} ({:+.2})입니다.",
                worst.group, worst.metric, worst.delta
            ));
        }

        lines.join("\n")
    }
}

/// 표 셀 값 포맷 (정수는 소수점 없이)
fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{:.4}", value)
    }
}

// ============================================================================
// Analysis (narration)
// ============================================================================

/// 집계 요약을 서술형 인사이트로 바꾸는 협력자
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, task: &AgentTask, summary: &str) -> Result<String>;
}

/// LLM 기반 서술
pub struct LlmNarrator {
    llm: Arc<dyn LlmGateway>,
}

impl LlmNarrator {
    pub fn new(llm: Arc<dyn LlmGateway>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Narrator for LlmNarrator {
    async fn narrate(&self, task: &AgentTask, summary: &str) -> Result<String> {
        self.llm
            .generate(
                prompts::ANALYSIS_SYSTEM_PROMPT,
                &prompts::analysis_prompt(task.description(), summary),
                task.domain(),
            )
            .await
    }
}

// ============================================================================
// OptimizationDraft
// ============================================================================

/// 최적화 제안 (구조 검증 통과본)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: String,
    pub rationale: String,
    pub expected_impact: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
}

impl Recommendation {
    /// 필수 필드
    pub const REQUIRED_FIELDS: [&'static str; 3] = ["action", "rationale", "expected_impact"];

    /// LLM 출력에서 제안 파싱 + 구조 검증
    ///
    /// 실패 시 `schema violation: ...` 사유를 반환합니다.
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let object = extract_json_object(raw)
            .ok_or_else(|| "schema violation: output contains no JSON object".to_string())?;

        let value: Value = serde_json::from_str(object)
            .map_err(|e| format!("schema violation: invalid JSON ({})", e))?;

        let Some(map) = value.as_object() else {
            return Err("schema violation: output is not a JSON object".to_string());
        };

        let mut fields = Vec::with_capacity(Self::REQUIRED_FIELDS.len());
        for name in Self::REQUIRED_FIELDS {
            let text = map
                .get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| format!("schema violation: missing or empty field '{}'", name))?;
            fields.push(text.to_string());
        }

        let targets = match map.get("targets") {
            None | Some(Value::Null) => vec![],
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        "schema violation: 'targets' must be a list of strings".to_string()
                    })
                })
                .collect::<std::result::Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err("schema violation: 'targets' must be a list of strings".to_string())
            }
        };

        let mut fields = fields.into_iter();
        Ok(Self {
            action: fields.next().unwrap_or_default(),
            rationale: fields.next().unwrap_or_default(),
            expected_impact: fields.next().unwrap_or_default(),
            targets,
        })
    }

    /// 심사용 JSON 문자열
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.action.clone())
    }
}

/// 초안 생성 협력자 - 원시 텍스트를 반환 (구조 검증은 오케스트레이터가 함)
#[async_trait]
pub trait Drafter: Send + Sync {
    /// # Arguments
    /// * `feedback` - 이전 시도의 반려 사유 (번호 목록, 첫 시도는 빈 문자열)
    async fn draft(&self, task: &AgentTask, report: &AnalysisReport, feedback: &str) -> Result<String>;
}

/// LLM 기반 초안 생성
pub struct LlmDrafter {
    llm: Arc<dyn LlmGateway>,
}

impl LlmDrafter {
    pub fn new(llm: Arc<dyn LlmGateway>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Drafter for LlmDrafter {
    async fn draft(&self, task: &AgentTask, report: &AnalysisReport, feedback: &str) -> Result<String> {
        self.llm
            .generate(
                prompts::DRAFT_SYSTEM_PROMPT,
                &prompts::draft_prompt(task.description(), &report.summary, &report.insights, feedback),
                task.domain(),
            )
            .await
    }
}

/// 응답 텍스트에서 JSON 객체 부분 추출 (코드 펜스 등 제거)
pub(crate) fn extract_json_object(raw: &str) -> Option<&str> {
    JSON_OBJECT_RE.find(raw).map(|m| m.as_str())
}

// ============================================================================
// Tests
// ============================================================================
