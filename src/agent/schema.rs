//! 도메인별 행 스키마 - DataPrep 검증 규칙
//!
//! 모든 행은 계산 전에 스키마로 검증됩니다. 첫 번째 위반에서
//! 행 번호와 필드 이름을 담아 즉시 실패합니다.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;

use super::task::{Domain, Row};
use crate::error::{HubError, HubResult};

/// 날짜 필드 형식 (ISO 8601)
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Types
// ============================================================================

/// 필드 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// 비어 있지 않은 문자열
    Text,
    /// 숫자
    Number,
    /// 0 이상의 정수
    Integer,
    /// `YYYY-MM-DD` 문자열
    Date,
}

impl FieldType {
    fn describe(&self) -> &'static str {
        match self {
            FieldType::Text => "a non-empty string",
            FieldType::Number => "a number",
            FieldType::Integer => "a non-negative integer",
            FieldType::Date => "a YYYY-MM-DD date",
        }
    }
}

/// 필수 필드 정의
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
}

/// 지표 방향 (최고/최저 판정 기준)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
    /// 최고/최저를 가리지 않음 (예: 지출)
    Neutral,
}

/// 그룹 내 집계 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduce {
    Sum,
    Mean,
}

/// 기본 지표 (행에서 직접 읽음)
#[derive(Debug, Clone, Copy)]
pub struct MetricSpec {
    pub name: &'static str,
    pub reduce: Reduce,
    pub direction: Direction,
}

/// 파생 지표 (합계 비율, 분모는 최소 1로 고정)
#[derive(Debug, Clone, Copy)]
pub struct DerivedSpec {
    pub name: &'static str,
    pub numerator: &'static str,
    pub denominator: &'static str,
    pub direction: Direction,
}

/// 도메인 행 스키마
#[derive(Debug)]
pub struct RowSchema {
    pub domain: Domain,
    /// 그룹 기준 필드 (예: campaign_name)
    pub group_field: &'static str,
    pub fields: &'static [FieldSpec],
    pub metrics: &'static [MetricSpec],
    pub derived: &'static [DerivedSpec],
}

/// 검증을 통과한 행
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRow {
    pub date: NaiveDate,
    pub group: String,
    pub values: BTreeMap<&'static str, f64>,
}

// ============================================================================
// Domain Schemas
// ============================================================================

static ADS_SCHEMA: RowSchema = RowSchema {
    domain: Domain::Ads,
    group_field: "campaign_name",
    fields: &[
        FieldSpec { name: "date", ty: FieldType::Date },
        FieldSpec { name: "campaign_name", ty: FieldType::Text },
        FieldSpec { name: "impressions", ty: FieldType::Integer },
        FieldSpec { name: "clicks", ty: FieldType::Integer },
        FieldSpec { name: "conversions", ty: FieldType::Integer },
        FieldSpec { name: "spend", ty: FieldType::Number },
    ],
    metrics: &[
        MetricSpec { name: "impressions", reduce: Reduce::Sum, direction: Direction::HigherIsBetter },
        MetricSpec { name: "clicks", reduce: Reduce::Sum, direction: Direction::HigherIsBetter },
        MetricSpec { name: "conversions", reduce: Reduce::Sum, direction: Direction::HigherIsBetter },
        MetricSpec { name: "spend", reduce: Reduce::Sum, direction: Direction::Neutral },
    ],
    derived: &[
        DerivedSpec { name: "ctr", numerator: "clicks", denominator: "impressions", direction: Direction::HigherIsBetter },
        DerivedSpec { name: "cpc", numerator: "spend", denominator: "clicks", direction: Direction::LowerIsBetter },
        DerivedSpec { name: "cpa", numerator: "spend", denominator: "conversions", direction: Direction::LowerIsBetter },
    ],
};

static FINANCE_SCHEMA: RowSchema = RowSchema {
    domain: Domain::Finance,
    group_field: "symbol",
    fields: &[
        FieldSpec { name: "date", ty: FieldType::Date },
        FieldSpec { name: "symbol", ty: FieldType::Text },
        FieldSpec { name: "close", ty: FieldType::Number },
        FieldSpec { name: "volume", ty: FieldType::Integer },
    ],
    metrics: &[
        MetricSpec { name: "close", reduce: Reduce::Mean, direction: Direction::HigherIsBetter },
        MetricSpec { name: "volume", reduce: Reduce::Sum, direction: Direction::HigherIsBetter },
    ],
    derived: &[],
};

static GENERAL_SCHEMA: RowSchema = RowSchema {
    domain: Domain::General,
    group_field: "name",
    fields: &[
        FieldSpec { name: "date", ty: FieldType::Date },
        FieldSpec { name: "name", ty: FieldType::Text },
        FieldSpec { name: "value", ty: FieldType::Number },
    ],
    metrics: &[MetricSpec { name: "value", reduce: Reduce::Sum, direction: Direction::HigherIsBetter }],
    derived: &[],
};

impl RowSchema {
    /// 도메인 스키마 조회
    pub fn for_domain(domain: Domain) -> &'static RowSchema {
        match domain {
            Domain::Ads => &ADS_SCHEMA,
            Domain::Finance => &FINANCE_SCHEMA,
            Domain::General => &GENERAL_SCHEMA,
        }
    }

    /// 지표 방향 조회 (기본 + 파생)
    pub fn direction_of(&self, metric: &str) -> Direction {
        self.metrics
            .iter()
            .find(|m| m.name == metric)
            .map(|m| m.direction)
            .or_else(|| self.derived.iter().find(|d| d.name == metric).map(|d| d.direction))
            .unwrap_or(Direction::Neutral)
    }

    /// 행 하나 검증
    ///
    /// # Arguments
    /// * `index` - 0부터 시작하는 행 번호 (에러 메시지용)
    pub fn validate_row(&self, index: usize, row: &Row) -> HubResult<ValidRow> {
        let mut date = None;
        let mut group = None;
        let mut values = BTreeMap::new();

        for field in self.fields {
            let value = row.get(field.name).ok_or_else(|| {
                HubError::InvalidArgument(format!(
                    "row {}: missing required field '{}'",
                    index, field.name
                ))
            })?;

            let invalid = || {
                HubError::InvalidArgument(format!(
                    "row {}: field '{}' must be {}, got {}",
                    index,
                    field.name,
                    field.ty.describe(),
                    value
                ))
            };

            match field.ty {
                FieldType::Text => {
                    let text = value
                        .as_str()
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .ok_or_else(invalid)?;
                    if field.name == self.group_field {
                        group = Some(text.to_string());
                    }
                }
                FieldType::Number => {
                    let number = value.as_f64().ok_or_else(invalid)?;
                    values.insert(field.name, number);
                }
                FieldType::Integer => {
                    let number = as_count(value).ok_or_else(invalid)?;
                    values.insert(field.name, number as f64);
                }
                FieldType::Date => {
                    let parsed = value
                        .as_str()
                        .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
                        .ok_or_else(invalid)?;
                    date = Some(parsed);
                }
            }
        }

        match (date, group) {
            (Some(date), Some(group)) => Ok(ValidRow { date, group, values }),
            _ => Err(HubError::InvalidArgument(format!(
                "row {}: schema for {} is missing its date or group field",
                index, self.domain
            ))),
        }
    }
}

/// 0 이상의 정수 값 (2.0 같은 정수형 실수 허용)
fn as_count(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
        .map(|f| f as u64)
}

// ============================================================================
// Tests
// ============================================================================
