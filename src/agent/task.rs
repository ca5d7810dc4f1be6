//! 에이전트 작업 정의

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{HubError, HubResult};

/// 입력 데이터 한 행 (JSON 객체)
pub type Row = serde_json::Map<String, serde_json::Value>;

/// 작업 도메인 - 스키마와 기본 시스템 프롬프트를 결정
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Finance,
    Ads,
    #[default]
    General,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Finance => "finance",
            Domain::Ads => "ads",
            Domain::General => "general",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 에이전트 작업 (생성 후 불변)
#[derive(Debug, Clone)]
pub struct AgentTask {
    description: String,
    domain: Domain,
    raw_data: Vec<Row>,
    date_start: Option<NaiveDate>,
    date_end: Option<NaiveDate>,
}

impl AgentTask {
    /// 작업 생성
    ///
    /// 설명이 비었거나 날짜 범위가 뒤집혀 있으면 거부합니다.
    /// 행 자체의 검증은 DataPrep 단계에서 합니다.
    pub fn new(description: impl Into<String>, domain: Domain, raw_data: Vec<Row>) -> HubResult<Self> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(HubError::InvalidArgument(
                "task description must not be empty".to_string(),
            ));
        }

        Ok(Self {
            description,
            domain,
            raw_data,
            date_start: None,
            date_end: None,
        })
    }

    /// 날짜 범위 지정 (양 끝 포함)
    pub fn with_date_range(
        mut self,
        date_start: Option<NaiveDate>,
        date_end: Option<NaiveDate>,
    ) -> HubResult<Self> {
        if let (Some(start), Some(end)) = (date_start, date_end) {
            if start > end {
                return Err(HubError::InvalidArgument(format!(
                    "date_start ({}) is after date_end ({})",
                    start, end
                )));
            }
        }
        self.date_start = date_start;
        self.date_end = date_end;
        Ok(self)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn raw_data(&self) -> &[Row] {
        &self.raw_data
    }

    pub fn date_start(&self) -> Option<NaiveDate> {
        self.date_start
    }

    pub fn date_end(&self) -> Option<NaiveDate> {
        self.date_end
    }

    /// 날짜가 범위 안인지
    pub fn in_range(&self, date: NaiveDate) -> bool {
        self.date_start.map_or(true, |start| date >= start)
            && self.date_end.map_or(true, |end| date <= end)
    }
}
