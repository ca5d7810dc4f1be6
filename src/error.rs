//! 에러 분류 - 코어 에러 택소노미
//!
//! 외부 협력자(SQLite, LanceDB, HTTP 클라이언트)는 `anyhow::Result`를 반환하고,
//! 코어(퓨전 엔진, 파이프라인)는 이 분류로 변환해서 다룹니다.
//!
//! 호출자에게 노출되는 것은 `InvalidArgument`, `Cancelled`, `Config`,
//! 그리고 파이프라인 밖의 생성 실패뿐입니다. 나머지는 로컬에서 흡수됩니다.

use thiserror::Error;

/// 코어 에러
#[derive(Debug, Error)]
pub enum HubError {
    /// 잘못된 요청 / 스키마 위반 (재시도 없음)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 검색 백엔드 하나가 응답하지 않음 (단일 모달리티로 강등)
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },

    /// 일부 청크 텍스트 복구 실패 (컨텍스트에서 제외)
    #[error("backfill incomplete: {} chunk(s) without text", missing.len())]
    BackfillPartial { missing: Vec<String> },

    /// LLM 호출 실패 또는 타임아웃
    #[error("generation failed: {0}")]
    GenerationFailure(String),

    /// Judge 출력 계약 위반 (점수 범위 밖 / 누락 / 사유 없음)
    #[error("judge contract violation: {0}")]
    JudgeContractViolation(String),

    /// 호출자가 실행을 취소함
    #[error("pipeline run cancelled")]
    Cancelled,

    /// 설정 오류
    #[error("configuration error: {0}")]
    Config(String),
}

impl HubError {
    /// 호출자에게 그대로 노출되는 에러인지 여부
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            HubError::InvalidArgument(_)
                | HubError::Cancelled
                | HubError::Config(_)
                | HubError::GenerationFailure(_)
        )
    }
}

/// 코어 결과 타입
pub type HubResult<T> = std::result::Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backfill_partial_message_counts_missing() {
        let err = HubError::BackfillPartial {
            missing: vec!["a#0".to_string(), "b#1".to_string()],
        };
        assert_eq!(err.to_string(), "backfill incomplete: 2 chunk(s) without text");
        assert!(!err.is_user_visible());
    }

    #[test]
    fn test_user_visible_classification() {
        assert!(HubError::InvalidArgument("k must be >= 1".into()).is_user_visible());
        assert!(HubError::Cancelled.is_user_visible());
        assert!(!HubError::BackendUnavailable {
            backend: "lexical",
            reason: "timeout".into()
        }
        .is_user_visible());
        assert!(!HubError::JudgeContractViolation("score 140".into()).is_user_visible());
    }
}
