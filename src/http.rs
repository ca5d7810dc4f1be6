//! HTTP 공통 유틸 - 레이트 리미터 + 재시도
//!
//! 클라우드 API(Gemini 임베딩, OpenAI 호환 LLM)와 로컬 API(Ollama)가
//! 같은 재시도 정책을 공유합니다.
//! - 429 / 5xx / 전송 오류: 지수 백오프 후 재시도
//! - 그 외 4xx: 즉시 실패

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;

/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

// ============================================================================
// Rate Limiter
// ============================================================================

/// 슬라이딩 윈도우 레이트 리미터 (요청 간 최소 딜레이 포함)
#[derive(Debug)]
pub struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, min_delay: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay,
            last_request: None,
        }
    }

    /// 요청 가능 여부 확인 및 대기
    pub async fn acquire(&mut self) {
        // 1. 최소 딜레이 적용 (버스트 방지)
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        // 2. 윈도우 밖의 오래된 요청 제거
        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        // 3. 한도 초과 시 가장 오래된 요청이 윈도우를 벗어날 때까지 대기
        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

// ============================================================================
// Retry
// ============================================================================

/// 요청 헤더 (이름, 값)
pub type Header<'a> = (&'a str, &'a str);

/// JSON POST 요청을 재시도 정책과 함께 전송
///
/// 성공 시 응답 본문 문자열을 반환합니다.
///
/// # Arguments
/// * `client` - reqwest 클라이언트
/// * `url` - 요청 URL
/// * `headers` - 추가 헤더 (API 키 등)
/// * `body` - JSON 직렬화할 요청 본문
/// * `max_retries` - 최대 재시도 횟수
pub async fn post_json_with_retry<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    headers: &[Header<'_>],
    body: &B,
    max_retries: u32,
) -> Result<String> {
    let mut last_error: Option<anyhow::Error> = None;

    for attempt in 0..=max_retries {
        let mut request = client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                last_error = Some(anyhow::anyhow!("Failed to send request to {}: {}", url, e));
                if attempt < max_retries {
                    backoff(attempt, max_retries, "Request failed").await;
                    continue;
                }
                break;
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if status.is_success() {
            return Ok(body);
        }

        if is_retryable(status) {
            last_error = Some(anyhow::anyhow!("HTTP {} from {}", status, url));
            if attempt < max_retries {
                backoff(attempt, max_retries, "Retryable status").await;
                continue;
            }
            break;
        }

        anyhow::bail!("HTTP {} from {}: {}", status, url, body);
    }

    Err(last_error
        .unwrap_or_else(|| anyhow::anyhow!("Request to {} failed after {} retries", url, max_retries)))
}

/// 재시도 대상 상태 코드 (429, 5xx)
fn is_retryable(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

/// 지수 백오프 대기
async fn backoff(attempt: u32, max_retries: u32, reason: &str) {
    let delay = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
    tracing::warn!(
        "{}, retrying in {:?} (attempt {}/{})",
        reason,
        delay,
        attempt + 1,
        max_retries
    );
    tokio::time::sleep(delay).await;
}
