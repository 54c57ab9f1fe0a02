//! 解析バックエンドのHTTPクライアント
//!
//! - POST /detect-change
//! - POST /analyze/ndvi
//! - GET  /health
//!
//! リクエストごとにタイムアウトを付け、接続エラー/タイムアウト/5xx/429 のみ
//! 指数バックオフで再試行する。応答はここで正規化し、呼び出し側には型付きの
//! ペイロードだけを返す。

use crate::config::Config;
use crate::error::{LocationInsightError, Result, TransportErrorKind};
use async_trait::async_trait;
use location_insight_common::{
    parse_change_detection, parse_vegetation, ChangeDetectionPayload, ChangeDetectionRequest,
    VegetationPayload, VegetationRequest,
};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

pub const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_MAX_MS: u64 = 10_000;
/// 接続確立などの余裕分
const BUDGET_SLACK_MS: u64 = 1_000;
const ERROR_BODY_MAX_CHARS: usize = 200;

/// 解析バックエンド（テストでは差し替える）
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn detect_change(&self, request: &ChangeDetectionRequest) -> Result<ChangeDetectionPayload>;

    async fn analyze_vegetation(&self, request: &VegetationRequest) -> Result<VegetationPayload>;
}

/// 再試行の待ち時間（attempt は0始まり）
pub fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay_ms.min(BACKOFF_MAX_MS))
}

/// 再試行をすべて使い切るまでの最大時間
///
/// 呼び出し全体に外側のタイムアウトを付ける場合はこれ以上にする。
/// 1回分のタイムアウトと同じにすると再試行の前に打ち切られる。
pub fn retry_budget(per_attempt: Duration, retry_count: u32, backoff_base_ms: u64) -> Duration {
    let attempts = per_attempt.saturating_mul(retry_count.saturating_add(1));
    let backoff = (0..retry_count)
        .map(|a| backoff_delay(a, backoff_base_ms))
        .fold(Duration::ZERO, Duration::saturating_add);
    attempts
        .saturating_add(backoff)
        .saturating_add(Duration::from_millis(BUDGET_SLACK_MS))
}

/// 1回の送信結果の失敗側
enum AttemptError {
    Retryable(LocationInsightError),
    Fatal(LocationInsightError),
}

#[derive(Debug, Clone)]
pub struct AnalysisClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    retry_count: u32,
    backoff_base_ms: u64,
}

impl AnalysisClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_settings(config.base_url(), config.timeout(), config.retry_count)
    }

    pub fn with_settings(base_url: &str, timeout: Duration, retry_count: u32) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("location-insight/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LocationInsightError::Config(format!("HTTPクライアント初期化失敗: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            retry_count,
            backoff_base_ms: BACKOFF_BASE_MS,
        })
    }

    /// バックオフの基準値を変更（テスト用に短くする）
    pub fn with_backoff_base(mut self, base_ms: u64) -> Self {
        self.backoff_base_ms = base_ms;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// この設定で1回の呼び出しにかかりうる最大時間
    pub fn call_budget(&self) -> Duration {
        retry_budget(self.timeout, self.retry_count, self.backoff_base_ms)
    }

    /// GET /health
    pub async fn health(&self) -> Result<Value> {
        let url = format!("{}/health", self.base_url);
        self.with_retry("health", || async {
            let resp = self
                .http
                .get(&url)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(classify_send_error)?;
            read_json(resp).await
        })
        .await
    }

    async fn post_json<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        self.with_retry(path, || async {
            let resp = self
                .http
                .post(&url)
                .timeout(self.timeout)
                .json(body)
                .send()
                .await
                .map_err(classify_send_error)?;
            read_json(resp).await
        })
        .await
    }

    async fn with_retry<F, Fut>(&self, label: &str, mut send: F) -> Result<Value>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<Value, AttemptError>>,
    {
        let mut attempt = 0u32;
        loop {
            debug!(endpoint = label, attempt, "request");
            match send().await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Retryable(err)) if attempt < self.retry_count => {
                    let delay = backoff_delay(attempt, self.backoff_base_ms);
                    warn!(endpoint = label, attempt, ?delay, error = %err, "retrying request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(AttemptError::Retryable(err)) | Err(AttemptError::Fatal(err)) => return Err(err),
            }
        }
    }
}

fn classify_send_error(err: reqwest::Error) -> AttemptError {
    let retryable = err.is_connect() || err.is_timeout() || err.is_request();
    let mapped = LocationInsightError::from(err);
    if retryable {
        AttemptError::Retryable(mapped)
    } else {
        AttemptError::Fatal(mapped)
    }
}

async fn read_json(resp: reqwest::Response) -> std::result::Result<Value, AttemptError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(ERROR_BODY_MAX_CHARS).collect();
        let err = LocationInsightError::transport(
            TransportErrorKind::from_status(status.as_u16()),
            format!("HTTP {}: {}", status.as_u16(), snippet),
        );
        return if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Err(AttemptError::Retryable(err))
        } else {
            Err(AttemptError::Fatal(err))
        };
    }

    resp.json::<Value>()
        .await
        .map_err(|e| AttemptError::Fatal(LocationInsightError::ApiParse(format!("JSONとして読めません: {}", e))))
}

#[async_trait]
impl AnalysisBackend for AnalysisClient {
    async fn detect_change(&self, request: &ChangeDetectionRequest) -> Result<ChangeDetectionPayload> {
        let body = self.post_json("/detect-change", request).await?;
        Ok(parse_change_detection(&body)?)
    }

    async fn analyze_vegetation(&self, request: &VegetationRequest) -> Result<VegetationPayload> {
        let body = self.post_json("/analyze/ndvi", request).await?;
        Ok(parse_vegetation(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        assert_eq!(backoff_delay(0, 500), Duration::from_millis(500));
        assert_eq!(backoff_delay(1, 500), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2, 500), Duration::from_millis(2000));
        assert_eq!(backoff_delay(10, 500), Duration::from_millis(BACKOFF_MAX_MS));
        assert_eq!(backoff_delay(200, 500), Duration::from_millis(BACKOFF_MAX_MS));
    }

    #[test]
    fn test_retry_budget_covers_every_attempt() {
        let per_attempt = Duration::from_secs(30);
        let budget = retry_budget(per_attempt, 3, 500);
        // 4回分 + 0.5s + 1s + 2s の待ち
        assert!(budget >= per_attempt * 4 + Duration::from_millis(3500));
        assert!(budget > per_attempt);

        assert!(retry_budget(per_attempt, 0, 500) >= per_attempt);
        assert_eq!(retry_budget(Duration::MAX, 1, 500), Duration::MAX);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = AnalysisClient::with_settings("http://localhost:8000/", Duration::from_secs(1), 0).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_connection_failure() {
        // 予約済みポート0には接続できない
        let client = AnalysisClient::with_settings("http://127.0.0.1:0", Duration::from_millis(500), 1)
            .unwrap()
            .with_backoff_base(1);
        let err = client.health().await.unwrap_err();
        assert!(matches!(err, LocationInsightError::Transport { .. }));
    }
}
