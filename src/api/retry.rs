//! 指数バックオフ付きリトライ

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// リトライ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 最大試行回数（初回を含む）
    pub max_attempts: u32,
    /// 初期待機時間（ミリ秒）
    pub initial_delay_ms: u64,
    /// 指数バックオフの倍率
    pub backoff_multiplier: f64,
    /// 最大待機時間（ミリ秒）
    pub max_delay_ms: u64,
    /// 待機時間に加えるジッターの上限（ミリ秒）
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    /// リトライ対象のステータスコード
    pub retryable_status_codes: Vec<u16>,
}

fn default_jitter_ms() -> u64 {
    250
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30000,
            jitter_ms: default_jitter_ms(),
            retryable_status_codes: vec![500, 502, 503, 504, 429],
        }
    }
}

impl RetryConfig {
    /// リトライしない設定
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// `attempt` 回目の失敗後の待機時間（ジッターなし）
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        self.base_delay(attempt) + Duration::from_millis(jitter)
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }
}

/// リトライ可否を判定できるエラー
pub trait Retryable {
    fn is_retryable(&self, config: &RetryConfig) -> bool;
}

/// 失敗がリトライ可能な間、`operation` を繰り返す
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, label: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < max_attempts && error.is_retryable(config) => {
                let delay = config.delay_with_jitter(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "🔁 {} failed: {}; retrying",
                    label,
                    error
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
