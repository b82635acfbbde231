//! 名簿・個別売上履歴ファイルのダウンロード
//!
//! どちらも公開URL（スプレッドシートのエクスポートなど）から取得し、
//! デコードは [`crate::io`] に任せます。

use crate::api::retry::{with_retry, RetryConfig, Retryable};
use crate::io::{parse_ledger, parse_roster, SourceError};
use crate::models::{Ledger, Roster};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// `ledger_url_template` 内の履歴ファイル名プレースホルダー
pub const FILE_PLACEHOLDER: &str = "{file}";

pub const DEFAULT_ROSTER_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_LEDGER_TIMEOUT: Duration = Duration::from_secs(10);

/// 個別売上履歴の取得元
#[async_trait]
pub trait LedgerSource: Send + Sync {
    async fn fetch_ledger(&self, history_file_id: &str) -> Result<Ledger, SourceError>;
}

/// 名簿の取得元
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn load_roster(&self) -> Result<Roster, SourceError>;
}

/// HTTP 経由の名簿・履歴クライアント
pub struct SourceClient {
    client: reqwest::Client,
    roster_url: String,
    ledger_url_template: String,
    roster_timeout: Duration,
    ledger_timeout: Duration,
    retry: RetryConfig,
}

/// ダウンロード失敗（リトライ判定用）
#[derive(Debug)]
struct DownloadError {
    status: Option<u16>,
    message: String,
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Retryable for DownloadError {
    fn is_retryable(&self, config: &RetryConfig) -> bool {
        match self.status {
            Some(status) => config.is_retryable_status(status),
            None => true,
        }
    }
}

impl SourceClient {
    pub fn new(roster_url: impl Into<String>, ledger_url_template: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            roster_url: roster_url.into(),
            ledger_url_template: ledger_url_template.into(),
            roster_timeout: DEFAULT_ROSTER_TIMEOUT,
            ledger_timeout: DEFAULT_LEDGER_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_timeouts(mut self, roster: Duration, ledger: Duration) -> Self {
        self.roster_timeout = roster;
        self.ledger_timeout = ledger;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn roster_url(&self) -> &str {
        &self.roster_url
    }

    /// 履歴ファイル名をテンプレートに埋め込む（URLエンコード済み）
    pub fn ledger_url(&self, history_file_id: &str) -> String {
        let encoded = urlencoding::encode(history_file_id.trim());
        self.ledger_url_template.replace(FILE_PLACEHOLDER, &encoded)
    }

    async fn download(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, DownloadError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| DownloadError {
                status: None,
                message: if e.is_timeout() {
                    format!("timed out after {timeout:?}")
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError {
                status: Some(status.as_u16()),
                message: format!("HTTP {status}"),
            });
        }

        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|e| DownloadError {
                status: None,
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl RosterSource for SourceClient {
    async fn load_roster(&self) -> Result<Roster, SourceError> {
        info!(url = %self.roster_url, "📥 Downloading roster");

        let bytes = with_retry(&self.retry, "roster download", || {
            self.download(&self.roster_url, self.roster_timeout)
        })
        .await
        .map_err(|e| SourceError::unavailable("roster", e))?;

        parse_roster(&bytes, "roster")
    }
}

#[async_trait]
impl LedgerSource for SourceClient {
    async fn fetch_ledger(&self, history_file_id: &str) -> Result<Ledger, SourceError> {
        let url = self.ledger_url(history_file_id);
        debug!(file = history_file_id, %url, "📥 Downloading history ledger");

        let label = format!("ledger {history_file_id}");
        let target = url.as_str();
        let bytes = with_retry(&self.retry, &label, || self.download(target, self.ledger_timeout))
            .await
            .map_err(|e| SourceError::unavailable(history_file_id, e))?;

        parse_ledger(&bytes, history_file_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LedgerStatus;
    use mockito::Server;
    use rust_xlsxwriter::Workbook;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            initial_delay_ms: 1,
            jitter_ms: 0,
            ..RetryConfig::default()
        }
    }

    fn ledger_workbook() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let ws = workbook.add_worksheet();
        ws.write_string(0, 0, "配信月").unwrap();
        ws.write_string(0, 1, "支払/繰越").unwrap();
        ws.write_string(1, 0, "2025/10").unwrap();
        ws.write_string(1, 1, "支払").unwrap();
        ws.write_string(2, 0, "2025/09").unwrap();
        ws.write_string(2, 1, "繰越").unwrap();
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_ledger_url_is_encoded() {
        let client = SourceClient::new("http://x/roster", "http://x/ledgers/{file}.xlsx");
        assert_eq!(client.ledger_url("uriage_a"), "http://x/ledgers/uriage_a.xlsx");
        assert_eq!(
            client.ledger_url(" 売上 a "),
            "http://x/ledgers/%E5%A3%B2%E4%B8%8A%20a.xlsx"
        );
    }

    #[tokio::test]
    async fn test_load_roster() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/roster.csv")
            .with_status(200)
            .with_body("\u{feff}ルームID,ファイル名,インボイス\n100,uriage_a,登録済\n")
            .create_async()
            .await;

        let client = SourceClient::new(format!("{}/roster.csv", server.url()), "unused")
            .with_retry(fast_retry());
        let roster = client.load_roster().await.unwrap();

        mock.assert_async().await;
        assert_eq!(roster.len(), 1);
        assert!(roster.talents[0].tax_registered);
    }

    #[tokio::test]
    async fn test_fetch_ledger() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/ledgers/uriage_a.xlsx")
            .with_status(200)
            .with_body(ledger_workbook())
            .create_async()
            .await;

        let client = SourceClient::new("unused", format!("{}/ledgers/{{file}}.xlsx", server.url()))
            .with_retry(fast_retry());
        let ledger = client.fetch_ledger("uriage_a").await.unwrap();

        assert_eq!(ledger.entries.len(), 2);
        assert_eq!(ledger.entries[1].status, LedgerStatus::CarriedOver);
    }

    #[tokio::test]
    async fn test_missing_ledger_is_unavailable_without_retry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/ledgers/none.xlsx")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = SourceClient::new("unused", format!("{}/ledgers/{{file}}.xlsx", server.url()))
            .with_retry(fast_retry());
        let result = client.fetch_ledger("none").await;

        mock.assert_async().await;
        assert!(matches!(
            result,
            Err(SourceError::SourceUnavailable { ref source_name, .. }) if source_name == "none"
        ));
    }

    #[tokio::test]
    async fn test_roster_server_error_is_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/roster.csv")
            .with_status(502)
            .expect(3)
            .create_async()
            .await;

        let client = SourceClient::new(format!("{}/roster.csv", server.url()), "unused")
            .with_retry(fast_retry());
        let result = client.load_roster().await;

        mock.assert_async().await;
        assert!(matches!(result, Err(SourceError::SourceUnavailable { .. })));
    }
}
