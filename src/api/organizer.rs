//! オーガナイザー管理画面からの売上取得
//!
//! 1回の取得は `(配信月タイムスタンプ, 売上種別)` 単位です。
//! ページが取得できても表が無い場合は「データなし」として空の表を返し、
//! ログイン画面が返ってきた場合だけ [`FetchError::AuthExpired`] になります。

pub mod invoice_page;

use crate::api::auth::OrganizerSession;
use crate::api::retry::{with_retry, RetryConfig, Retryable};
use crate::models::{AgencyTotal, RevenueCategory, RevenueRow, RevenueTable, RoomId};
use async_trait::async_trait;
use invoice_page::{parse_invoice_page, InvoicePage};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, COOKIE, REFERER, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ROOM_SALES_URL: &str =
    "https://www.showroom-live.com/organizer/point_hist_with_mixed_rate";
pub const DEFAULT_PREMIUM_LIVE_URL: &str =
    "https://www.showroom-live.com/organizer/paid_live_hist_invoice_format";
pub const DEFAULT_TIME_CHARGE_URL: &str =
    "https://www.showroom-live.com/organizer/show_rank_time_charge_hist_invoice_format";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/100.0.4896.127 Safari/537.36";
const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";
const BROWSER_ACCEPT_LANGUAGE: &str = "ja,en-US;q=0.9,en;q=0.8";

#[derive(Error, Debug)]
pub enum FetchError {
    /// 認証切れ（致命的、リトライしない）
    #[error("organizer session expired; refresh the cookie with `srpay auth set`")]
    AuthExpired,

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, FetchError::AuthExpired)
    }

    fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            FetchError::Timeout(timeout)
        } else {
            FetchError::Transport(error)
        }
    }
}

impl Retryable for FetchError {
    fn is_retryable(&self, config: &RetryConfig) -> bool {
        match self {
            FetchError::AuthExpired => false,
            FetchError::Transport(error) => !error.is_builder(),
            FetchError::Status { status, .. } => config.is_retryable_status(*status),
            FetchError::Timeout(_) => true,
        }
    }
}

/// 売上の取得元
#[async_trait]
pub trait RevenueSource: Send + Sync {
    /// `timestamp` は業務タイムゾーンの月初 0 時 (UNIX 秒)
    async fn fetch(&self, timestamp: i64, category: RevenueCategory) -> Result<RevenueTable, FetchError>;
}

/// 売上種別ごとのページURL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEndpoints {
    pub room_sales: String,
    pub premium_live: String,
    pub time_charge: String,
}

impl Default for CategoryEndpoints {
    fn default() -> Self {
        Self {
            room_sales: DEFAULT_ROOM_SALES_URL.to_string(),
            premium_live: DEFAULT_PREMIUM_LIVE_URL.to_string(),
            time_charge: DEFAULT_TIME_CHARGE_URL.to_string(),
        }
    }
}

impl CategoryEndpoints {
    pub fn url(&self, category: RevenueCategory) -> &str {
        match category {
            RevenueCategory::Room => &self.room_sales,
            RevenueCategory::PremiumLive => &self.premium_live,
            RevenueCategory::TimeCharge => &self.time_charge,
        }
    }
}

/// 管理画面クライアント
pub struct OrganizerClient {
    client: reqwest::Client,
    session: OrganizerSession,
    endpoints: CategoryEndpoints,
    retry: RetryConfig,
    timeout: Duration,
}

impl OrganizerClient {
    pub fn new(
        session: OrganizerSession,
        endpoints: CategoryEndpoints,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Transport)?;

        Ok(Self {
            client,
            session,
            endpoints,
            retry,
            timeout,
        })
    }

    pub fn endpoints(&self) -> &CategoryEndpoints {
        &self.endpoints
    }

    fn headers(&self, referer: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE));
        if let Ok(value) = HeaderValue::from_str(referer) {
            headers.insert(REFERER, value);
        }
        if let Ok(value) = HeaderValue::from_str(self.session.cookie_header()) {
            headers.insert(COOKIE, value);
        }
        headers
    }

    async fn fetch_page(&self, url: &str, timestamp: i64) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .query(&[("from", timestamp)])
            .headers(self.headers(url))
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(FetchError::AuthExpired);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))
    }

    /// ページを解析して売上表に変換
    fn to_table(&self, category: RevenueCategory, page: InvoicePage) -> Result<RevenueTable, FetchError> {
        match page {
            InvoicePage::LoginRequired => Err(FetchError::AuthExpired),
            InvoicePage::NoTable => Ok(RevenueTable::empty(category)),
            InvoicePage::Table { rows, agency_total } => {
                let rows = rows
                    .into_iter()
                    .map(|row| RevenueRow {
                        room_id: RoomId::new(row.room_id),
                        category,
                        amount: row.amount,
                        account_id: row.account_id,
                    })
                    .collect();

                let agency_total = (category == RevenueCategory::Room).then(|| {
                    agency_total
                        .map(AgencyTotal::Known)
                        .unwrap_or(AgencyTotal::Missing)
                });

                Ok(RevenueTable {
                    category,
                    rows,
                    agency_total,
                })
            }
        }
    }
}

#[async_trait]
impl RevenueSource for OrganizerClient {
    async fn fetch(&self, timestamp: i64, category: RevenueCategory) -> Result<RevenueTable, FetchError> {
        let url = self.endpoints.url(category);
        tracing::info!(%category, timestamp, "📥 Fetching organizer revenue");

        let label = format!("{} fetch", category);
        let html = with_retry(&self.retry, &label, || self.fetch_page(url, timestamp)).await?;
        let table = self.to_table(category, parse_invoice_page(&html))?;

        tracing::debug!(
            %category,
            timestamp,
            rows = table.rows.len(),
            agency_total = ?table.agency_total,
            "✅ Revenue page parsed"
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const TABLE_PAGE: &str = r#"<p>支払い金額（税抜）: <span>350,000</span>円</p>
<table class="table-type-02">
<tr><th>ID</th><th>名前</th><th>pt</th><th>分配額</th><th>アカウント</th></tr>
<tr><td>100</td><td>a</td><td>1</td><td>100,000</td><td>acct_a</td></tr>
</table>"#;

    fn endpoints(base: &str) -> CategoryEndpoints {
        CategoryEndpoints {
            room_sales: format!("{base}/organizer/point_hist_with_mixed_rate"),
            premium_live: format!("{base}/organizer/paid_live_hist_invoice_format"),
            time_charge: format!("{base}/organizer/show_rank_time_charge_hist_invoice_format"),
        }
    }

    fn client(base: &str, retry: RetryConfig) -> OrganizerClient {
        let session = OrganizerSession::from_cookie_string("sr_id=abc", Some("agency".into())).unwrap();
        OrganizerClient::new(session, endpoints(base), Duration::from_secs(5), retry).unwrap()
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            initial_delay_ms: 1,
            jitter_ms: 0,
            ..RetryConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_room_sales_with_agency_total() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/organizer/point_hist_with_mixed_rate")
            .match_query(Matcher::UrlEncoded("from".into(), "1759244400".into()))
            .match_header("cookie", "sr_id=abc; i18n_redirected=ja")
            .match_header("accept-language", Matcher::Regex("^ja".into()))
            .with_status(200)
            .with_body(TABLE_PAGE)
            .create_async()
            .await;

        let table = client(&server.url(), fast_retry())
            .fetch(1_759_244_400, RevenueCategory::Room)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(table.agency_total, Some(AgencyTotal::Known(350_000)));
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].room_id, RoomId::new("100"));
        assert_eq!(table.rows[0].amount, 100_000);
        assert_eq!(table.rows[0].account_id.as_deref(), Some("acct_a"));
    }

    #[tokio::test]
    async fn test_non_room_category_has_no_agency_total() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/organizer/paid_live_hist_invoice_format")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(TABLE_PAGE)
            .create_async()
            .await;

        let table = client(&server.url(), fast_retry())
            .fetch(1, RevenueCategory::PremiumLive)
            .await
            .unwrap();

        assert_eq!(table.agency_total, None);
        assert_eq!(table.rows[0].category, RevenueCategory::PremiumLive);
    }

    #[tokio::test]
    async fn test_empty_page_is_valid_no_data() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/organizer/point_hist_with_mixed_rate")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html><p>該当データなし</p></html>")
            .create_async()
            .await;

        let table = client(&server.url(), fast_retry())
            .fetch(1, RevenueCategory::Room)
            .await
            .unwrap();

        assert!(table.rows.is_empty());
        assert_eq!(table.agency_total, Some(AgencyTotal::Missing));
    }

    #[tokio::test]
    async fn test_login_page_is_auth_expired_and_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/organizer/show_rank_time_charge_hist_invoice_format")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html><h1>ログイン</h1></html>")
            .expect(1)
            .create_async()
            .await;

        let result = client(&server.url(), fast_retry())
            .fetch(1, RevenueCategory::TimeCharge)
            .await;

        mock.assert_async().await;
        assert!(matches!(result, Err(FetchError::AuthExpired)));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/organizer/point_hist_with_mixed_rate")
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let result = client(&server.url(), fast_retry())
            .fetch(1, RevenueCategory::Room)
            .await;

        mock.assert_async().await;
        assert!(matches!(result, Err(FetchError::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_forbidden_is_auth_expired() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/organizer/point_hist_with_mixed_rate")
            .match_query(Matcher::Any)
            .with_status(403)
            .create_async()
            .await;

        let result = client(&server.url(), RetryConfig::disabled())
            .fetch(1, RevenueCategory::Room)
            .await;

        assert!(result.unwrap_err().is_auth_expired());
    }
}
