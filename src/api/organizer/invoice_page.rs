//! 請求書形式ページ (HTML) からの売上抽出
//!
//! 管理画面は `table-type-02` の表に1行1ライバーで分配額を載せます。
//! 先頭行は見出しとして読み飛ばし、`td` が5つ以上ある行だけを使います。
//!
//! | 列 | 内容 |
//! |----|------|
//! | 0  | ルームID |
//! | 3  | 分配額（カンマ区切り） |
//! | 4  | アカウントID |

use regex::Regex;
use std::sync::LazyLock;

/// ログイン画面に出る文言
pub const LOGIN_MARKERS: [&str; 2] = ["ログイン", "会員登録"];

const MIN_CELLS: usize = 5;
const ROOM_ID_CELL: usize = 0;
const AMOUNT_CELL: usize = 3;
const ACCOUNT_ID_CELL: usize = 4;

static TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<table[^>]*\bclass\s*=\s*["'][^"']*\btable-type-02\b[^"']*["'][^>]*>(.*?)</table>"#)
        .unwrap()
});
static ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").unwrap());
static CELL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static AGENCY_TOTAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"支払い金額（税抜）:\s*<span[^>]*>\s*([\d,]+)\s*(?:</span>\s*)?円").unwrap()
});

/// 表の1行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRow {
    pub room_id: String,
    pub amount: u64,
    pub account_id: Option<String>,
}

/// ページの解析結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoicePage {
    /// 表あり（行が0件のこともある）
    Table {
        rows: Vec<InvoiceRow>,
        agency_total: Option<u64>,
    },
    /// 表が無く、ログイン画面の文言がある
    LoginRequired,
    /// 表が無い（データなし）
    NoTable,
}

pub fn parse_invoice_page(html: &str) -> InvoicePage {
    let Some(table) = TABLE_RE.captures(html).and_then(|cap| cap.get(1)) else {
        if LOGIN_MARKERS.iter().any(|marker| html.contains(marker)) {
            return InvoicePage::LoginRequired;
        }
        return InvoicePage::NoTable;
    };

    let rows = ROW_RE
        .captures_iter(table.as_str())
        .skip(1)
        .filter_map(|row| row.get(1).and_then(|inner| parse_row(inner.as_str())))
        .collect();

    InvoicePage::Table {
        rows,
        agency_total: extract_agency_total(html),
    }
}

fn parse_row(row_html: &str) -> Option<InvoiceRow> {
    let cells: Vec<String> = CELL_RE
        .captures_iter(row_html)
        .filter_map(|cap| cap.get(1))
        .map(|m| cell_text(m.as_str()))
        .collect();

    if cells.len() < MIN_CELLS {
        return None;
    }

    let Some(amount) = parse_amount(&cells[AMOUNT_CELL]) else {
        tracing::debug!(cell = %cells[AMOUNT_CELL], "non-numeric amount cell skipped");
        return None;
    };

    let account_id = Some(cells[ACCOUNT_ID_CELL].clone()).filter(|id| !id.is_empty());

    Some(InvoiceRow {
        room_id: cells[ROOM_ID_CELL].clone(),
        amount,
        account_id,
    })
}

/// 事務所全体の「支払い金額（税抜）」
pub fn extract_agency_total(html: &str) -> Option<u64> {
    AGENCY_TOTAL_RE
        .captures(html)
        .and_then(|cap| cap.get(1))
        .and_then(|m| parse_amount(m.as_str()))
}

/// カンマを除いた数字列のみ受け付ける
fn parse_amount(text: &str) -> Option<u64> {
    let digits: String = text.trim().chars().filter(|c| *c != ',').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn cell_text(cell_html: &str) -> String {
    let text = TAG_RE.replace_all(cell_html, "");
    text.replace("&nbsp;", " ")
        .replace("&#44;", ",")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
<p class="fs-b4 bg-light-gray p-b3 mb-b2 link-light-green">支払い金額（税抜）: <span class="fw-b">1,234,567</span>円</p>
<table class="table table-type-02 mt-b3">
  <tr><th>ルームID</th><th>ルーム名</th><th>pt</th><th>分配額</th><th>アカウントID</th></tr>
  <tr><td>100001</td><td>Alice</td><td>10</td><td>123,456</td><td><a href="/u/alice">alice</a></td></tr>
  <tr><td> 100002 </td><td>Bob &amp; Co</td><td>0</td><td>0</td><td></td></tr>
  <tr><td>100003</td><td>Carol</td><td>5</td><td>-</td><td>carol</td></tr>
  <tr><td colspan="5">合計</td></tr>
</table>
</body></html>"#;

    #[test]
    fn test_parse_rows_and_total() {
        let InvoicePage::Table { rows, agency_total } = parse_invoice_page(PAGE) else {
            panic!("table expected");
        };

        assert_eq!(agency_total, Some(1_234_567));
        assert_eq!(
            rows,
            vec![
                InvoiceRow {
                    room_id: "100001".into(),
                    amount: 123_456,
                    account_id: Some("alice".into()),
                },
                InvoiceRow {
                    room_id: "100002".into(),
                    amount: 0,
                    account_id: None,
                },
            ]
        );
    }

    #[test]
    fn test_agency_total_inside_or_after_span() {
        let total = |html: &str| match parse_invoice_page(html) {
            InvoicePage::Table { agency_total, .. } => agency_total,
            other => panic!("table expected: {other:?}"),
        };
        let table = r#"<table class="table-type-02"><tr><th>h</th></tr></table>"#;

        let after = format!("<p>支払い金額（税抜）: <span class=\"fw-b\">1,234,567</span>円</p>{table}");
        assert_eq!(total(&after), Some(1_234_567));

        let inside = format!("<p>支払い金額（税抜）: <span>1,234,567円</span></p>{table}");
        assert_eq!(total(&inside), Some(1_234_567));

        let no_yen = format!("<p>支払い金額（税抜）: <span>1,234,567</span></p>{table}");
        assert_eq!(total(&no_yen), None);
    }

    #[test]
    fn test_login_page_is_detected() {
        let html = "<html><body><form>ログインしてください</form></body></html>";
        assert_eq!(parse_invoice_page(html), InvoicePage::LoginRequired);
        let html = "<html><body><a>会員登録</a></body></html>";
        assert_eq!(parse_invoice_page(html), InvoicePage::LoginRequired);
    }

    #[test]
    fn test_missing_table_without_marker_is_empty() {
        let html = "<html><body><p>データがありません</p></body></html>";
        assert_eq!(parse_invoice_page(html), InvoicePage::NoTable);
    }

    #[test]
    fn test_table_takes_precedence_over_login_marker() {
        // ヘッダーのログインリンクがあっても表があれば有効
        let html = r#"<a>ログイン</a><table class="table-type-02"><tr><th>h</th></tr></table>"#;
        assert_eq!(
            parse_invoice_page(html),
            InvoicePage::Table {
                rows: vec![],
                agency_total: None
            }
        );
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,000"), Some(1_000));
        assert_eq!(parse_amount(" 42 "), Some(42));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("-5"), None);
        assert_eq!(parse_amount("1.5"), None);
    }
}
