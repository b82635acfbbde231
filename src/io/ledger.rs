//! Per-talent sales history (個別売上履歴) decoding.
//!
//! The history is an `.xlsx` workbook whose first sheet lists one row per distribution
//! month. Only rows with a parseable distribution month and a known status survive.

use super::{find_column, normalize_header, SourceError};
use crate::models::{Ledger, LedgerEntry, LedgerStatus};
use crate::period::Period;
use calamine::{Data, Range, Reader, Xlsx};
use chrono::{NaiveDate, NaiveDateTime};
use std::io::Cursor;
use tracing::debug;

pub const DISTRIBUTION_PERIOD_ALIASES: [&str; 2] = ["配信月", "distribution_period"];
pub const PAYMENT_PERIOD_ALIASES: [&str; 2] = ["支払月", "payment_period"];
pub const STATUS_ALIASES: [&str; 2] = ["支払/繰越", "status"];
pub const RECORDED_PAYOUT_ALIASES: [&str; 2] = ["支払額", "recorded_payout"];

/// Column positions resolved from the ledger header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerColumns {
    pub distribution_period: usize,
    pub payment_period: Option<usize>,
    pub status: usize,
    pub recorded_payout: Option<usize>,
}

impl LedgerColumns {
    pub fn resolve(headers: &[String], source_name: &str) -> Result<Self, SourceError> {
        let distribution_period = find_column(headers, &DISTRIBUTION_PERIOD_ALIASES).ok_or_else(
            || SourceError::missing_column(DISTRIBUTION_PERIOD_ALIASES[0], source_name),
        )?;
        let status = find_column(headers, &STATUS_ALIASES)
            .ok_or_else(|| SourceError::missing_column(STATUS_ALIASES[0], source_name))?;

        Ok(Self {
            distribution_period,
            payment_period: find_column(headers, &PAYMENT_PERIOD_ALIASES),
            status,
            recorded_payout: find_column(headers, &RECORDED_PAYOUT_ALIASES),
        })
    }
}

/// Parses an `.xlsx` history workbook.
pub fn parse_ledger(bytes: &[u8], source_name: &str) -> Result<Ledger, SourceError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| SourceError::Workbook(format!("{source_name}: {e}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SourceError::Workbook(format!("{source_name}: workbook has no sheets")))?
        .map_err(|e| SourceError::Workbook(format!("{source_name}: {e}")))?;

    parse_range(&range, source_name)
}

/// Parses an already-opened worksheet range.
pub fn parse_range(range: &Range<Data>, source_name: &str) -> Result<Ledger, SourceError> {
    let mut rows = range.rows();

    let headers: Vec<String> = rows
        .next()
        .map(|header| header.iter().map(|cell| normalize_header(&cell.to_string())).collect())
        .unwrap_or_default();
    let columns = LedgerColumns::resolve(&headers, source_name)?;

    let mut entries = Vec::new();
    let mut dropped = 0usize;

    for row in rows {
        let Some(period) = row.get(columns.distribution_period).and_then(period_from_cell) else {
            dropped += 1;
            continue;
        };

        let Some(status) = row.get(columns.status).and_then(status_from_cell) else {
            debug!(%period, source = source_name, "ledger row with unknown status dropped");
            dropped += 1;
            continue;
        };

        entries.push(LedgerEntry {
            period,
            payment_period: columns
                .payment_period
                .and_then(|i| row.get(i))
                .and_then(period_from_cell),
            status,
            recorded_payout: columns
                .recorded_payout
                .and_then(|i| row.get(i))
                .and_then(amount_from_cell),
        });
    }

    debug!(
        source = source_name,
        entries = entries.len(),
        dropped,
        "📒 Ledger parsed"
    );

    Ok(Ledger::from_entries(entries))
}

/// Reads a distribution/payment month from a text, numeric, or date cell.
pub fn period_from_cell(cell: &Data) -> Option<Period> {
    match cell {
        Data::String(text) | Data::DateTimeIso(text) => period_from_text(text),
        Data::DateTime(value) => value
            .as_datetime()
            .and_then(|dt| Period::from_date(dt.date()).ok()),
        Data::Int(value) => period_from_number(*value),
        Data::Float(value) if value.fract() == 0.0 => period_from_number(*value as i64),
        _ => None,
    }
}

fn period_from_text(text: &str) -> Option<Period> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(period) = Period::parse_any(text) {
        return Some(period);
    }

    const DATE_FORMATS: [&str; 3] = ["%Y/%m/%d", "%Y-%m-%d", "%Y年%m月%d日"];
    const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
        .and_then(|date| Period::from_date(date).ok())
}

/// `202510` 形式の整数
fn period_from_number(value: i64) -> Option<Period> {
    if !(100_001..=999_912).contains(&value) {
        return None;
    }
    Period::parse_key(&value.to_string()).ok()
}

fn status_from_cell(cell: &Data) -> Option<LedgerStatus> {
    match cell {
        Data::String(text) => LedgerStatus::parse(text),
        _ => None,
    }
}

fn amount_from_cell(cell: &Data) -> Option<i64> {
    match cell {
        Data::Int(value) => Some(*value),
        Data::Float(value) if value.is_finite() => Some(value.round() as i64),
        Data::String(text) => {
            let digits: String = text
                .trim()
                .trim_end_matches('円')
                .chars()
                .filter(|c| *c != ',')
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    fn p(key: &str) -> Period {
        key.parse().unwrap()
    }

    fn workbook_bytes(build: impl FnOnce(&mut rust_xlsxwriter::Worksheet)) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        build(worksheet);
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_parse_ledger_with_mixed_cells() {
        let bytes = workbook_bytes(|ws| {
            ws.write_string(0, 0, " 配信月 ").unwrap();
            ws.write_string(0, 1, "支払月").unwrap();
            ws.write_string(0, 2, "支払/\n繰越").unwrap();
            ws.write_string(0, 3, "支払額").unwrap();

            ws.write_string(1, 0, "2025/9").unwrap();
            ws.write_string(1, 1, "2025/11").unwrap();
            ws.write_string(1, 2, "繰越").unwrap();
            ws.write_number(1, 3, 12_345.0).unwrap();

            let date_format = Format::new().set_num_format("yyyy/mm/dd");
            let date = ExcelDateTime::from_ymd(2025, 10, 1).unwrap();
            ws.write_datetime_with_format(2, 0, &date, &date_format).unwrap();
            ws.write_string(2, 2, "支払").unwrap();

            ws.write_number(3, 0, 202508.0).unwrap();
            ws.write_string(3, 2, "繰越").unwrap();
            ws.write_string(3, 3, "1,000円").unwrap();
        });

        let ledger = parse_ledger(&bytes, "uriage_a").unwrap();

        assert_eq!(ledger.entries.len(), 3);
        assert_eq!(ledger.entries[0].period, p("2025/09"));
        assert_eq!(ledger.entries[0].payment_period, Some(p("2025/11")));
        assert_eq!(ledger.entries[0].status, LedgerStatus::CarriedOver);
        assert_eq!(ledger.entries[0].recorded_payout, Some(12_345));
        assert_eq!(ledger.entries[1].period, p("2025/10"));
        assert_eq!(ledger.entries[1].status, LedgerStatus::Paid);
        assert_eq!(ledger.entries[2].period, p("2025/08"));
        assert_eq!(ledger.entries[2].recorded_payout, Some(1_000));
    }

    #[test]
    fn test_unparseable_rows_are_dropped() {
        let bytes = workbook_bytes(|ws| {
            ws.write_string(0, 0, "配信月").unwrap();
            ws.write_string(0, 1, "支払/繰越").unwrap();
            ws.write_string(1, 0, "合計").unwrap();
            ws.write_string(1, 1, "支払").unwrap();
            ws.write_string(2, 0, "2025/07").unwrap();
            ws.write_string(2, 1, "保留").unwrap();
            ws.write_string(3, 0, "2025/06").unwrap();
            ws.write_string(3, 1, "支払").unwrap();
        });

        let ledger = parse_ledger(&bytes, "uriage_b").unwrap();
        assert_eq!(ledger.entries.len(), 1);
        assert_eq!(ledger.entries[0].period, p("2025/06"));
    }

    #[test]
    fn test_missing_status_column() {
        let bytes = workbook_bytes(|ws| {
            ws.write_string(0, 0, "配信月").unwrap();
            ws.write_string(1, 0, "2025/07").unwrap();
        });

        let result = parse_ledger(&bytes, "uriage_c");
        assert!(matches!(
            result,
            Err(SourceError::MissingColumn { ref column, .. }) if column == "支払/繰越"
        ));
    }

    #[test]
    fn test_non_workbook_bytes() {
        let result = parse_ledger(b"not a workbook", "uriage_d");
        assert!(matches!(result, Err(SourceError::Workbook(_))));
    }

    #[test]
    fn test_period_from_text_variants() {
        assert_eq!(period_from_text("2025-10"), Some(p("2025/10")));
        assert_eq!(period_from_text("2025年10月分"), Some(p("2025/10")));
        assert_eq!(period_from_text("2025/10/15"), Some(p("2025/10")));
        assert_eq!(period_from_text("2025-10-01 00:00:00"), Some(p("2025/10")));
        assert_eq!(period_from_text(""), None);
        assert_eq!(period_from_text("不明"), None);
    }
}
