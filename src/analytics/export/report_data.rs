use crate::analytics::detail::{DetailRow, DetailTable, SalesPresence};
use crate::period::Period;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// エクスポート可能な明細行（表示用に平坦化済み）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportableRow {
    pub processing_key: String,
    pub room_id: String,
    pub account_id: Option<String>,
    pub history_file_id: Option<String>,
    pub period: String,
    pub payment_month: Option<String>,
    pub category: String,
    pub category_label: String,
    pub line_text: String,
    pub no_sales: bool,
    pub is_carry_over: bool,
    pub amount: u64,
    pub individual_rank: String,
    pub agency_tier: String,
    pub rate_label: String,
    /// エラーはここで 0 に平坦化される
    pub payout: Option<i64>,
    pub payout_status: String,
    pub tax_registered: bool,
    pub tax_marker: Option<String>,
}

impl ExportableRow {
    pub fn from_detail(row: &DetailRow, selected: &Period) -> Self {
        Self {
            processing_key: row.processing_key(),
            room_id: row.room_id.to_string(),
            account_id: row.account_id.clone(),
            history_file_id: row.history_file_id.clone(),
            period: row.period.key(),
            payment_month: row.period.payment_label().ok(),
            category: row.category.slug().to_string(),
            category_label: row.category.label().to_string(),
            line_text: row.line_text(),
            no_sales: row.sales == SalesPresence::NoSales,
            is_carry_over: row.is_carry_over(selected),
            amount: row.amount,
            individual_rank: row.rank_display(),
            agency_tier: row.tier_display(),
            rate_label: row.rate_label.clone(),
            payout: row.payout.display_value(),
            payout_status: row.payout.status_label(),
            tax_registered: row.tax_registered,
            tax_marker: row.tax_marker.clone(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.payout_status.starts_with('#')
    }
}

/// 配信月ごとの事務所全体の分配額（明細とは別に表示する）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencySummary {
    pub period: String,
    pub label: String,
    pub login_id: Option<String>,
    pub total: Option<u64>,
    pub tier: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub run_id: String,
    pub selected_period: String,
    pub generated_at: DateTime<Utc>,
    pub export_version: String,
    pub srpay_version: String,
    pub talent_count: usize,
    pub row_count: usize,
    pub error_count: usize,
    pub warnings: Vec<String>,
}

/// エクスポート用のレポート
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    pub metadata: ReportMetadata,
    pub agency: Vec<AgencySummary>,
    pub rows: Vec<ExportableRow>,
}

impl ReportData {
    pub fn new(
        run_id: impl Into<String>,
        selected: Period,
        talent_count: usize,
        table: &DetailTable,
        agency: Vec<AgencySummary>,
        warnings: Vec<String>,
    ) -> Self {
        let rows: Vec<ExportableRow> = table
            .rows
            .iter()
            .map(|row| ExportableRow::from_detail(row, &selected))
            .collect();

        Self {
            metadata: ReportMetadata {
                run_id: run_id.into(),
                selected_period: selected.key(),
                generated_at: Utc::now(),
                export_version: "1.0".to_string(),
                srpay_version: env!("CARGO_PKG_VERSION").to_string(),
                talent_count,
                row_count: rows.len(),
                error_count: table.error_count(),
                warnings,
            },
            agency,
            rows,
        }
    }

    /// 支払想定額の合計（エラー・金額なしは含めない）
    pub fn total_payout(&self) -> i64 {
        self.rows
            .iter()
            .filter(|row| !row.is_error())
            .filter_map(|row| row.payout)
            .sum()
    }
}

impl Default for ReportData {
    fn default() -> Self {
        Self {
            metadata: ReportMetadata {
                run_id: String::new(),
                selected_period: String::new(),
                generated_at: Utc::now(),
                export_version: "1.0".to_string(),
                srpay_version: env!("CARGO_PKG_VERSION").to_string(),
                talent_count: 0,
                row_count: 0,
                error_count: 0,
                warnings: Vec::new(),
            },
            agency: Vec::new(),
            rows: Vec::new(),
        }
    }
}
