//! 端末向けの明細表示
//!
//! 支払額のエラーはここで初めて `0` に平坦化し、`#` 付きの状態を横に表示します。

use crate::analytics::export::report_data::{AgencySummary, ExportableRow, ReportData};
use std::fmt::Write;

const HEADERS: [&str; 9] = [
    "ルームID",
    "明細",
    "支払月",
    "分配額",
    "個別ランク",
    "MKランク",
    "適用料率",
    "支払額",
    "状態",
];

/// 全角文字を2桁として数えた表示幅
pub fn display_width(text: &str) -> usize {
    text.chars().map(|c| if c.is_ascii() { 1 } else { 2 }).sum()
}

fn pad(text: &str, width: usize, right_align: bool) -> String {
    let fill = " ".repeat(width.saturating_sub(display_width(text)));
    if right_align {
        format!("{fill}{text}")
    } else {
        format!("{text}{fill}")
    }
}

/// 3桁区切り
pub fn format_yen(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if amount < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

fn row_cells(row: &ExportableRow) -> [String; 9] {
    let mut status = row.payout_status.clone();
    if row.is_carry_over {
        status = format!("{status} 繰越");
    }

    [
        row.room_id.clone(),
        row.line_text.clone(),
        row.payment_month.clone().unwrap_or_default(),
        format_yen(row.amount as i64),
        row.individual_rank.clone(),
        row.agency_tier.clone(),
        row.rate_label.clone(),
        row.payout.map(format_yen).unwrap_or_default(),
        status,
    ]
}

/// 明細表を文字列に整形
pub fn render_table(rows: &[ExportableRow]) -> String {
    let cells: Vec<[String; 9]> = rows.iter().map(row_cells).collect();

    let mut widths = HEADERS.map(display_width);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(cell));
        }
    }

    let numeric = |column: usize| matches!(column, 3 | 7);
    let mut out = String::new();

    let header: Vec<String> = HEADERS
        .iter()
        .enumerate()
        .map(|(i, h)| pad(h, widths[i], numeric(i)))
        .collect();
    let _ = writeln!(out, "{}", header.join("  ").trim_end());

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", rule.join("  "));

    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| pad(cell, widths[i], numeric(i)))
            .collect();
        let _ = writeln!(out, "{}", line.join("  ").trim_end());
    }

    out
}

fn render_agency(agency: &[AgencySummary]) -> String {
    let mut out = String::new();
    for summary in agency {
        let total = summary
            .total
            .map(|t| format!("{}円", format_yen(t as i64)))
            .unwrap_or_else(|| "取得できず（最下位ティアで計算）".to_string());
        let tier = summary
            .tier
            .map(|t| format!("MK{t}"))
            .unwrap_or_else(|| "—".to_string());
        let _ = writeln!(out, "  {} {}: {} / {}", summary.period, summary.label, total, tier);
    }
    out
}

/// レポート全体（事務所合計・明細・警告）
pub fn render_report(report: &ReportData) -> String {
    let meta = &report.metadata;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "📊 {} 配信分  (ライバー {} 名 / 明細 {} 行 / エラー {} 件)",
        meta.selected_period, meta.talent_count, meta.row_count, meta.error_count
    );
    if !report.agency.is_empty() {
        let _ = writeln!(out, "事務所合計:");
        out.push_str(&render_agency(&report.agency));
    }
    out.push('\n');
    out.push_str(&render_table(&report.rows));
    let _ = writeln!(out, "\n支払想定額合計: {}円", format_yen(report.total_payout()));

    if !meta.warnings.is_empty() {
        let _ = writeln!(out, "\n⚠️ 警告 ({} 件):", meta.warnings.len());
        for warning in &meta.warnings {
            let _ = writeln!(out, "  - {warning}");
        }
    }

    out
}
