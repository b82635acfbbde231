//! 名簿・売上・履歴ファイルの値オブジェクト
//!
//! パイプラインの各段は、ここで定義された不変の値を受け取り、新しい値を返します。

use crate::period::Period;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// SHOWROOM のルームID（結合キー）
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// 名簿の1行（管理対象ライバー）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Talent {
    pub room_id: RoomId,
    /// 個別売上履歴ファイル名（URLテンプレートに埋め込む）
    pub history_file_id: Option<String>,
    /// 名簿上のインボイス欄（生の値）
    pub tax_marker: Option<String>,
    pub tax_registered: bool,
}

/// 処理対象ライバー名簿
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub talents: Vec<Talent>,
    /// インボイス列が存在したか（無い場合は全員非登録扱い）
    pub tax_column_present: bool,
}

impl Roster {
    pub fn len(&self) -> usize {
        self.talents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.talents.is_empty()
    }

    pub fn registered_count(&self) -> usize {
        self.talents.iter().filter(|t| t.tax_registered).count()
    }

    pub fn find(&self, room_id: &RoomId) -> Option<&Talent> {
        self.talents.iter().find(|t| &t.room_id == room_id)
    }
}

/// 売上種別
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RevenueCategory {
    Room,
    PremiumLive,
    TimeCharge,
}

impl RevenueCategory {
    /// 固定の処理・表示順
    pub const ALL: [RevenueCategory; 3] = [
        RevenueCategory::Room,
        RevenueCategory::PremiumLive,
        RevenueCategory::TimeCharge,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RevenueCategory::Room => "ルーム売上",
            RevenueCategory::PremiumLive => "プレミアムライブ売上",
            RevenueCategory::TimeCharge => "タイムチャージ売上",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            RevenueCategory::Room => "room_sales",
            RevenueCategory::PremiumLive => "premium_live",
            RevenueCategory::TimeCharge => "time_charge",
        }
    }

    /// 並び順の優先度 (小さいほど先)
    pub fn priority(&self) -> u8 {
        match self {
            RevenueCategory::Room => 0,
            RevenueCategory::PremiumLive => 1,
            RevenueCategory::TimeCharge => 2,
        }
    }
}

impl std::fmt::Display for RevenueCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// 管理画面から取得したライバー個別の分配額
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueRow {
    pub room_id: RoomId,
    pub category: RevenueCategory,
    /// 分配額（円、非負）
    pub amount: u64,
    pub account_id: Option<String>,
}

/// 事務所全体の分配額（ルーム売上のみ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "amount", rename_all = "snake_case")]
pub enum AgencyTotal {
    Known(u64),
    Missing,
}

impl AgencyTotal {
    pub fn amount(&self) -> Option<u64> {
        match self {
            AgencyTotal::Known(amount) => Some(*amount),
            AgencyTotal::Missing => None,
        }
    }
}

/// (配信月, 売上種別) 1回分の取得結果
///
/// 事務所合計は個別行とは別に保持します。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueTable {
    pub category: RevenueCategory,
    pub rows: Vec<RevenueRow>,
    /// ルーム売上以外では常に `None`
    pub agency_total: Option<AgencyTotal>,
}

impl RevenueTable {
    pub fn empty(category: RevenueCategory) -> Self {
        Self {
            category,
            rows: Vec::new(),
            agency_total: (category == RevenueCategory::Room).then_some(AgencyTotal::Missing),
        }
    }

    pub fn rows_for<'a>(&'a self, room_id: &'a RoomId) -> impl Iterator<Item = &'a RevenueRow> {
        self.rows.iter().filter(move |row| &row.room_id == room_id)
    }
}

/// 1つの配信月について取得できた全種別の売上
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeriodRevenue {
    pub tables: BTreeMap<RevenueCategory, RevenueTable>,
}

impl PeriodRevenue {
    pub fn insert(&mut self, table: RevenueTable) {
        self.tables.insert(table.category, table);
    }

    pub fn table(&self, category: RevenueCategory) -> Option<&RevenueTable> {
        self.tables.get(&category)
    }

    pub fn agency_total(&self) -> Option<AgencyTotal> {
        self.table(RevenueCategory::Room)
            .and_then(|table| table.agency_total)
    }
}

/// 履歴ファイルの支払/繰越区分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Paid,
    CarriedOver,
}

impl LedgerStatus {
    /// `支払` / `繰越` （英語表記も許容）
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "支払" | "paid" => Some(LedgerStatus::Paid),
            "繰越" | "carried_over" | "carried over" | "carry-over" => {
                Some(LedgerStatus::CarriedOver)
            }
            _ => None,
        }
    }
}

/// 履歴ファイルの1行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub period: Period,
    pub payment_period: Option<Period>,
    pub status: LedgerStatus,
    pub recorded_payout: Option<i64>,
}

impl LedgerEntry {
    pub fn new(period: Period, status: LedgerStatus) -> Self {
        Self {
            period,
            payment_period: None,
            status,
            recorded_payout: None,
        }
    }
}

/// ライバー1人分の売上履歴（行順は保証されない）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn from_entries(entries: Vec<LedgerEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 配信月で索引化（重複時は最初の行を採用）
    pub fn index(&self) -> BTreeMap<Period, &LedgerEntry> {
        let mut index = BTreeMap::new();
        for entry in &self.entries {
            if index.contains_key(&entry.period) {
                tracing::debug!(period = %entry.period, "duplicate ledger row ignored");
                continue;
            }
            index.insert(entry.period, entry);
        }
        index
    }
}
