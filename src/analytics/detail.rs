//! 明細の組み立て
//!
//! 配信月ごとに「全種別 × 全対象ライバー」の明細行を作り、合算せずに1つの表へ並べます。
//! 当月も繰越月も同じ [`assemble_period`] を通ります。

use super::payout::{
    premium_live_payout, rate_label, room_payout, time_charge_payout, Payout,
};
use super::rank::{agency_tier, rank_for_amount, AgencyTier, RankOutcome};
use crate::models::{AgencyTotal, PeriodRevenue, RevenueCategory, RoomId, Talent};
use crate::period::Period;
use serde::Serialize;
use std::cmp::Reverse;
use tracing::{debug, warn};

/// 売上種別以外の行に入る番兵表示
pub const SENTINEL: &str = "—";

/// 該当種別に売上行があったか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SalesPresence {
    Recorded,
    /// 売上なし（0円行として残す）
    NoSales,
}

/// 出力明細の1行。作成後は変更しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailRow {
    pub room_id: RoomId,
    pub history_file_id: Option<String>,
    pub account_id: Option<String>,
    /// この行の元になった配信月（選択月とは限らない）
    pub period: Period,
    pub category: RevenueCategory,
    pub sales: SalesPresence,
    pub amount: u64,
    /// ルーム売上のみ
    pub individual_rank: Option<RankOutcome>,
    /// ルーム売上のみ
    pub agency_tier: Option<AgencyTier>,
    pub rate_label: String,
    pub payout: Payout,
    pub tax_registered: bool,
    /// 名簿の生のインボイス欄
    pub tax_marker: Option<String>,
}

impl DetailRow {
    pub fn rank_display(&self) -> String {
        self.individual_rank
            .map(|rank| rank.to_string())
            .unwrap_or_else(|| SENTINEL.to_string())
    }

    pub fn tier_display(&self) -> String {
        self.agency_tier
            .map(|tier| tier.to_string())
            .unwrap_or_else(|| SENTINEL.to_string())
    }

    /// `2025年10月配信分のルーム売上`
    pub fn line_text(&self) -> String {
        let text = format!("{}の{}", self.period.distribution_label(), self.category.label());
        match self.sales {
            SalesPresence::Recorded => text,
            SalesPresence::NoSales => format!("{text}（売上なし）"),
        }
    }

    /// `{room_id}-{category}-{YYYY/MM}`
    pub fn processing_key(&self) -> String {
        format!("{}-{}-{}", self.room_id, self.category.slug(), self.period)
    }

    pub fn is_carry_over(&self, selected: &Period) -> bool {
        self.period != *selected
    }
}

/// 組み立て中に見つかった縮退
#[derive(Debug, Clone, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssemblyWarning {
    #[display("agency total missing for {period}; using lowest tier")]
    AgencyTotalMissing { period: Period },
    #[display("{category} revenue unavailable for {period}; rows skipped")]
    CategoryUnavailable {
        period: Period,
        category: RevenueCategory,
    },
}

/// 明細表（非集計）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetailTable {
    pub rows: Vec<DetailRow>,
    pub warnings: Vec<AssemblyWarning>,
}

impl DetailTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.rows.iter().filter(|row| row.payout.is_error()).count()
    }

    fn extend(&mut self, other: DetailTable) {
        self.rows.extend(other.rows);
        self.warnings.extend(other.warnings);
    }
}

/// 配信月1つ分のティアを決定。合計が取れない場合は最下位ティア。
pub fn tier_for_period(period: Period, revenue: &PeriodRevenue) -> (AgencyTier, Option<AssemblyWarning>) {
    match revenue.agency_total() {
        Some(AgencyTotal::Known(total)) => (agency_tier(total), None),
        _ => {
            warn!(%period, "⚠️ agency total missing; falling back to lowest tier");
            (
                AgencyTier::LOWEST,
                Some(AssemblyWarning::AgencyTotalMissing { period }),
            )
        }
    }
}

/// 1つの配信月について、対象ライバー全員の明細を作成
pub fn assemble_period(period: Period, revenue: &PeriodRevenue, talents: &[&Talent]) -> DetailTable {
    let mut table = DetailTable::default();
    if talents.is_empty() {
        return table;
    }

    let (tier, tier_warning) = tier_for_period(period, revenue);
    table.warnings.extend(tier_warning);

    for category in RevenueCategory::ALL {
        let Some(revenue_table) = revenue.table(category) else {
            table.warnings.push(AssemblyWarning::CategoryUnavailable { period, category });
            continue;
        };

        for talent in talents {
            let mut matched = false;
            for row in revenue_table.rows_for(&talent.room_id) {
                matched = true;
                table.rows.push(build_row(
                    talent,
                    period,
                    category,
                    tier,
                    Some(row.amount),
                    row.account_id.clone(),
                ));
            }

            if !matched {
                table
                    .rows
                    .push(build_row(talent, period, category, tier, None, None));
            }
        }
    }

    debug!(%period, rows = table.rows.len(), "🧮 period assembled");
    table
}

fn build_row(
    talent: &Talent,
    period: Period,
    category: RevenueCategory,
    tier: AgencyTier,
    amount: Option<u64>,
    account_id: Option<String>,
) -> DetailRow {
    let sales = match amount {
        Some(_) => SalesPresence::Recorded,
        None => SalesPresence::NoSales,
    };
    let registered = talent.tax_registered;

    let (individual_rank, agency_tier, label, payout) = match (category, amount) {
        (RevenueCategory::Room, Some(amount)) => {
            let rank = RankOutcome::Rank(rank_for_amount(amount));
            let payout = Payout::from_result(room_payout(rank, tier, amount, registered));
            (Some(rank), Some(tier), rate_label(tier, rank), payout)
        }
        (RevenueCategory::PremiumLive, amount) => (
            None,
            None,
            "-".to_string(),
            premium_live_payout(amount, registered),
        ),
        (RevenueCategory::TimeCharge, amount) => (
            None,
            None,
            "-".to_string(),
            time_charge_payout(amount, registered),
        ),
        (RevenueCategory::Room, None) => (None, None, "-".to_string(), Payout::Absent),
    };

    DetailRow {
        room_id: talent.room_id.clone(),
        history_file_id: talent.history_file_id.clone(),
        account_id,
        period,
        category,
        sales,
        amount: amount.unwrap_or(0),
        individual_rank,
        agency_tier,
        rate_label: label,
        payout,
        tax_registered: registered,
        tax_marker: talent.tax_marker.clone(),
    }
}

/// ライバーごとの処理対象月
#[derive(Debug, Clone)]
pub struct TalentPeriods<'a> {
    pub talent: &'a Talent,
    pub periods: &'a [Period],
}

/// 全ライバー・全対象月の明細をまとめて作成し、決定的な順に並べる
pub fn assemble<'a, F>(plans: &[TalentPeriods<'a>], revenue_for: F) -> DetailTable
where
    F: Fn(&Period) -> Option<&'a PeriodRevenue>,
{
    let mut periods: Vec<Period> = plans
        .iter()
        .flat_map(|plan| plan.periods.iter().copied())
        .collect();
    periods.sort_unstable_by_key(|p| Reverse(*p));
    periods.dedup();

    let mut table = DetailTable::default();
    for period in periods {
        let talents: Vec<&Talent> = plans
            .iter()
            .filter(|plan| plan.periods.contains(&period))
            .map(|plan| plan.talent)
            .collect();

        match revenue_for(&period) {
            Some(revenue) => table.extend(assemble_period(period, revenue, &talents)),
            None => table.warnings.extend(RevenueCategory::ALL.map(|category| {
                AssemblyWarning::CategoryUnavailable { period, category }
            })),
        }
    }

    sort_rows(&mut table.rows);
    table
}

/// (ルームID 昇順, 配信月 降順, 種別 ROOM > PREMIUM_LIVE > TIME_CHARGE) の安定ソート
pub fn sort_rows(rows: &mut [DetailRow]) {
    rows.sort_by(|a, b| {
        a.room_id
            .cmp(&b.room_id)
            .then_with(|| b.period.cmp(&a.period))
            .then_with(|| a.category.priority().cmp(&b.category.priority()))
    });
}
