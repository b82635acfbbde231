//! 支払想定額の計算
//!
//! 計算式はすべての売上種別で共通です。
//!
//! ```text
//! 支払想定額 = round(分配額 × 税係数 × 料率 / 1.10)
//! 税係数     = 1.10 (インボイス登録者) / 1.08 (非登録者)
//! ```
//!
//! 分母の 1.10 は登録有無に関係なく固定です。
//! 浮動小数点の誤差を避けるため、料率は千分率の整数で保持し、有理数のまま計算してから
//! 最近接偶数丸め（銀行丸め）で整数化します。

use super::rank::{AgencyTier, IndividualRank, RankOutcome};
use super::tax::TaxMarker;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 計算エラー（表示直前まで 0 と区別して保持する）
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalcError {
    #[error("#ERROR_RANK")]
    InvalidRank,
    #[error("#ERROR_MK")]
    InvalidTier,
    #[error("#ERROR_CALC")]
    CalculationFailure,
}

/// 個別ランク × MKランク区分の料率（千分率）
///
/// 列: MKランク 1-2 / 3-4 / 5-6 / 7-8 / 9-10 / 11
const ROOM_RATE_TABLE: [[u32; 6]; 8] = [
    [725, 730, 735, 740, 745, 750], // E
    [750, 755, 760, 765, 770, 775], // D
    [775, 780, 785, 790, 795, 800], // C
    [800, 805, 810, 815, 820, 825], // B
    [825, 830, 835, 840, 845, 850], // A
    [850, 855, 860, 865, 870, 875], // S
    [875, 880, 885, 890, 895, 900], // SS
    [900, 905, 910, 915, 920, 925], // SSS
];

/// プレミアムライブ料率 0.9
pub const PREMIUM_LIVE_RATE_PERMILLE: u32 = 900;
/// タイムチャージ料率 1.00
pub const TIME_CHARGE_RATE_PERMILLE: u32 = 1_000;

const REGISTERED_MULTIPLIER: u128 = 110;
const UNREGISTERED_MULTIPLIER: u128 = 108;
const DIVISOR: u128 = 110;
const PERMILLE: u128 = 1_000;

/// 1セル分の支払想定額
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Payout {
    Estimated(i64),
    /// 金額なし（null）
    Absent,
    Failed(CalcError),
}

impl Payout {
    pub fn from_result(result: Result<i64, CalcError>) -> Self {
        match result {
            Ok(value) => Payout::Estimated(value),
            Err(error) => Payout::Failed(error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Payout::Failed(_))
    }

    pub fn estimated(&self) -> Option<i64> {
        match self {
            Payout::Estimated(value) => Some(*value),
            _ => None,
        }
    }

    /// 表示用の値。エラーはここで初めて 0 に丸める。
    pub fn display_value(&self) -> Option<i64> {
        match self {
            Payout::Estimated(value) => Some(*value),
            Payout::Absent => None,
            Payout::Failed(_) => Some(0),
        }
    }

    /// エクスポート用の状態名
    pub fn status_label(&self) -> String {
        match self {
            Payout::Estimated(_) => "ok".to_string(),
            Payout::Absent => "absent".to_string(),
            Payout::Failed(error) => error.to_string(),
        }
    }
}

/// ルーム売上の料率（千分率）
pub fn room_rate_permille(rank: IndividualRank, tier: AgencyTier) -> Result<u32, CalcError> {
    let column = tier.bucket().ok_or(CalcError::InvalidTier)?;
    ROOM_RATE_TABLE
        .get(rank.row())
        .and_then(|row| row.get(column))
        .copied()
        .ok_or(CalcError::InvalidRank)
}

/// 適用料率ラベル `MK{tier}/個{rank}`
pub fn rate_label(tier: AgencyTier, rank: RankOutcome) -> String {
    format!("MK{}/個{}", tier, rank)
}

/// ルーム売上の支払想定額
pub fn room_payout(
    rank: RankOutcome,
    tier: AgencyTier,
    amount: u64,
    tax: impl Into<TaxMarker>,
) -> Result<i64, CalcError> {
    if tier.bucket().is_none() {
        return Err(CalcError::InvalidTier);
    }
    let rank = rank.rank().ok_or(CalcError::InvalidRank)?;
    let rate = room_rate_permille(rank, tier)?;
    estimate(amount, rate, tax.into().is_registered())
}

/// プレミアムライブの支払想定額。金額なしは `Absent`。
pub fn premium_live_payout(amount: Option<u64>, tax: impl Into<TaxMarker>) -> Payout {
    match amount {
        None => Payout::Absent,
        Some(amount) => Payout::from_result(estimate(
            amount,
            PREMIUM_LIVE_RATE_PERMILLE,
            tax.into().is_registered(),
        )),
    }
}

/// タイムチャージの支払想定額。金額なしは `Absent`。
pub fn time_charge_payout(amount: Option<u64>, tax: impl Into<TaxMarker>) -> Payout {
    match amount {
        None => Payout::Absent,
        Some(amount) => Payout::from_result(estimate(
            amount,
            TIME_CHARGE_RATE_PERMILLE,
            tax.into().is_registered(),
        )),
    }
}

fn estimate(amount: u64, rate_permille: u32, registered: bool) -> Result<i64, CalcError> {
    let multiplier = if registered {
        REGISTERED_MULTIPLIER
    } else {
        UNREGISTERED_MULTIPLIER
    };

    let numerator = (amount as u128)
        .checked_mul(multiplier)
        .and_then(|v| v.checked_mul(rate_permille as u128))
        .ok_or(CalcError::CalculationFailure)?;
    let rounded = round_half_even(numerator, DIVISOR * PERMILLE);

    i64::try_from(rounded).map_err(|_| CalcError::CalculationFailure)
}

/// `numerator / denominator` を最近接偶数丸め
fn round_half_even(numerator: u128, denominator: u128) -> u128 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    match (remainder * 2).cmp(&denominator) {
        std::cmp::Ordering::Less => quotient,
        std::cmp::Ordering::Greater => quotient + 1,
        std::cmp::Ordering::Equal if quotient % 2 == 0 => quotient,
        std::cmp::Ordering::Equal => quotient + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::rank::rank_for_amount;

    fn rank(r: IndividualRank) -> RankOutcome {
        RankOutcome::Rank(r)
    }

    #[test]
    fn test_room_payout_registered() {
        let payout = room_payout(rank(IndividualRank::D), AgencyTier(1), 100_000, true);
        assert_eq!(payout, Ok(75_000));
    }

    #[test]
    fn test_room_payout_unregistered() {
        // round(100000 * 1.08 * 0.750 / 1.10) = round(73636.36…)
        let payout = room_payout(rank(IndividualRank::D), AgencyTier(1), 100_000, false);
        assert_eq!(payout, Ok(73_636));
    }

    #[test]
    fn test_room_payout_tier_buckets_share_rates() {
        let amount = 200_000;
        let r = rank(rank_for_amount(amount));
        for (a, b) in [(1, 2), (3, 4), (5, 6), (7, 8), (9, 10)] {
            assert_eq!(
                room_payout(r, AgencyTier(a), amount, true),
                room_payout(r, AgencyTier(b), amount, true)
            );
        }
        // A / MK11 = 0.850
        assert_eq!(room_payout(r, AgencyTier(11), amount, true), Ok(170_000));
    }

    #[test]
    fn test_room_payout_errors() {
        assert_eq!(
            room_payout(rank(IndividualRank::E), AgencyTier(0), 1_000, true),
            Err(CalcError::InvalidTier)
        );
        assert_eq!(
            room_payout(rank(IndividualRank::E), AgencyTier(12), 1_000, true),
            Err(CalcError::InvalidTier)
        );
        assert_eq!(
            room_payout(RankOutcome::NotApplicable, AgencyTier(3), 1_000, true),
            Err(CalcError::InvalidRank)
        );
    }

    #[test]
    fn test_room_payout_normalizes_text_tax_markers() {
        let r = rank(IndividualRank::D);
        let registered = room_payout(r, AgencyTier(1), 100_000, "yes");
        let unregistered = room_payout(r, AgencyTier(1), 100_000, "nan");
        assert_eq!(registered, Ok(75_000));
        assert_eq!(unregistered, Ok(73_636));
    }

    #[test]
    fn test_rate_table_corners() {
        assert_eq!(room_rate_permille(IndividualRank::E, AgencyTier(1)), Ok(725));
        assert_eq!(room_rate_permille(IndividualRank::SSS, AgencyTier(11)), Ok(925));
        assert_eq!(room_rate_permille(IndividualRank::S, AgencyTier(6)), Ok(860));
    }

    #[test]
    fn test_rate_label() {
        assert_eq!(
            rate_label(AgencyTier(3), rank(IndividualRank::SS)),
            "MK3/個SS"
        );
    }

    #[test]
    fn test_premium_live_and_time_charge() {
        assert_eq!(premium_live_payout(Some(10_000), true), Payout::Estimated(9_000));
        // round(10000 * 1.08 * 0.9 / 1.10) = round(8836.36…)
        assert_eq!(premium_live_payout(Some(10_000), false), Payout::Estimated(8_836));
        assert_eq!(time_charge_payout(Some(10_000), true), Payout::Estimated(10_000));
        // round(10000 * 1.08 / 1.10) = round(9818.18…)
        assert_eq!(time_charge_payout(Some(10_000), "0"), Payout::Estimated(9_818));
        assert_eq!(premium_live_payout(None, true), Payout::Absent);
        assert_eq!(time_charge_payout(None, false), Payout::Absent);
    }

    #[test]
    fn test_ties_round_to_even() {
        // 5 × 0.9 = 4.5 → 4
        assert_eq!(premium_live_payout(Some(5), true), Payout::Estimated(4));
        // 15 × 0.9 = 13.5 → 14
        assert_eq!(premium_live_payout(Some(15), true), Payout::Estimated(14));
        // 2 × 0.75 = 1.5 → 2, 6 × 0.75 = 4.5 → 4
        let d = rank(IndividualRank::D);
        assert_eq!(room_payout(d, AgencyTier(1), 2, true), Ok(2));
        assert_eq!(room_payout(d, AgencyTier(1), 6, true), Ok(4));
    }

    #[test]
    fn test_zero_amount_is_zero_not_error() {
        let payout = room_payout(rank(IndividualRank::E), AgencyTier(1), 0, false);
        assert_eq!(payout, Ok(0));
    }

    #[test]
    fn test_display_value_flattens_errors_last() {
        let failed = Payout::Failed(CalcError::InvalidTier);
        assert!(failed.is_error());
        assert_eq!(failed.estimated(), None);
        assert_eq!(failed.display_value(), Some(0));
        assert_eq!(failed.status_label(), "#ERROR_MK");
        assert_eq!(Payout::Absent.display_value(), None);
        assert_eq!(Payout::Estimated(12).display_value(), Some(12));
    }

    #[test]
    fn test_overflow_is_calculation_failure() {
        assert_eq!(
            time_charge_payout(Some(u64::MAX), true),
            Payout::Failed(CalcError::CalculationFailure)
        );
    }
}
