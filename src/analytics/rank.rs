//! 個別ランク (E〜SSS) と MKランク (事務所ティア 1〜11)

use serde::{Deserialize, Serialize};

/// ライバー個別のルーム売上ランク
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    Serialize,
    Deserialize,
)]
pub enum IndividualRank {
    E,
    D,
    C,
    B,
    A,
    S,
    SS,
    SSS,
}

impl IndividualRank {
    pub const ALL: [IndividualRank; 8] = [
        IndividualRank::E,
        IndividualRank::D,
        IndividualRank::C,
        IndividualRank::B,
        IndividualRank::A,
        IndividualRank::S,
        IndividualRank::SS,
        IndividualRank::SSS,
    ];

    /// レート表の行番号
    pub(crate) fn row(&self) -> usize {
        *self as usize
    }
}

/// 各ランクの下限額（昇順）。E は下限なし。
const RANK_THRESHOLDS: [(u64, IndividualRank); 7] = [
    (22_501, IndividualRank::D),
    (45_001, IndividualRank::C),
    (90_001, IndividualRank::B),
    (135_001, IndividualRank::A),
    (270_001, IndividualRank::S),
    (450_001, IndividualRank::SS),
    (900_001, IndividualRank::SSS),
];

/// 個別ランク判定の結果。金額が無い場合は E ではなく `NotApplicable`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rank", rename_all = "snake_case")]
pub enum RankOutcome {
    Rank(IndividualRank),
    NotApplicable,
}

impl RankOutcome {
    pub fn rank(&self) -> Option<IndividualRank> {
        match self {
            RankOutcome::Rank(rank) => Some(*rank),
            RankOutcome::NotApplicable => None,
        }
    }
}

impl std::fmt::Display for RankOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RankOutcome::Rank(rank) => write!(f, "{rank}"),
            RankOutcome::NotApplicable => f.write_str("#N/A"),
        }
    }
}

/// 非負の分配額から個別ランクを決定
pub fn rank_for_amount(amount: u64) -> IndividualRank {
    RANK_THRESHOLDS
        .iter()
        .rev()
        .find(|(threshold, _)| amount >= *threshold)
        .map(|(_, rank)| *rank)
        .unwrap_or(IndividualRank::E)
}

/// 欠損・NaN を許容する個別ランク判定（負数は E）
pub fn individual_rank(amount: Option<f64>) -> RankOutcome {
    match amount {
        None => RankOutcome::NotApplicable,
        Some(value) if value.is_nan() => RankOutcome::NotApplicable,
        Some(value) if value < 0.0 => RankOutcome::Rank(IndividualRank::E),
        Some(value) => {
            let rank = RANK_THRESHOLDS
                .iter()
                .rev()
                .find(|(threshold, _)| value >= *threshold as f64)
                .map(|(_, rank)| *rank)
                .unwrap_or(IndividualRank::E);
            RankOutcome::Rank(rank)
        }
    }
}

/// MKランク（事務所全体ティア）
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AgencyTier(pub u8);

pub const TIER_BAND_WIDTH: u64 = 175_000;
pub const MAX_TIER: u8 = 11;

impl AgencyTier {
    /// 最下位ティア（事務所合計が取れないときの値）
    pub const LOWEST: AgencyTier = AgencyTier(1);

    pub fn value(&self) -> u8 {
        self.0
    }

    /// レート表の列番号。1,2→0 / 3,4→1 / … / 9,10→4 / 11→5
    pub(crate) fn bucket(&self) -> Option<usize> {
        match self.0 {
            1..=10 => Some(((self.0 - 1) / 2) as usize),
            MAX_TIER => Some(5),
            _ => None,
        }
    }

    /// レート表のキー表示 (1,3,5,7,9,11)
    pub fn bucket_key(&self) -> Option<u8> {
        self.bucket().map(|b| (b as u8) * 2 + 1)
    }
}

impl std::fmt::Display for AgencyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 事務所合計額からティアを決定。幅 175,000 円の閉区間が10本、1,750,000 円超は 11。
pub fn agency_tier(total_amount: u64) -> AgencyTier {
    let max_banded = TIER_BAND_WIDTH * (MAX_TIER as u64 - 1);
    if total_amount > max_banded {
        return AgencyTier(MAX_TIER);
    }
    let band = total_amount.div_ceil(TIER_BAND_WIDTH).max(1);
    AgencyTier(band as u8)
}
