//! 繰越月の判定
//!
//! ライバーごとの売上履歴ファイルを、選択された配信月 (`P0`) から過去へ遡り、
//! 支払が繰り越された月の連なりを求めます。
//!
//! 状態遷移:
//!
//! ```text
//! LocatingAnchor ──(P0 の行あり)──▶ WalkingBack(0) ──(繰越)──▶ WalkingBack(n+1)
//!        │                              │
//!        │ (P0 の行なし)                 └──(支払 / 履歴の終端)──▶ Done
//!        ▼
//!    DoneEmpty
//! ```
//!
//! - 履歴の行順は信用せず、配信月で索引化して新しい順に辿ります。
//! - 同じ配信月の行が複数ある場合は最初の行を採用します。
//! - `P0` より新しい行は無視します。
//! - 欠落した月は単に存在しないものとして扱い、区分の並びだけで判定します。
//! - 「支払」の行で停止し、その月自体は結果に含めません。

use crate::models::{Ledger, LedgerEntry, LedgerStatus};
use crate::period::Period;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "carried", rename_all = "snake_case")]
pub enum ResolverState {
    LocatingAnchor,
    /// これまでに見つけた繰越月の数
    WalkingBack(usize),
    Done,
    DoneEmpty,
}

impl ResolverState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResolverState::Done | ResolverState::DoneEmpty)
    }
}

/// 単月処理に縮退した理由
#[derive(Debug, Clone, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionWarning {
    #[display("selected period {selected} not found in history ledger")]
    AnchorMissing { selected: Period },
    #[display("history ledger unavailable: {reason}")]
    LedgerUnavailable { reason: String },
    #[display("no history file registered")]
    NoHistoryFile,
}

/// 判定結果。`periods` は `[P0, 繰越1, 繰越2, …]` の新しい順。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub selected: Period,
    pub periods: Vec<Period>,
    pub state: ResolverState,
    pub warning: Option<ResolutionWarning>,
}

impl Resolution {
    /// 履歴を使わずに選択月だけを処理する
    pub fn single(selected: Period, warning: ResolutionWarning) -> Self {
        Self {
            selected,
            periods: vec![selected],
            state: ResolverState::DoneEmpty,
            warning: Some(warning),
        }
    }

    pub fn carry_overs(&self) -> &[Period] {
        self.periods.get(1..).unwrap_or_default()
    }

    pub fn includes(&self, period: &Period) -> bool {
        self.periods.contains(period)
    }
}

/// 1人分の繰越判定ステートマシン
#[derive(Debug)]
pub struct CarryOverResolver<'a> {
    selected: Period,
    /// `P0` 以前の行（新しい順、重複除去済み）
    history: Vec<&'a LedgerEntry>,
    cursor: usize,
    state: ResolverState,
    periods: Vec<Period>,
    warning: Option<ResolutionWarning>,
}

impl<'a> CarryOverResolver<'a> {
    pub fn new(ledger: &'a Ledger, selected: Period) -> Self {
        let history = ledger
            .index()
            .range(..=selected)
            .rev()
            .map(|(_, entry)| *entry)
            .collect();

        Self {
            selected,
            history,
            cursor: 0,
            state: ResolverState::LocatingAnchor,
            periods: Vec::new(),
            warning: None,
        }
    }

    pub fn state(&self) -> ResolverState {
        self.state
    }

    /// 1遷移だけ進める。終端状態では何もしない。
    pub fn step(&mut self) -> ResolverState {
        self.state = match self.state {
            ResolverState::LocatingAnchor => self.locate_anchor(),
            ResolverState::WalkingBack(found) => self.walk_back(found),
            terminal => terminal,
        };
        self.state
    }

    fn locate_anchor(&mut self) -> ResolverState {
        self.periods.push(self.selected);

        match self.history.first() {
            Some(entry) if entry.period == self.selected => {
                self.cursor = 1;
                ResolverState::WalkingBack(0)
            }
            _ => {
                self.warning = Some(ResolutionWarning::AnchorMissing {
                    selected: self.selected,
                });
                ResolverState::DoneEmpty
            }
        }
    }

    fn walk_back(&mut self, found: usize) -> ResolverState {
        let Some(entry) = self.history.get(self.cursor) else {
            return ResolverState::Done;
        };

        match entry.status {
            LedgerStatus::CarriedOver => {
                self.periods.push(entry.period);
                self.cursor += 1;
                ResolverState::WalkingBack(found + 1)
            }
            LedgerStatus::Paid => ResolverState::Done,
        }
    }

    /// 終端まで進めて結果を返す
    pub fn run(mut self) -> Resolution {
        while !self.state.is_terminal() {
            self.step();
        }

        Resolution {
            selected: self.selected,
            periods: self.periods,
            state: self.state,
            warning: self.warning,
        }
    }
}

/// 履歴ファイルから処理対象の配信月を求める
pub fn resolve(ledger: &Ledger, selected: Period) -> Resolution {
    let resolution = CarryOverResolver::new(ledger, selected).run();

    match &resolution.warning {
        Some(warning) => tracing::warn!(%selected, "⚠️ {}; processing selected period only", warning),
        None => tracing::debug!(
            %selected,
            carry_overs = resolution.carry_overs().len(),
            "✅ carry-over resolution complete"
        ),
    }

    resolution
}
