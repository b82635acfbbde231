//! 名簿読み込み → 繰越判定 → 売上取得 → 明細作成 の一連の処理
//!
//! 各段は不変の値を受け取り新しい値を返します。外部との境界は
//! [`RevenueSource`] と [`LedgerSource`] の2つのトレイトだけで、テストでは
//! メモリ上の実装に差し替えられます。
//!
//! - 履歴ファイルはライバーごとに独立して並行取得し、失敗したライバーだけ単月処理に縮退します。
//! - 売上は `(配信月, 種別)` ごとに1回だけ、順番に取得します。
//! - 認証切れは唯一の致命的エラーで、以降の取得を行わずに終了します。

use crate::analytics::detail::{assemble, AssemblyWarning, DetailTable, TalentPeriods};
use crate::analytics::export::report_data::{AgencySummary, ReportData};
use crate::analytics::rank::agency_tier;
use crate::analytics::{resolve, Resolution, ResolutionWarning};
use crate::api::organizer::{FetchError, RevenueSource};
use crate::api::sources::{LedgerSource, RosterSource};
use crate::io::SourceError;
use crate::models::{PeriodRevenue, RevenueCategory, RoomId, Roster, Talent};
use crate::period::{Period, PeriodError, BUSINESS_TZ};
use chrono_tz::Tz;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// 実行を中断するエラー
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("organizer session expired; re-authenticate with `srpay auth set` and run again")]
    AuthExpired,

    #[error("roster unavailable: {0}")]
    RosterUnavailable(#[source] SourceError),

    #[error("roster contains no talents")]
    EmptyRoster,

    #[error(transparent)]
    InvalidPeriod(#[from] PeriodError),
}

/// 実行は継続したが結果に影響する事象
#[derive(Debug, Clone, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(tag = "scope", content = "detail", rename_all = "snake_case")]
pub enum RunWarning {
    #[display("{room_id}: {warning}")]
    Resolution {
        room_id: RoomId,
        warning: ResolutionWarning,
    },
    #[display("{category} revenue for {period} unavailable: {reason}")]
    RevenueUnavailable {
        period: Period,
        category: RevenueCategory,
        reason: String,
    },
    #[display("{_0}")]
    Assembly(AssemblyWarning),
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// 履歴ファイルの同時取得数
    pub ledger_concurrency: usize,
    /// 配信月 → タイムスタンプ変換に使うタイムゾーン
    pub timezone: Tz,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            ledger_concurrency: 4,
            timezone: BUSINESS_TZ,
        }
    }
}

/// 1回の実行結果
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub selected: Period,
    pub roster: Roster,
    /// `roster.talents` と同じ順
    pub resolutions: Vec<Resolution>,
    pub revenue: BTreeMap<Period, PeriodRevenue>,
    pub table: DetailTable,
    pub warnings: Vec<RunWarning>,
}

impl RunOutcome {
    pub fn carry_over_count(&self) -> usize {
        self.resolutions.iter().map(|r| r.carry_overs().len()).sum()
    }

    /// 取得できた配信月ごとの事務所合計（新しい順）
    pub fn agency_summaries(&self, label: &str, login_id: Option<&str>) -> Vec<AgencySummary> {
        self.revenue
            .iter()
            .rev()
            .map(|(period, revenue)| {
                let total = revenue.agency_total().and_then(|total| total.amount());
                AgencySummary {
                    period: period.key(),
                    label: label.to_string(),
                    login_id: login_id.map(str::to_string),
                    total,
                    tier: total.map(|amount| agency_tier(amount).value()),
                }
            })
            .collect()
    }

    pub fn report_data(&self, label: &str, login_id: Option<&str>) -> ReportData {
        ReportData::new(
            self.run_id.to_string(),
            self.selected,
            self.roster.len(),
            &self.table,
            self.agency_summaries(label, login_id),
            self.warnings.iter().map(|w| w.to_string()).collect(),
        )
    }
}

pub struct Pipeline<R, L> {
    revenue: R,
    ledgers: L,
    options: PipelineOptions,
}

impl<R, L> Pipeline<R, L>
where
    R: RevenueSource,
    L: LedgerSource,
{
    pub fn new(revenue: R, ledgers: L, options: PipelineOptions) -> Self {
        Self {
            revenue,
            ledgers,
            options,
        }
    }

    pub fn revenue_source(&self) -> &R {
        &self.revenue
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// 名簿を取得してから実行
    pub async fn run_from_source<S: RosterSource + ?Sized>(
        &self,
        roster_source: &S,
        selected: Period,
    ) -> Result<RunOutcome, PipelineError> {
        let roster = roster_source
            .load_roster()
            .await
            .map_err(PipelineError::RosterUnavailable)?;
        self.run(roster, selected).await
    }

    pub async fn run(&self, roster: Roster, selected: Period) -> Result<RunOutcome, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, period = %selected);

        async move {
            if roster.is_empty() {
                return Err(PipelineError::EmptyRoster);
            }
            info!(talents = roster.len(), "🚀 Run started");

            let resolutions = self.resolve_all(&roster, selected).await;
            let mut warnings: Vec<RunWarning> = roster
                .talents
                .iter()
                .zip(&resolutions)
                .filter_map(|(talent, resolution)| {
                    resolution.warning.clone().map(|warning| RunWarning::Resolution {
                        room_id: talent.room_id.clone(),
                        warning,
                    })
                })
                .collect();

            let revenue = self.fetch_revenue(&resolutions, &mut warnings).await?;

            let plans: Vec<TalentPeriods<'_>> = roster
                .talents
                .iter()
                .zip(&resolutions)
                .map(|(talent, resolution)| TalentPeriods {
                    talent,
                    periods: &resolution.periods,
                })
                .collect();
            let table = assemble(&plans, |period: &Period| revenue.get(period));
            let assembly_warnings: Vec<RunWarning> = table
                .warnings
                .iter()
                .filter(|warning| !fetch_already_reported(&warnings, warning))
                .cloned()
                .map(RunWarning::Assembly)
                .collect();
            warnings.extend(assembly_warnings);

            info!(
                rows = table.len(),
                errors = table.error_count(),
                warnings = warnings.len(),
                "🏁 Run finished"
            );

            Ok(RunOutcome {
                run_id,
                selected,
                resolutions,
                revenue,
                table,
                warnings,
                roster,
            })
        }
        .instrument(span)
        .await
    }

    /// 全ライバーの繰越判定（結果は名簿順）
    async fn resolve_all(&self, roster: &Roster, selected: Period) -> Vec<Resolution> {
        let concurrency = self.options.ledger_concurrency.max(1);

        let mut resolved: Vec<(usize, Resolution)> = stream::iter(roster.talents.iter().enumerate())
            .map(|(index, talent)| async move { (index, self.resolve_talent(talent, selected).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        resolved.sort_by_key(|(index, _)| *index);
        resolved.into_iter().map(|(_, resolution)| resolution).collect()
    }

    async fn resolve_talent(&self, talent: &Talent, selected: Period) -> Resolution {
        let Some(file) = talent.history_file_id.as_deref() else {
            warn!(room_id = %talent.room_id, "⚠️ No history file; processing selected period only");
            return Resolution::single(selected, ResolutionWarning::NoHistoryFile);
        };

        match self.ledgers.fetch_ledger(file).await {
            Ok(ledger) => resolve(&ledger, selected),
            Err(e) => {
                warn!(room_id = %talent.room_id, file, "⚠️ History ledger unavailable: {}", e);
                Resolution::single(
                    selected,
                    ResolutionWarning::LedgerUnavailable {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }

    /// 対象月の和集合について、種別ごとに1回ずつ売上を取得
    async fn fetch_revenue(
        &self,
        resolutions: &[Resolution],
        warnings: &mut Vec<RunWarning>,
    ) -> Result<BTreeMap<Period, PeriodRevenue>, PipelineError> {
        let mut periods: Vec<Period> = resolutions
            .iter()
            .flat_map(|r| r.periods.iter().copied())
            .collect();
        periods.sort_unstable_by(|a, b| b.cmp(a));
        periods.dedup();

        let mut revenue = BTreeMap::new();
        for period in periods {
            let timestamp = period.to_timestamp(&self.options.timezone)?;
            let mut tables = PeriodRevenue::default();

            for category in RevenueCategory::ALL {
                match self.revenue.fetch(timestamp, category).await {
                    Ok(table) => tables.insert(table),
                    Err(FetchError::AuthExpired) => {
                        tracing::error!(%period, %category, "🔒 Organizer session expired; aborting run");
                        return Err(PipelineError::AuthExpired);
                    }
                    Err(e) => {
                        warn!(%period, %category, "⚠️ Revenue fetch failed: {}", e);
                        warnings.push(RunWarning::RevenueUnavailable {
                            period,
                            category,
                            reason: e.to_string(),
                        });
                    }
                }
            }

            revenue.insert(period, tables);
        }

        Ok(revenue)
    }
}

/// 取得失敗として報告済みの種別は、組み立て時の欠落警告を重ねて出さない
fn fetch_already_reported(warnings: &[RunWarning], warning: &AssemblyWarning) -> bool {
    let AssemblyWarning::CategoryUnavailable { period, category } = warning else {
        return false;
    };
    warnings.iter().any(|reported| {
        matches!(
            reported,
            RunWarning::RevenueUnavailable { period: p, category: c, .. }
                if p == period && c == category
        )
    })
}
