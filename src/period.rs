//! 配信月 (Period) ユーティリティ
//!
//! 1つの配信月を3通りの表現で扱います。
//!
//! - 表示ラベル: `2025年10月分`
//! - 正規キー: `2025/10`
//! - ネットワーク用タイムスタンプ: 業務タイムゾーンにおける月初 0 時の UNIX 秒
//!
//! どの表現からでも他の表現へ欠損なく変換でき、往復しても値が変わりません。

use chrono::{DateTime, Datelike, NaiveDate, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 業務タイムゾーン（オーガナイザー管理画面の月境界）
pub const BUSINESS_TZ: Tz = chrono_tz::Asia::Tokyo;

/// 支払月は配信月の2か月後
pub const PAYMENT_LAG_MONTHS: i32 = 2;

const MIN_YEAR: i32 = 1970;
const MAX_YEAR: i32 = 9999;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeriodError {
    #[error("Invalid period: {input}")]
    InvalidPeriod { input: String },

    #[error("Period {period} is outside the selectable range {oldest} - {newest}")]
    OutOfRange {
        period: Period,
        oldest: Period,
        newest: Period,
    },
}

impl PeriodError {
    fn invalid(input: impl Into<String>) -> Self {
        Self::InvalidPeriod {
            input: input.into(),
        }
    }
}

/// 暦月。`(year, month)` の辞書順で比較されます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    /// 初回配信月 (月選択の下限)
    pub const PLATFORM_INCEPTION: Period = Period {
        year: 2023,
        month: 10,
    };

    pub fn new(year: i32, month: u32) -> Result<Self, PeriodError> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) || !(1..=12).contains(&month) {
            return Err(PeriodError::invalid(format!("{year}/{month}")));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// 正規キー `YYYY/MM`
    pub fn key(&self) -> String {
        format!("{:04}/{:02}", self.year, self.month)
    }

    /// 表示ラベル `YYYY年MM月分`
    pub fn label(&self) -> String {
        format!("{:04}年{:02}月分", self.year, self.month)
    }

    /// 明細表示用 `YYYY年MM月配信分`
    pub fn distribution_label(&self) -> String {
        format!("{:04}年{:02}月配信分", self.year, self.month)
    }

    /// `YYYY/MM` / `YYYY/M` / `YYYY-MM` / `YYYYMM` を受け付ける
    pub fn parse_key(input: &str) -> Result<Self, PeriodError> {
        let trimmed = input.trim();
        let (year, month) = match trimmed.split_once(['/', '-']) {
            Some((y, m)) => (y, m),
            None if trimmed.len() == 6 && trimmed.chars().all(|c| c.is_ascii_digit()) => {
                trimmed.split_at(4)
            }
            None => return Err(PeriodError::invalid(input)),
        };

        let year: i32 = year
            .trim()
            .parse()
            .map_err(|_| PeriodError::invalid(input))?;
        let month: u32 = month
            .trim()
            .parse()
            .map_err(|_| PeriodError::invalid(input))?;

        Self::new(year, month).map_err(|_| PeriodError::invalid(input))
    }

    /// `YYYY年MM月分` 形式のラベルを解析
    pub fn parse_label(input: &str) -> Result<Self, PeriodError> {
        let trimmed = input.trim();
        let rest = trimmed.strip_suffix('分').unwrap_or(trimmed);
        let rest = rest
            .strip_suffix('月')
            .ok_or_else(|| PeriodError::invalid(input))?;
        let (year, month) = rest
            .split_once('年')
            .ok_or_else(|| PeriodError::invalid(input))?;

        let year: i32 = year.parse().map_err(|_| PeriodError::invalid(input))?;
        let month: u32 = month.parse().map_err(|_| PeriodError::invalid(input))?;

        Self::new(year, month).map_err(|_| PeriodError::invalid(input))
    }

    /// キーとラベルのどちらでも受け付ける（CLIの月指定用）
    pub fn parse_any(input: &str) -> Result<Self, PeriodError> {
        Self::parse_key(input).or_else(|_| Self::parse_label(input))
    }

    pub fn from_date(date: NaiveDate) -> Result<Self, PeriodError> {
        Self::new(date.year(), date.month())
    }

    /// 月単位で前後に移動（年跨ぎ対応）
    pub fn shift(self, delta_months: i32) -> Result<Self, PeriodError> {
        let index = self.year as i64 * 12 + (self.month as i64 - 1) + delta_months as i64;
        let year = index.div_euclid(12);
        let month = index.rem_euclid(12) as u32 + 1;

        let year = i32::try_from(year).map_err(|_| PeriodError::invalid(self.key()))?;
        Self::new(year, month)
    }

    pub fn previous(self) -> Result<Self, PeriodError> {
        self.shift(-1)
    }

    /// 支払月（配信月 + 2か月）
    pub fn payment_period(self) -> Result<Self, PeriodError> {
        self.shift(PAYMENT_LAG_MONTHS)
    }

    /// 支払月の表示 `YYYY年MM月支払`
    pub fn payment_label(self) -> Result<String, PeriodError> {
        let payment = self.payment_period()?;
        Ok(format!("{:04}年{:02}月支払", payment.year, payment.month))
    }

    /// 業務タイムゾーンにおける月初 0 時の UNIX 秒
    pub fn to_timestamp(self, tz: &Tz) -> Result<i64, PeriodError> {
        tz.with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0)
            .earliest()
            .map(|dt| dt.timestamp())
            .ok_or_else(|| PeriodError::invalid(self.key()))
    }

    /// タイムスタンプが属する配信月
    pub fn from_timestamp(timestamp: i64, tz: &Tz) -> Result<Self, PeriodError> {
        let dt = tz
            .timestamp_opt(timestamp, 0)
            .single()
            .ok_or_else(|| PeriodError::invalid(timestamp.to_string()))?;
        Self::from_date(dt.date_naive())
    }

    /// 指定時刻を含む月
    pub fn containing(now: &DateTime<Tz>) -> Result<Self, PeriodError> {
        Self::from_date(now.date_naive())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}/{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_key(s)
    }
}

impl TryFrom<String> for Period {
    type Error = PeriodError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_key(&value)
    }
}

impl From<Period> for String {
    fn from(value: Period) -> Self {
        value.key()
    }
}

/// `YYYY/MM` をタイムスタンプに変換
pub fn to_timestamp(key: &str, tz: &Tz) -> Result<i64, PeriodError> {
    Period::parse_key(key)?.to_timestamp(tz)
}

/// `YYYY/MM` を月単位で移動した `YYYY/MM` を返す
pub fn shift_period(key: &str, delta_months: i32) -> Result<String, PeriodError> {
    Ok(Period::parse_key(key)?.shift(delta_months)?.key())
}

/// 月選択の範囲 (新しい月 → 古い月、両端を含む)
///
/// `Copy` なので何度でも走査し直せます。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodRange {
    newest: Period,
    oldest: Period,
}

impl PeriodRange {
    pub fn new(newest: Period, oldest: Period) -> Self {
        Self { newest, oldest }
    }

    pub fn iter(&self) -> PeriodIter {
        PeriodIter {
            next: (self.newest >= self.oldest).then_some(self.newest),
            oldest: self.oldest,
        }
    }

    pub fn newest(&self) -> Period {
        self.newest
    }

    pub fn oldest(&self) -> Period {
        self.oldest
    }

    pub fn contains(&self, period: &Period) -> bool {
        *period <= self.newest && *period >= self.oldest
    }

    pub fn is_empty(&self) -> bool {
        self.newest < self.oldest
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        let months = |p: Period| p.year as i64 * 12 + p.month as i64;
        (months(self.newest) - months(self.oldest) + 1) as usize
    }
}

impl IntoIterator for PeriodRange {
    type Item = Period;
    type IntoIter = PeriodIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for &PeriodRange {
    type Item = Period;
    type IntoIter = PeriodIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct PeriodIter {
    next: Option<Period>,
    oldest: Period,
}

impl Iterator for PeriodIter {
    type Item = Period;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.previous().ok().filter(|p| *p >= self.oldest);
        Some(current)
    }
}

/// `now` の月から初回配信月までを新しい順に列挙
pub fn enumerate_periods(
    start_year: i32,
    start_month: u32,
    now: &DateTime<Tz>,
) -> Result<PeriodRange, PeriodError> {
    let oldest = Period::new(start_year, start_month)?;
    let newest = Period::containing(now)?;
    Ok(PeriodRange::new(newest, oldest))
}

/// 選択された配信月が `inception` から `now` の月までに収まっているか確認
pub fn ensure_selectable(
    selected: Period,
    inception: Period,
    now: &DateTime<Tz>,
) -> Result<Period, PeriodError> {
    let range = enumerate_periods(inception.year(), inception.month(), now)?;
    if range.contains(&selected) {
        Ok(selected)
    } else {
        Err(PeriodError::OutOfRange {
            period: selected,
            oldest: range.oldest(),
            newest: range.newest(),
        })
    }
}

/// 月選択肢（ラベル・キー・タイムスタンプ）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthOption {
    pub label: String,
    pub key: String,
    pub timestamp: i64,
}

pub fn month_options(range: &PeriodRange, tz: &Tz) -> Result<Vec<MonthOption>, PeriodError> {
    range
        .iter()
        .map(|period| {
            Ok(MonthOption {
                label: period.label(),
                key: period.key(),
                timestamp: period.to_timestamp(tz)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(year: i32, month: u32) -> Period {
        Period::new(year, month).unwrap()
    }

    #[test]
    fn test_key_and_label_format() {
        let period = p(2025, 3);
        assert_eq!(period.key(), "2025/03");
        assert_eq!(period.label(), "2025年03月分");
        assert_eq!(period.distribution_label(), "2025年03月配信分");
        assert_eq!(format!("{}", period), "2025/03");
    }

    #[test]
    fn test_parse_key_variants() {
        assert_eq!(Period::parse_key("2025/10").unwrap(), p(2025, 10));
        assert_eq!(Period::parse_key("2025/9").unwrap(), p(2025, 9));
        assert_eq!(Period::parse_key(" 2025-09 ").unwrap(), p(2025, 9));
        assert_eq!(Period::parse_key("202509").unwrap(), p(2025, 9));
        assert_eq!("2024/01".parse::<Period>().unwrap(), p(2024, 1));
    }

    #[test]
    fn test_parse_key_rejects_malformed_input() {
        for input in ["", "2025", "2025/13", "2025/0", "abcd/ef", "2025/10/01", "25/1x"] {
            let result = Period::parse_key(input);
            assert!(
                matches!(result, Err(PeriodError::InvalidPeriod { .. })),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn test_label_round_trip() {
        let period = p(2023, 10);
        assert_eq!(Period::parse_label(&period.label()).unwrap(), period);
        assert_eq!(Period::parse_any("2023年10月分").unwrap(), period);
        assert_eq!(Period::parse_any("2023/10").unwrap(), period);
        assert!(Period::parse_label("2023-10").is_err());
    }

    #[test]
    fn test_to_timestamp_known_values() {
        assert_eq!(p(2025, 10).to_timestamp(&BUSINESS_TZ).unwrap(), 1_759_244_400);
        assert_eq!(p(2023, 10).to_timestamp(&BUSINESS_TZ).unwrap(), 1_696_086_000);
        assert_eq!(to_timestamp("2024/01", &BUSINESS_TZ).unwrap(), 1_704_034_800);
        assert!(to_timestamp("2024/13", &BUSINESS_TZ).is_err());
    }

    #[test]
    fn test_timestamp_round_trip_for_supported_range() {
        let range = PeriodRange::new(p(2035, 12), Period::PLATFORM_INCEPTION);
        for period in range {
            let ts = period.to_timestamp(&BUSINESS_TZ).unwrap();
            let back = Period::from_timestamp(ts, &BUSINESS_TZ).unwrap();
            assert_eq!(back, period);
            assert_eq!(back.to_timestamp(&BUSINESS_TZ).unwrap(), ts);
            assert_eq!(Period::parse_key(&period.key()).unwrap(), period);
        }
    }

    #[test]
    fn test_shift_with_year_rollover() {
        assert_eq!(p(2025, 11).shift(2).unwrap(), p(2026, 1));
        assert_eq!(p(2025, 1).shift(-1).unwrap(), p(2024, 12));
        assert_eq!(p(2025, 3).shift(-15).unwrap(), p(2023, 12));
        assert_eq!(p(2025, 3).shift(0).unwrap(), p(2025, 3));
        assert_eq!(shift_period("2025/12", 2).unwrap(), "2026/02");
        assert!(p(1970, 1).shift(-1).is_err());
    }

    #[test]
    fn test_payment_label() {
        assert_eq!(p(2025, 10).payment_label().unwrap(), "2025年12月支払");
        assert_eq!(p(2025, 12).payment_label().unwrap(), "2026年02月支払");
    }

    #[test]
    fn test_enumerate_periods_descending_and_restartable() {
        let now = BUSINESS_TZ.with_ymd_and_hms(2024, 2, 15, 12, 0, 0).unwrap();
        let range = enumerate_periods(2023, 10, &now).unwrap();

        let first: Vec<String> = range.iter().map(|p| p.key()).collect();
        assert_eq!(first, vec!["2024/02", "2024/01", "2023/12", "2023/11", "2023/10"]);

        let second: Vec<Period> = range.into_iter().collect();
        assert_eq!(second.len(), 5);
        assert_eq!(range.len(), 5);
        assert!(range.contains(&p(2023, 12)));
        assert!(!range.contains(&p(2023, 9)));
    }

    #[test]
    fn test_enumerate_periods_uses_business_timezone() {
        // 2024-02-29 16:00 UTC は JST では 3月1日
        let now = chrono::Utc
            .with_ymd_and_hms(2024, 2, 29, 16, 0, 0)
            .unwrap()
            .with_timezone(&BUSINESS_TZ);
        let range = enumerate_periods(2024, 1, &now).unwrap();
        assert_eq!(range.iter().next(), Some(p(2024, 3)));
    }

    #[test]
    fn test_enumerate_periods_before_inception_is_empty() {
        let now = BUSINESS_TZ.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap();
        let range = enumerate_periods(2023, 10, &now).unwrap();
        assert!(range.is_empty());
        assert_eq!(range.iter().count(), 0);
    }

    #[test]
    fn test_ensure_selectable_bounds() {
        let now = BUSINESS_TZ.with_ymd_and_hms(2025, 10, 15, 12, 0, 0).unwrap();
        let inception = Period::PLATFORM_INCEPTION;

        assert_eq!(ensure_selectable(p(2025, 10), inception, &now), Ok(p(2025, 10)));
        assert_eq!(ensure_selectable(p(2023, 10), inception, &now), Ok(p(2023, 10)));

        assert_eq!(
            ensure_selectable(p(2025, 11), inception, &now),
            Err(PeriodError::OutOfRange {
                period: p(2025, 11),
                oldest: p(2023, 10),
                newest: p(2025, 10),
            })
        );
        assert!(matches!(
            ensure_selectable(p(2023, 9), inception, &now),
            Err(PeriodError::OutOfRange { .. })
        ));
        assert!(ensure_selectable(p(2019, 1), inception, &now).is_err());
    }

    #[test]
    fn test_month_options() {
        let range = PeriodRange::new(p(2025, 10), p(2025, 9));
        let options = month_options(&range, &BUSINESS_TZ).unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].label, "2025年10月分");
        assert_eq!(options[0].timestamp, 1_759_244_400);
        assert_eq!(options[1].key, "2025/09");
        assert_eq!(options[1].timestamp, 1_756_652_400);
    }

    #[test]
    fn test_serde_as_key_string() {
        let json = serde_json::to_string(&p(2025, 8)).unwrap();
        assert_eq!(json, "\"2025/08\"");
        let back: Period = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p(2025, 8));
        assert!(serde_json::from_str::<Period>("\"2025/99\"").is_err());
    }
}
