//! インボイス登録フラグの正規化
//!
//! 名簿の「インボイス」欄は真偽値とは限らず、空欄・`nan`・`0` などの文字列でも届きます。
//! 3つの支払額計算はすべてこのモジュールを通して同じ規則で判定します。

use serde::{Deserialize, Serialize};

/// 非登録とみなすトークン（小文字・前後空白除去後に比較）
pub const FALSY_TOKENS: [&str; 6] = ["", "false", "0", "nan", "none", "n/a"];

/// 正規化前のインボイス欄
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaxMarker {
    Flag(bool),
    Text(String),
    Missing,
}

impl TaxMarker {
    /// 非登録トークンに該当すれば `false`、それ以外はすべて `true`
    pub fn is_registered(&self) -> bool {
        match self {
            TaxMarker::Flag(flag) => *flag,
            TaxMarker::Text(text) => !is_falsy_token(text),
            TaxMarker::Missing => false,
        }
    }
}

pub fn is_falsy_token(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    FALSY_TOKENS.contains(&normalized.as_str())
}

impl From<bool> for TaxMarker {
    fn from(value: bool) -> Self {
        TaxMarker::Flag(value)
    }
}

impl From<&str> for TaxMarker {
    fn from(value: &str) -> Self {
        TaxMarker::Text(value.to_string())
    }
}

impl From<String> for TaxMarker {
    fn from(value: String) -> Self {
        TaxMarker::Text(value)
    }
}

impl<T: Into<TaxMarker>> From<Option<T>> for TaxMarker {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(TaxMarker::Missing)
    }
}

/// 任意の表現からインボイス登録有無を判定
pub fn normalize_tax_flag(marker: impl Into<TaxMarker>) -> bool {
    marker.into().is_registered()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_falsy_tokens_are_unregistered() {
        for input in ["False", "0", "", "nan", "NaN", " none ", "n/a", "N/A"] {
            assert!(!normalize_tax_flag(input), "{input:?} should be unregistered");
        }
        assert!(!normalize_tax_flag(None::<&str>));
        assert!(!normalize_tax_flag(false));
    }

    #[test]
    fn test_other_values_are_registered() {
        for input in ["yes", "1", "True", "登録済", "T1234567890123", "no"] {
            assert!(normalize_tax_flag(input), "{input:?} should be registered");
        }
        assert!(normalize_tax_flag(true));
        assert!(normalize_tax_flag(Some("〇".to_string())));
    }
}
