//! Source file decoding for the talent roster and per-talent history ledgers.
//!
//! Both sources arrive as raw bytes (downloaded by [`crate::api::sources`]) and are
//! decoded here without any network access.

pub mod ledger;
pub mod roster;

use thiserror::Error;

pub use ledger::{parse_ledger, LedgerColumns};
pub use roster::{decode_text, parse_roster, RosterColumns};

/// Errors raised while obtaining or decoding a roster or ledger.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The resource could not be downloaded
    #[error("{source_name} unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// A required column is missing from the header
    #[error("Missing required column '{column}' in {source_name}")]
    MissingColumn { column: String, source_name: String },

    /// The bytes could not be decoded with any supported encoding
    #[error("Failed to decode {source_name}: {reason}")]
    Decode { source_name: String, reason: String },

    /// Spreadsheet parsing error
    #[error("Workbook error: {0}")]
    Workbook(String),

    /// Delimited text parsing error
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),
}

impl SourceError {
    pub fn unavailable(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn missing_column(column: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
            source_name: source_name.into(),
        }
    }
}

/// Normalizes a header cell: trims whitespace and removes embedded line breaks.
pub(crate) fn normalize_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect::<String>()
        .trim_start_matches('\u{feff}')
        .trim()
        .to_string()
}

/// Finds the first header matching any of `aliases`.
pub(crate) fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| headers.iter().position(|header| header == alias))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  ルームID "), "ルームID");
        assert_eq!(normalize_header("支払/\n繰越"), "支払/繰越");
        assert_eq!(normalize_header("\u{feff}ルームID"), "ルームID");
    }

    #[test]
    fn test_find_column_prefers_first_alias() {
        let headers = vec!["room_id".to_string(), "ルームID".to_string()];
        assert_eq!(find_column(&headers, &["ルームID", "room_id"]), Some(1));
        assert_eq!(find_column(&headers, &["missing"]), None);
    }
}
