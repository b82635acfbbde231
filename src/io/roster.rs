//! Talent roster (支払対象ライバー) decoding.
//!
//! The roster is a delimited text file maintained by the agency. It may be saved
//! with a UTF-8 byte-order mark, as plain UTF-8, or as Shift_JIS by spreadsheet tools.

use super::{find_column, normalize_header, SourceError};
use crate::analytics::tax::normalize_tax_flag;
use crate::models::{RoomId, Roster, Talent};
use std::collections::HashSet;
use tracing::{info, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub const ROOM_ID_ALIASES: [&str; 2] = ["ルームID", "room_id"];
pub const HISTORY_FILE_ALIASES: [&str; 2] = ["ファイル名", "history_file_id"];
pub const TAX_MARKER_ALIASES: [&str; 2] = ["インボイス", "tax_registration_marker"];

/// Decodes roster bytes, trying UTF-8 with BOM, UTF-8, then Shift_JIS.
///
/// Returns the text and the name of the encoding that succeeded.
pub fn decode_text(bytes: &[u8], source_name: &str) -> Result<(String, &'static str), SourceError> {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        if let Ok(text) = std::str::from_utf8(rest) {
            return Ok((text.to_string(), "UTF-8 (BOM)"));
        }
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok((text.to_string(), "UTF-8"));
    }

    let (text, _, had_errors) = encoding_rs::SHIFT_JIS.decode(bytes);
    if had_errors {
        return Err(SourceError::Decode {
            source_name: source_name.to_string(),
            reason: "not valid UTF-8 or Shift_JIS".to_string(),
        });
    }
    Ok((text.into_owned(), "Shift_JIS"))
}

/// Column positions resolved from the roster header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterColumns {
    pub room_id: usize,
    pub history_file_id: Option<usize>,
    pub tax_marker: Option<usize>,
}

impl RosterColumns {
    pub fn resolve(headers: &[String], source_name: &str) -> Result<Self, SourceError> {
        let room_id = find_column(headers, &ROOM_ID_ALIASES)
            .ok_or_else(|| SourceError::missing_column(ROOM_ID_ALIASES[0], source_name))?;

        Ok(Self {
            room_id,
            history_file_id: find_column(headers, &HISTORY_FILE_ALIASES),
            tax_marker: find_column(headers, &TAX_MARKER_ALIASES),
        })
    }
}

/// Parses roster bytes into the list of managed talents.
///
/// Rows with a blank room id are skipped, and duplicate room ids keep the first row.
/// A roster without a tax-registration column treats every talent as unregistered.
pub fn parse_roster(bytes: &[u8], source_name: &str) -> Result<Roster, SourceError> {
    let (text, encoding) = decode_text(bytes, source_name)?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
    let columns = RosterColumns::resolve(&headers, source_name)?;

    if columns.tax_marker.is_none() {
        warn!(
            source = source_name,
            "⚠️ Roster has no '{}' column; treating every talent as unregistered",
            TAX_MARKER_ALIASES[0]
        );
    }

    let cell = |record: &csv::StringRecord, index: Option<usize>| -> Option<String> {
        index
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let mut seen = HashSet::new();
    let mut talents = Vec::new();

    for record in reader.records() {
        let record = record?;

        let Some(room_id) = cell(&record, Some(columns.room_id)) else {
            continue;
        };
        let room_id = RoomId::new(room_id);
        if !seen.insert(room_id.clone()) {
            warn!(%room_id, "⚠️ Duplicate roster row ignored");
            continue;
        }

        let tax_marker = cell(&record, columns.tax_marker);
        let tax_registered = normalize_tax_flag(tax_marker.as_deref());

        talents.push(Talent {
            room_id,
            history_file_id: cell(&record, columns.history_file_id),
            tax_marker,
            tax_registered,
        });
    }

    let roster = Roster {
        talents,
        tax_column_present: columns.tax_marker.is_some(),
    };

    info!(
        source = source_name,
        encoding,
        talents = roster.len(),
        registered = roster.registered_count(),
        "📋 Roster loaded"
    );

    Ok(roster)
}
