use super::{ExportConfig, ExportError, ExportableRow, FormatHandler, ReportData, COLUMN_HEADERS};

/// 表計算ソフトで文字化けしないよう先頭に付ける BOM
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// CSV形式エクスポーター
pub struct CsvExporter {
    delimiter: char,
    include_headers: bool,
    with_bom: bool,
}

impl CsvExporter {
    pub fn new() -> Self {
        Self {
            delimiter: ',',
            include_headers: true,
            with_bom: true,
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_headers(mut self, include_headers: bool) -> Self {
        self.include_headers = include_headers;
        self
    }

    pub fn with_bom(mut self, with_bom: bool) -> Self {
        self.with_bom = with_bom;
        self
    }

    fn delimiter_byte(&self) -> Result<u8, ExportError> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| ExportError::InvalidData {
                message: format!("delimiter must be ASCII: {:?}", self.delimiter),
            })
    }

    /// 明細行をCSVレコードに変換
    fn row_to_record(&self, row: &ExportableRow) -> Vec<String> {
        vec![
            row.room_id.clone(),
            row.line_text.clone(),
            row.period.clone(),
            row.payment_month.clone().unwrap_or_default(),
            row.category_label.clone(),
            row.amount.to_string(),
            row.individual_rank.clone(),
            row.agency_tier.clone(),
            row.rate_label.clone(),
            row.payout.map_or(String::new(), |p| p.to_string()),
            row.payout_status.clone(),
            row.tax_marker.clone().unwrap_or_default(),
            row.history_file_id.clone().unwrap_or_default(),
            row.account_id.clone().unwrap_or_default(),
            row.is_carry_over.to_string(),
            row.processing_key.clone(),
        ]
    }

    /// メタデータセクションを生成
    fn generate_metadata_section(&self, data: &ReportData) -> String {
        let d = self.delimiter;
        let mut metadata_lines = vec![
            "# Metadata".to_string(),
            format!("# Run ID{d}{}", data.metadata.run_id),
            format!("# Selected Period{d}{}", data.metadata.selected_period),
            format!("# Talents{d}{}", data.metadata.talent_count),
            format!("# Rows{d}{}", data.metadata.row_count),
            format!("# Errors{d}{}", data.metadata.error_count),
        ];

        for agency in &data.agency {
            metadata_lines.push(format!(
                "# Agency Total {}{d}{}{d}{}",
                agency.period,
                agency.total.map_or("-".to_string(), |t| t.to_string()),
                agency.tier.map_or("-".to_string(), |t| format!("MK{t}")),
            ));
        }

        metadata_lines.push(format!(
            "# Export Time{d}{}",
            data.metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        metadata_lines.push(String::new());

        metadata_lines.join("\n")
    }
}

impl FormatHandler for CsvExporter {
    fn export(&self, data: &ReportData, config: &ExportConfig) -> Result<Vec<u8>, ExportError> {
        let mut csv_content = Vec::new();

        if self.with_bom {
            csv_content.extend_from_slice(UTF8_BOM);
        }

        if config.include_metadata {
            csv_content.extend_from_slice(self.generate_metadata_section(data).as_bytes());
            csv_content.push(b'\n');
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter_byte()?)
            .from_writer(csv_content);

        let map_err = |e: csv::Error| ExportError::Serialization(e.to_string());

        if self.include_headers {
            writer.write_record(COLUMN_HEADERS).map_err(map_err)?;
        }

        for row in config.filter_rows(data) {
            writer.write_record(self.row_to_record(row)).map_err(map_err)?;
        }

        writer
            .into_inner()
            .map_err(|e| ExportError::Serialization(e.to_string()))
    }

    fn file_extension(&self) -> &str {
        "csv"
    }
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self::new()
    }
}
