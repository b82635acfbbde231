use super::{ExportConfig, ExportError, ExportableRow, FormatHandler, ReportData, COLUMN_HEADERS};
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook, Worksheet, XlsxError};

/// Excel形式エクスポーター
pub struct ExcelExporter {
    summary_sheet: bool,
    cell_formatting: bool,
}

/// 明細シートで使う書式一式
struct RowFormats {
    header: Format,
    error: Format,
    no_sales: Format,
    carry_over: Format,
    plain: Format,
}

impl RowFormats {
    fn new(cell_formatting: bool) -> Self {
        if !cell_formatting {
            return Self {
                header: Format::new().set_bold(),
                error: Format::new(),
                no_sales: Format::new(),
                carry_over: Format::new(),
                plain: Format::new(),
            };
        }

        Self {
            header: Format::new()
                .set_bold()
                .set_background_color(Color::RGB(0x4472C4))
                .set_font_color(Color::White)
                .set_border(FormatBorder::Thin),
            error: Format::new()
                .set_background_color(Color::RGB(0xFFC7CE))
                .set_font_color(Color::RGB(0x9C0006))
                .set_border(FormatBorder::Thin),
            no_sales: Format::new()
                .set_font_color(Color::RGB(0x808080))
                .set_border(FormatBorder::Thin),
            carry_over: Format::new()
                .set_background_color(Color::RGB(0xFFEB9C))
                .set_border(FormatBorder::Thin),
            plain: Format::new().set_border(FormatBorder::Thin),
        }
    }

    fn for_row(&self, row: &ExportableRow) -> &Format {
        if row.no_sales {
            &self.no_sales
        } else if row.is_carry_over {
            &self.carry_over
        } else {
            &self.plain
        }
    }
}

/// 支払額列の位置
const PAYOUT_COLUMN: u16 = 9;
const PAYOUT_STATUS_COLUMN: u16 = 10;

impl ExcelExporter {
    pub fn new() -> Self {
        Self {
            summary_sheet: true,
            cell_formatting: true,
        }
    }

    pub fn with_summary_sheet(mut self, summary_sheet: bool) -> Self {
        self.summary_sheet = summary_sheet;
        self
    }

    pub fn with_cell_formatting(mut self, cell_formatting: bool) -> Self {
        self.cell_formatting = cell_formatting;
        self
    }

    fn create_workbook(&self, data: &ReportData, config: &ExportConfig) -> Result<Vec<u8>, ExportError> {
        let mut workbook = Workbook::new();
        let formats = RowFormats::new(self.cell_formatting);

        self.create_detail_sheet(&mut workbook, data, config, &formats)?;

        if self.summary_sheet {
            self.create_agency_sheet(&mut workbook, data, &formats)?;
        }

        if config.include_metadata {
            self.create_metadata_sheet(&mut workbook, data, &formats)?;
        }

        let buffer = workbook
            .save_to_buffer()
            .map_err(|e| ExportError::Serialization(format!("Excel generation failed: {}", e)))?;

        Ok(buffer)
    }

    /// 明細シート
    fn create_detail_sheet(
        &self,
        workbook: &mut Workbook,
        data: &ReportData,
        config: &ExportConfig,
        formats: &RowFormats,
    ) -> Result<(), ExportError> {
        let worksheet = workbook.add_worksheet().set_name("明細")?;

        for (col, header) in COLUMN_HEADERS.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, *header, &formats.header)?;
        }

        for (idx, row) in config.filter_rows(data).into_iter().enumerate() {
            let row_idx = (idx + 1) as u32;
            self.write_detail_row(worksheet, row_idx, row, formats)?;
        }

        worksheet.set_freeze_panes(1, 0)?;
        for col in 0..COLUMN_HEADERS.len() {
            worksheet.set_column_width(col as u16, Self::column_width(col))?;
        }

        Ok(())
    }

    fn write_detail_row(
        &self,
        worksheet: &mut Worksheet,
        row_idx: u32,
        row: &ExportableRow,
        formats: &RowFormats,
    ) -> Result<(), XlsxError> {
        let format = formats.for_row(row);
        let text = |value: &Option<String>| value.clone().unwrap_or_default();

        worksheet.write_string_with_format(row_idx, 0, &row.room_id, format)?;
        worksheet.write_string_with_format(row_idx, 1, &row.line_text, format)?;
        worksheet.write_string_with_format(row_idx, 2, &row.period, format)?;
        worksheet.write_string_with_format(row_idx, 3, text(&row.payment_month), format)?;
        worksheet.write_string_with_format(row_idx, 4, &row.category_label, format)?;
        worksheet.write_number_with_format(row_idx, 5, row.amount as f64, format)?;
        worksheet.write_string_with_format(row_idx, 6, &row.individual_rank, format)?;
        worksheet.write_string_with_format(row_idx, 7, &row.agency_tier, format)?;
        worksheet.write_string_with_format(row_idx, 8, &row.rate_label, format)?;

        // 計算エラーはセルを強調して 0 を表示
        let payout_format = if row.is_error() { &formats.error } else { format };
        match row.payout {
            Some(value) => {
                worksheet.write_number_with_format(row_idx, PAYOUT_COLUMN, value as f64, payout_format)?
            }
            None => worksheet.write_blank(row_idx, PAYOUT_COLUMN, payout_format)?,
        };
        worksheet.write_string_with_format(
            row_idx,
            PAYOUT_STATUS_COLUMN,
            &row.payout_status,
            payout_format,
        )?;

        worksheet.write_string_with_format(row_idx, 11, text(&row.tax_marker), format)?;
        worksheet.write_string_with_format(row_idx, 12, text(&row.history_file_id), format)?;
        worksheet.write_string_with_format(row_idx, 13, text(&row.account_id), format)?;
        worksheet.write_boolean_with_format(row_idx, 14, row.is_carry_over, format)?;
        worksheet.write_string_with_format(row_idx, 15, &row.processing_key, format)?;

        Ok(())
    }

    /// 事務所合計シート
    fn create_agency_sheet(
        &self,
        workbook: &mut Workbook,
        data: &ReportData,
        formats: &RowFormats,
    ) -> Result<(), ExportError> {
        let worksheet = workbook.add_worksheet().set_name("事務所合計")?;

        for (col, header) in ["配信月", "名称", "ログインID", "全体分配額", "MKランク"]
            .iter()
            .enumerate()
        {
            worksheet.write_string_with_format(0, col as u16, *header, &formats.header)?;
        }

        for (idx, agency) in data.agency.iter().enumerate() {
            let row_idx = (idx + 1) as u32;
            worksheet.write_string(row_idx, 0, &agency.period)?;
            worksheet.write_string(row_idx, 1, &agency.label)?;
            worksheet.write_string(row_idx, 2, agency.login_id.clone().unwrap_or_default())?;
            match agency.total {
                Some(total) => worksheet.write_number(row_idx, 3, total as f64)?,
                None => worksheet.write_string_with_format(row_idx, 3, "取得失敗", &formats.error)?,
            };
            match agency.tier {
                Some(tier) => worksheet.write_number(row_idx, 4, tier as f64)?,
                None => worksheet.write_string(row_idx, 4, "-")?,
            };
        }

        worksheet.set_column_width(1, 16)?;
        worksheet.set_column_width(3, 14)?;

        Ok(())
    }

    /// メタデータシート
    fn create_metadata_sheet(
        &self,
        workbook: &mut Workbook,
        data: &ReportData,
        formats: &RowFormats,
    ) -> Result<(), ExportError> {
        let worksheet = workbook.add_worksheet().set_name("Metadata")?;
        let metadata = &data.metadata;

        let entries = vec![
            ("実行ID", metadata.run_id.clone()),
            ("選択月", metadata.selected_period.clone()),
            (
                "作成日時",
                metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            ),
            ("対象ライバー数", metadata.talent_count.to_string()),
            ("明細行数", metadata.row_count.to_string()),
            ("計算エラー数", metadata.error_count.to_string()),
            ("支払想定額合計", data.total_payout().to_string()),
            ("バージョン", metadata.srpay_version.clone()),
        ];

        worksheet.write_string_with_format(0, 0, "項目", &formats.header)?;
        worksheet.write_string_with_format(0, 1, "値", &formats.header)?;

        for (row, (label, value)) in entries.iter().enumerate() {
            let row_idx = (row + 1) as u32;
            worksheet.write_string(row_idx, 0, *label)?;
            worksheet.write_string(row_idx, 1, value)?;
        }

        let warnings_row = (entries.len() + 2) as u32;
        worksheet.write_string_with_format(warnings_row, 0, "警告", &formats.header)?;
        for (idx, warning) in metadata.warnings.iter().enumerate() {
            worksheet.write_string(warnings_row + 1 + idx as u32, 0, warning)?;
        }

        worksheet.set_column_width(0, 18)?;
        worksheet.set_column_width(1, 40)?;

        Ok(())
    }

    fn column_width(col: usize) -> f64 {
        match col {
            0 => 12.0,      // ルームID
            1 => 36.0,      // 明細
            2 | 3 => 14.0,  // 配信月・支払月
            4 => 20.0,      // データ種別
            5 | 9 => 12.0,  // 金額
            10 => 14.0,     // payout_status
            12 | 13 => 18.0,
            15 => 32.0,     // 処理キー
            _ => 10.0,
        }
    }
}

impl FormatHandler for ExcelExporter {
    fn export(&self, data: &ReportData, config: &ExportConfig) -> Result<Vec<u8>, ExportError> {
        self.create_workbook(data, config)
    }

    fn file_extension(&self) -> &str {
        "xlsx"
    }
}

impl Default for ExcelExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl From<XlsxError> for ExportError {
    fn from(error: XlsxError) -> Self {
        ExportError::Serialization(format!("Excel error: {}", error))
    }
}
