use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

pub mod csv_exporter;
pub mod excel_exporter;
pub mod json_exporter;
pub mod report_data;

pub use csv_exporter::CsvExporter;
pub use excel_exporter::ExcelExporter;
pub use json_exporter::JsonExporter;
pub use report_data::{AgencySummary, ExportableRow, ReportData, ReportMetadata};

/// エクスポート形式
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Excel,
}

impl ExportFormat {
    pub fn file_extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Excel => "xlsx",
        }
    }

    /// 拡張子から形式を推定
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            "xlsx" => Some(ExportFormat::Excel),
            _ => None,
        }
    }
}

/// エクスポートエラー
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported format: {format:?}")]
    UnsupportedFormat { format: ExportFormat },

    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    #[error("File access error: {path}")]
    FileAccess { path: String },
}

/// エクスポート設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub format: ExportFormat,
    pub include_metadata: bool,
    /// 売上なし（0円）の行も出力する
    pub include_no_sales: bool,
    pub carry_over_only: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::Csv,
            include_metadata: false,
            include_no_sales: true,
            carry_over_only: false,
        }
    }
}

impl ExportConfig {
    /// 設定に合う行だけを順序を保って返す
    pub fn filter_rows<'a>(&self, data: &'a ReportData) -> Vec<&'a ExportableRow> {
        data.rows
            .iter()
            .filter(|row| self.include_no_sales || !row.no_sales)
            .filter(|row| !self.carry_over_only || row.is_carry_over)
            .collect()
    }
}

/// フォーマットハンドラートレイト
pub trait FormatHandler: Send + Sync {
    fn export(&self, data: &ReportData, config: &ExportConfig) -> Result<Vec<u8>, ExportError>;
    fn file_extension(&self) -> &str;
}

/// エクスポートマネージャー
pub struct ExportManager {
    format_handlers: HashMap<ExportFormat, Box<dyn FormatHandler>>,
}

impl ExportManager {
    pub fn new() -> Self {
        let mut manager = Self {
            format_handlers: HashMap::new(),
        };

        manager.register_handler(ExportFormat::Csv, Box::new(CsvExporter::new()));
        manager.register_handler(ExportFormat::Json, Box::new(JsonExporter::new()));
        manager.register_handler(ExportFormat::Excel, Box::new(ExcelExporter::new()));

        manager
    }

    pub fn register_handler(&mut self, format: ExportFormat, handler: Box<dyn FormatHandler>) {
        self.format_handlers.insert(format, handler);
    }

    pub fn export(&self, data: &ReportData, config: &ExportConfig) -> Result<Vec<u8>, ExportError> {
        let handler =
            self.format_handlers
                .get(&config.format)
                .ok_or(ExportError::UnsupportedFormat {
                    format: config.format,
                })?;

        handler.export(data, config)
    }

    /// エクスポートしてファイルに書き出す
    pub fn export_to_file(
        &self,
        data: &ReportData,
        config: &ExportConfig,
        path: &Path,
    ) -> Result<usize, ExportError> {
        let bytes = self.export(data, config)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|_| ExportError::FileAccess {
                path: parent.display().to_string(),
            })?;
        }
        std::fs::write(path, &bytes)?;

        tracing::info!(
            path = %path.display(),
            bytes = bytes.len(),
            format = ?config.format,
            "💾 Report exported"
        );
        Ok(bytes.len())
    }

    pub fn supported_formats(&self) -> Vec<ExportFormat> {
        self.format_handlers.keys().copied().collect()
    }

    pub fn validate_config(&self, config: &ExportConfig) -> Result<(), ExportError> {
        if !self.format_handlers.contains_key(&config.format) {
            return Err(ExportError::UnsupportedFormat {
                format: config.format,
            });
        }

        Ok(())
    }
}

impl Default for ExportManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 表示用の列見出し（CSV / Excel 共通）
pub(crate) const COLUMN_HEADERS: [&str; 16] = [
    "ルームID",
    "明細",
    "配信月",
    "支払月",
    "データ種別",
    "分配額",
    "個別ランク",
    "MKランク",
    "適用料率",
    "支払額",
    "payout_status",
    "インボイス",
    "ファイル名",
    "アカウントID",
    "繰越",
    "処理キー",
];
