use super::{ExportConfig, ExportError, FormatHandler, ReportData};
use serde_json;

/// JSON形式エクスポーター
pub struct JsonExporter {
    pretty_print: bool,
}

impl JsonExporter {
    pub fn new() -> Self {
        Self { pretty_print: true }
    }

    pub fn with_pretty_print(mut self, pretty: bool) -> Self {
        self.pretty_print = pretty;
        self
    }

    /// 出力するJSON構造を組み立て
    fn build_json(&self, data: &ReportData, config: &ExportConfig) -> Result<serde_json::Value, ExportError> {
        let rows = serde_json::to_value(config.filter_rows(data))
            .map_err(|e| ExportError::Serialization(e.to_string()))?;

        let mut json = serde_json::Map::new();
        if config.include_metadata {
            let metadata = serde_json::to_value(&data.metadata)
                .map_err(|e| ExportError::Serialization(e.to_string()))?;
            json.insert("metadata".to_string(), metadata);
        }

        // 事務所合計は明細行とは別のキーに置く
        if !data.agency.is_empty() {
            let agency = serde_json::to_value(&data.agency)
                .map_err(|e| ExportError::Serialization(e.to_string()))?;
            json.insert("agency".to_string(), agency);
        }
        json.insert("rows".to_string(), rows);

        Ok(serde_json::Value::Object(json))
    }
}

impl FormatHandler for JsonExporter {
    fn export(&self, data: &ReportData, config: &ExportConfig) -> Result<Vec<u8>, ExportError> {
        let json_value = self.build_json(data, config)?;

        let json_bytes = if self.pretty_print {
            serde_json::to_vec_pretty(&json_value)
        } else {
            serde_json::to_vec(&json_value)
        }
        .map_err(|e| ExportError::Serialization(e.to_string()))?;

        Ok(json_bytes)
    }

    fn file_extension(&self) -> &str {
        "json"
    }
}

impl Default for JsonExporter {
    fn default() -> Self {
        Self::new()
    }
}
