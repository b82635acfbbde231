//! アプリケーション設定管理モジュール
//!
//! XDGディレクトリの `config.toml` に設定を永続化します。
//! 認証情報はここには保存せず、[`crate::api::auth::CredentialStore`] が別ファイルで管理します。

use crate::api::organizer::CategoryEndpoints;
use crate::api::retry::RetryConfig;
use crate::period::Period;
use anyhow::{Context, Result};
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_ROSTER_URL: &str = "https://mksoul-pro.com/showroom/file/shiharai-taishou.csv";
pub const DEFAULT_LEDGER_URL_TEMPLATE: &str = "https://mksoul-pro.com/showroom/csv/uriage_{file}.xlsx";
pub const DEFAULT_TIMEZONE: &str = "Asia/Tokyo";
pub const DEFAULT_AGGREGATE_LABEL: &str = "MKsoul";

const CONFIG_FILE_NAME: &str = "config.toml";

/// XDGディレクトリ
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "mksoul-pro", "srpay")
}

/// ログ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// カスタムログディレクトリ（Noneの場合はXDGデフォルト使用）
    pub log_dir: Option<PathBuf>,
    /// ログレベル (trace/debug/info/warn/error)
    pub log_level: String,
    /// ファイル出力有効化
    pub enable_file_logging: bool,
    /// 保存するログファイル数上限
    pub max_log_files: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            log_level: "info".to_string(),
            enable_file_logging: false,
            max_log_files: 30,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 支払対象ライバー名簿
    pub roster_url: String,
    /// 個別売上履歴のURL（`{file}` をファイル名で置換）
    pub ledger_url_template: String,

    /// 業務タイムゾーン (IANA名)
    pub timezone: String,
    /// 月選択の下限 `YYYY/MM`
    pub inception: String,

    pub request_timeout_secs: u64,
    pub ledger_timeout_secs: u64,
    /// 履歴ファイルの同時取得数
    pub ledger_concurrency: usize,

    /// 事務所合計の表示名
    pub aggregate_label: String,

    /// 管理画面の売上ページ
    pub endpoints: CategoryEndpoints,

    pub retry: RetryConfig,

    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            roster_url: DEFAULT_ROSTER_URL.to_string(),
            ledger_url_template: DEFAULT_LEDGER_URL_TEMPLATE.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            inception: Period::PLATFORM_INCEPTION.key(),
            request_timeout_secs: 30,
            ledger_timeout_secs: 10,
            ledger_concurrency: num_cpus::get().clamp(1, 8),
            aggregate_label: DEFAULT_AGGREGATE_LABEL.to_string(),
            endpoints: CategoryEndpoints::default(),
            retry: RetryConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {}", self.timezone, e))
    }

    pub fn inception(&self) -> Result<Period> {
        Period::parse_key(&self.inception)
            .with_context(|| format!("Invalid inception period '{}'", self.inception))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_timeout_secs.max(1))
    }

    /// 読み込んだ設定の整合性チェック
    pub fn validate(&self) -> Result<()> {
        self.timezone()?;
        self.inception()?;
        if !self.ledger_url_template.contains(crate::api::sources::FILE_PLACEHOLDER) {
            anyhow::bail!(
                "ledger_url_template must contain {}: {}",
                crate::api::sources::FILE_PLACEHOLDER,
                self.ledger_url_template
            );
        }
        Ok(())
    }
}

/// 設定管理マネージャー
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// XDG設定ディレクトリを使う
    pub fn new() -> Result<Self> {
        let config_dir = project_dirs()
            .context("Failed to get project directories")?
            .config_dir()
            .to_path_buf();
        Self::with_dir(&config_dir)
    }

    pub fn with_dir(config_dir: &Path) -> Result<Self> {
        fs::create_dir_all(config_dir).with_context(|| {
            format!("Failed to create config directory: {}", config_dir.display())
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        debug!("Config file path: {}", config_path.display());

        Ok(Self { config_path })
    }

    /// 設定を読み込み（ファイルが無ければデフォルト）
    pub fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!(
                "Config file not found, using default settings: {}",
                self.config_path.display()
            );
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;

        let config: AppConfig = toml::from_str(&content).with_context(|| {
            format!("Failed to parse config file: {}", self.config_path.display())
        })?;
        config.validate()?;

        info!("✅ Configuration loaded from: {}", self.config_path.display());

        Ok(config)
    }

    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        let content = toml::to_string_pretty(config).context("Failed to serialize config")?;

        fs::write(&self.config_path, content).with_context(|| {
            format!("Failed to write config file: {}", self.config_path.display())
        })?;

        info!("💾 Configuration saved to: {}", self.config_path.display());

        Ok(())
    }

    /// 設定をリセット（既存ファイルはバックアップしてから上書き）
    pub fn reset_config(&self) -> Result<Option<PathBuf>> {
        let backup = if self.config_exists() {
            Some(self.backup_config()?)
        } else {
            None
        };
        self.save_config(&AppConfig::default())?;
        info!("🔄 Configuration reset to defaults");
        Ok(backup)
    }

    pub fn backup_config(&self) -> Result<PathBuf> {
        if !self.config_exists() {
            anyhow::bail!("Config file does not exist");
        }

        let backup_path = self.config_path.with_extension("toml.bak");
        fs::copy(&self.config_path, &backup_path)
            .with_context(|| format!("Failed to backup config to: {}", backup_path.display()))?;

        info!("📋 Configuration backed up to: {}", backup_path.display());

        Ok(backup_path)
    }

    pub fn config_exists(&self) -> bool {
        self.config_path.exists()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
