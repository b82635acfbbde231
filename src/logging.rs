//! ログ初期化
//!
//! stderr へのコンパクト出力に加え、設定で有効化した場合は日次ローテーションの
//! ファイル出力を行います。

use crate::config::{project_dirs, LogConfig};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const LOG_FILE_PREFIX: &str = "srpay.log";

/// ログ出力先ディレクトリ（未指定ならXDGデータディレクトリ配下）
pub fn log_directory(config: &LogConfig) -> Option<PathBuf> {
    config
        .log_dir
        .clone()
        .or_else(|| project_dirs().map(|dirs| dirs.data_dir().join("logs")))
}

/// `RUST_LOG` → 設定値 → `info` の順でフィルタを決める
fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// ログを初期化する
///
/// ファイル出力が有効な場合、戻り値のガードを保持している間だけ書き込まれます。
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let log_dir = if config.enable_file_logging {
        log_directory(config)
    } else {
        None
    };

    let mut guard = None;
    let file_layer = match &log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, worker_guard) = tracing_appender::non_blocking(appender);
            guard = Some(worker_guard);

            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    if let Some(dir) = log_dir {
        debug!(dir = %dir.display(), "📝 File logging enabled");
        match prune_old_logs(&dir, config.max_log_files as usize) {
            Ok(removed) if removed > 0 => debug!(removed, "🧹 Old log files removed"),
            Ok(_) => {}
            Err(e) => warn!("⚠️ Failed to prune log files: {}", e),
        }
    }

    Ok(guard)
}

/// `srpay.log.*` のうち新しいものを `keep` 件残して削除する
pub fn prune_old_logs(dir: &Path, keep: usize) -> Result<usize> {
    let pattern = dir.join(format!("{LOG_FILE_PREFIX}.*"));
    let pattern = pattern.to_string_lossy();

    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("Invalid log file pattern: {pattern}"))?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();

    if files.len() <= keep {
        return Ok(0);
    }

    // 日付サフィックスなので名前順 = 時系列順
    files.sort();
    let excess = files.len() - keep;
    let mut removed = 0;
    for path in files.into_iter().take(excess) {
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove log file: {}", path.display()))?;
        removed += 1;
    }

    Ok(removed)
}
