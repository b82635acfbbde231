use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use srpay::analytics::export::{ExportConfig, ExportFormat, ExportManager};
use srpay::api::auth::{CredentialStore, OrganizerCredentials};
use srpay::config::{AppConfig, ConfigManager};
use srpay::period::{enumerate_periods, ensure_selectable, month_options};
use srpay::{
    logging, report, OrganizerClient, Period, Pipeline, PipelineOptions, RosterSource,
    SourceClient,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "srpay", about = "SHOWROOM organizer payout reconciliation", version)]
struct Cli {
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 選択可能な配信月を新しい順に表示
    Months,
    /// 名簿を読み込んで表示
    Roster,
    /// 支払明細を作成
    Run(RunArgs),
    Auth(AuthArgs),
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// 配信月 (`2025/10`, `2025-10`, `2025年10月`)。省略時は当月
    #[arg(long, env = "SRPAY_PERIOD")]
    period: Option<String>,
    /// 明細の書き出し先
    #[arg(long)]
    export: Option<PathBuf>,
    /// 書き出し形式（省略時は拡張子から推定）
    #[arg(long, value_enum)]
    format: Option<ExportFormat>,
    #[arg(long, default_value_t = false)]
    with_metadata: bool,
    #[arg(long, default_value_t = false)]
    carry_over_only: bool,
    #[arg(long, default_value_t = false)]
    skip_no_sales: bool,
}

#[derive(Args, Debug)]
struct AuthArgs {
    #[command(subcommand)]
    command: AuthCommand,
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// 管理画面の Cookie を保存
    Set {
        #[arg(long)]
        cookie: String,
        #[arg(long)]
        login_id: Option<String>,
    },
    Status,
    Clear,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Show,
    Path,
    /// デフォルトに戻す（既存ファイルは .bak に退避）
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new()?;
    let config = config_manager.load_config()?;

    let mut log_config = config.log.clone();
    if cli.verbose {
        log_config.log_level = "debug".to_string();
    }
    let _guard = logging::init_logging(&log_config)?;

    tracing::debug!(config = %config_manager.config_path().display(), "🎬 Starting srpay");

    match cli.command {
        Commands::Months => print_months(&config),
        Commands::Roster => print_roster(&config).await,
        Commands::Run(args) => run(&config, args).await,
        Commands::Auth(args) => handle_auth(args.command),
        Commands::Config(args) => handle_config(&config_manager, &config, args.command),
    }
}

fn source_client(config: &AppConfig) -> SourceClient {
    SourceClient::new(&config.roster_url, &config.ledger_url_template)
        .with_timeouts(config.request_timeout(), config.ledger_timeout())
        .with_retry(config.retry.clone())
}

fn print_months(config: &AppConfig) -> Result<()> {
    let tz = config.timezone()?;
    let inception = config.inception()?;
    let now = Utc::now().with_timezone(&tz);

    let range = enumerate_periods(inception.year(), inception.month(), &now)?;
    for option in month_options(&range, &tz)? {
        println!("{}\t{}\t{}", option.label, option.key, option.timestamp);
    }
    Ok(())
}

async fn print_roster(config: &AppConfig) -> Result<()> {
    let roster = source_client(config).load_roster().await?;

    for talent in &roster.talents {
        println!(
            "{}\t{}\t{}",
            talent.room_id,
            talent.history_file_id.as_deref().unwrap_or("-"),
            if talent.tax_registered { "登録済" } else { "未登録" }
        );
    }
    println!(
        "\n{} 名 (インボイス登録 {} 名)",
        roster.len(),
        roster.registered_count()
    );
    if !roster.tax_column_present {
        println!("⚠️ インボイス列が無いため全員を未登録として扱います");
    }
    Ok(())
}

async fn run(config: &AppConfig, args: RunArgs) -> Result<()> {
    let now = Utc::now().with_timezone(&config.timezone()?);
    let selected = match &args.period {
        Some(input) => ensure_selectable(Period::parse_any(input)?, config.inception()?, &now)?,
        None => Period::containing(&now)?,
    };

    let credentials = CredentialStore::with_default_dir()?
        .resolve()
        .context("Organizer credentials are required; run `srpay auth set --cookie ...`")?;
    let session = credentials.session()?;
    let login_id = session.login_id().map(str::to_string);

    let organizer = OrganizerClient::new(
        session,
        config.endpoints.clone(),
        config.request_timeout(),
        config.retry.clone(),
    )?;
    let sources = source_client(config);
    let pipeline = Pipeline::new(
        organizer,
        source_client(config),
        PipelineOptions {
            ledger_concurrency: config.ledger_concurrency.max(1),
            timezone: config.timezone()?,
        },
    );

    let outcome = tokio::select! {
        result = pipeline.run_from_source(&sources, selected) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("🛑 Interrupted");
            anyhow::bail!("interrupted before the run completed");
        }
    };

    let report_data = outcome.report_data(&config.aggregate_label, login_id.as_deref());
    print!("{}", report::render_report(&report_data));

    if let Some(path) = args.export {
        let format = args
            .format
            .or_else(|| ExportFormat::from_path(&path))
            .unwrap_or(ExportFormat::Csv);
        let export_config = ExportConfig {
            format,
            include_metadata: args.with_metadata,
            include_no_sales: !args.skip_no_sales,
            carry_over_only: args.carry_over_only,
        };

        let manager = ExportManager::new();
        manager.validate_config(&export_config)?;
        let bytes = manager.export_to_file(&report_data, &export_config, &path)?;
        println!("💾 {} ({} bytes)", path.display(), bytes);
    }

    Ok(())
}

fn handle_auth(command: AuthCommand) -> Result<()> {
    let store = CredentialStore::with_default_dir()?;

    match command {
        AuthCommand::Set { cookie, login_id } => {
            let credentials = OrganizerCredentials::new(cookie, login_id);
            store.save(&credentials)?;
            println!("🔑 Saved to {}", store.credentials_path().display());
            println!("   cookie: {}", credentials.masked());
        }
        AuthCommand::Status => match store.resolve() {
            Ok(credentials) => {
                println!("cookie: {}", credentials.masked());
                println!(
                    "login id: {}",
                    credentials.login_id.as_deref().unwrap_or("(not set)")
                );
                println!(
                    "acquired at: {}",
                    credentials.acquired_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            Err(e) => println!("❌ {e}"),
        },
        AuthCommand::Clear => {
            store.delete()?;
            println!("🗑️ Removed {}", store.credentials_path().display());
        }
    }
    Ok(())
}

fn handle_config(manager: &ConfigManager, config: &AppConfig, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            print!(
                "{}",
                toml::to_string_pretty(config).context("Failed to serialize config")?
            );
        }
        ConfigCommand::Path => println!("{}", manager.config_path().display()),
        ConfigCommand::Reset => {
            if let Some(backup) = manager.reset_config()? {
                println!("📋 Previous config saved as {}", backup.display());
            }
            println!("🔄 {}", manager.config_path().display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::try_parse_from([
            "srpay",
            "run",
            "--period",
            "2025/10",
            "--export",
            "out/report.xlsx",
            "--carry-over-only",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("run expected");
        };
        assert_eq!(args.period.as_deref(), Some("2025/10"));
        assert_eq!(args.export, Some(PathBuf::from("out/report.xlsx")));
        assert!(args.carry_over_only);
        assert!(!args.skip_no_sales);
        assert_eq!(args.format, None);
    }

    #[test]
    fn test_parse_auth_set() {
        let cli = Cli::try_parse_from(["srpay", "--verbose", "auth", "set", "--cookie", "sr_id=abc"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Auth(AuthArgs {
                command: AuthCommand::Set { login_id: None, .. }
            })
        ));
    }
}
