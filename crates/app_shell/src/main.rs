use std::sync::Arc;
use std::{fs, path::Path};

use anyhow::{Context, Result};
use config::{AppConfig, ConfigStore};
use core_orchestrator::{Dashboard, DashboardSettings, NoticeLevel};
use core_types::SystemClock;
use i18n::I18n;
use storage_sqlite::SqliteCardStore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    let mut data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
    data_dir.push("notecards");
    if let Err(err) = fs::create_dir_all(&data_dir) {
        eprintln!("failed to prepare data dir: {err}");
    }
    let _log_guard = init_local_logger(&data_dir.join("logs"));

    let config_store = ConfigStore::from_default_location().unwrap_or_else(|err| {
        warn!("falling back to data dir for config: {err:#}");
        ConfigStore::from_dir(data_dir.join("config"))
    });
    let config = match config_store.load_or_init() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to load config: {err:#}");
            AppConfig::default()
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to create tokio runtime: {err}");
            return;
        }
    };

    if let Err(err) = runtime.block_on(run(&data_dir, config)) {
        error!("card collection unavailable: {err:#}");
        eprintln!("{err:#}");
    }
}

async fn run(data_dir: &Path, config: AppConfig) -> Result<()> {
    let i18n = I18n::new(config.language);
    let db_path = data_dir.join(&config.database_file);
    let store = SqliteCardStore::connect(&db_path)
        .await
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    info!(path = %db_path.display(), "card store ready");

    let settings = DashboardSettings {
        debounce: config.autosave_debounce(),
        flush_on_exit: config.flush_on_exit,
        gradients: config.gradient_palette(),
    };
    let (dashboard, mut notices) = Dashboard::new(Arc::new(store), Arc::new(SystemClock), settings);

    let cards = dashboard.load_all().await;
    println!("{} ({})", i18n.t("app.title"), cards.len());
    for card in &cards {
        let id = card.id.map(|id| id.to_string()).unwrap_or_default();
        println!(
            "{id:>5}  {}  {}",
            card.updated_at.format("%Y-%m-%d %H:%M"),
            card.display_title()
        );
    }

    while let Ok(notice) = notices.try_recv() {
        match notice.level {
            NoticeLevel::Error => eprintln!("{}", notice.text(&i18n)),
            NoticeLevel::Info | NoticeLevel::Success => println!("{}", notice.text(&i18n)),
        }
    }
    Ok(())
}

fn init_local_logger(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    if let Err(err) = fs::create_dir_all(log_dir) {
        eprintln!("failed to create log dir `{}`: {err}", log_dir.display());
    }
    let file_appender = tracing_appender::rolling::daily(log_dir, "notecards.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,app_shell=debug,core_orchestrator=debug")
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_writer(writer)
        .init();

    guard
}
