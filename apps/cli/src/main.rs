mod args;
mod config;
mod storage;

use std::fs;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use collector_core::now_ms;
use collector_sync::{
    BackupLog, ChangeScheduler, Collector, CollectorConfig, RestConfig, RestStore,
    SchedulerCommand, SchedulerConfig, SqliteStore, SyncTarget,
};
use ingest::default_transcripts_dir;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::args::{CliArgs, Command};
use crate::config::{CliConfig, StoreKind};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_logging(args.verbose);
    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(args: CliArgs) -> Result<ExitCode> {
    let loaded = config::load_or_create(args.config.as_deref())?;
    if loaded.created {
        info!(path = %loaded.paths.file.display(), "created default config");
    }
    let mut config = loaded.config;
    config.apply_args(&args);

    let transcripts_dir = config
        .transcripts_dir
        .clone()
        .unwrap_or_else(default_transcripts_dir);
    if !transcripts_dir.is_dir() {
        bail!("transcript directory not found: {}", transcripts_dir.display());
    }

    let state = storage::resolve_state_dir(&config)?;
    fs::create_dir_all(&state.dir)
        .with_context(|| format!("create state dir {}", state.dir.display()))?;
    if state.matched_existing {
        info!(dir = %state.dir.display(), "using existing state dir");
    }

    let target = build_target(&config, &state.dir)?;
    info!(
        store = target.name(),
        transcripts = %transcripts_dir.display(),
        "collector starting"
    );

    let mut collector_config = CollectorConfig::new(&transcripts_dir);
    collector_config.batch_size = config.batch_size.max(1);
    collector_config.freshness_ms = (config.freshness_secs as i64).saturating_mul(1_000);
    let mut collector = Collector::new(target, collector_config);
    if config.backup {
        collector = collector.with_backup(BackupLog::new(state.dir.join(storage::BACKUP_FILE_NAME)));
    }

    match args.command.unwrap_or(Command::Run) {
        Command::Once => {
            let (sessions, usage) = collector.full_sync(now_ms()).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "sessions": sessions,
                    "usage": usage,
                }))?
            );
            if sessions.failed.is_empty() && usage.failed.is_empty() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Run => {
            let scheduler = ChangeScheduler::new(
                Arc::new(collector),
                SchedulerConfig {
                    debounce: Duration::from_secs(config.debounce_secs),
                    full_sync_interval: Duration::from_secs(config.full_sync_secs.max(1)),
                    backoff_cap: Duration::from_secs(config.backoff_cap_secs),
                    state_file: Some(state.dir.join(storage::STATE_FILE_NAME)),
                },
            );
            let (command_tx, command_rx) = mpsc::channel(4);
            tokio::spawn(async move {
                shutdown_signal().await;
                info!("shutdown requested, flushing");
                let _ = command_tx.send(SchedulerCommand::Shutdown).await;
            });
            scheduler.watch(command_rx).await?;
            info!("collector stopped");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_target(config: &CliConfig, state_dir: &std::path::Path) -> Result<Arc<dyn SyncTarget>> {
    let store = &config.store;
    match store.kind {
        StoreKind::Rest => {
            let url = store
                .url
                .clone()
                .context("store.url is required for the rest store")?;
            let api_key = std::env::var(&store.api_key_env).ok();
            if api_key.is_none() {
                warn!(var = %store.api_key_env, "api key not set, sending unauthenticated requests");
            }
            let mut rest = RestConfig::new(url, api_key);
            rest.sessions_table = store.sessions_table.clone();
            rest.usage_table = store.usage_table.clone();
            rest.watermarks_table = store.watermarks_table.clone();
            rest.request_timeout = Duration::from_secs(store.request_timeout_secs);
            rest.max_attempts = store.max_attempts;
            Ok(Arc::new(RestStore::new(rest).context("build http client")?))
        }
        StoreKind::Sqlite => {
            let path = store
                .sqlite_path
                .clone()
                .unwrap_or_else(|| state_dir.join(storage::DB_FILE_NAME));
            let sqlite = SqliteStore::open(&path)
                .with_context(|| format!("open sqlite store {}", path.display()))?;
            Ok(Arc::new(sqlite))
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
