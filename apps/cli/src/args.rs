use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "session-collector")]
#[command(about = "Ships agent session summaries and usage events to a store")]
#[command(version)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the session transcripts
    #[arg(long, global = true)]
    pub transcripts_dir: Option<PathBuf>,

    /// Remote store base URL; selects the REST store
    #[arg(long, global = true, env = "SESSION_COLLECTOR_URL")]
    pub store_url: Option<String>,

    /// Write into a local SQLite file instead of a remote store
    #[arg(long, global = true, conflicts_with = "store_url")]
    pub sqlite: Option<PathBuf>,

    /// Quiet period before changed files are synced
    #[arg(long, global = true)]
    pub debounce_secs: Option<u64>,

    /// Period of the full reconciliation pass
    #[arg(long, global = true)]
    pub full_sync_secs: Option<u64>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Watch the transcript directory and sync continuously (default)
    Run,
    /// Run one full reconciliation and usage extraction, then exit
    Once,
}
