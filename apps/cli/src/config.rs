use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::args::CliArgs;

const CONFIG_DIR_NAME: &str = "session-collector";
const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_API_KEY_ENV: &str = "SESSION_COLLECTOR_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Rest,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub sessions_table: String,
    pub usage_table: String,
    pub watermarks_table: String,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Sqlite,
            url: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            sessions_table: "agent_sessions".to_string(),
            usage_table: "usage_events".to_string(),
            watermarks_table: "usage_watermarks".to_string(),
            request_timeout_secs: 30,
            max_attempts: 3,
            sqlite_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcripts_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    pub debounce_secs: u64,
    pub full_sync_secs: u64,
    pub backoff_cap_secs: u64,
    pub freshness_secs: u64,
    pub batch_size: usize,
    pub backup: bool,
    pub store: StoreConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            transcripts_dir: None,
            state_dir: None,
            debounce_secs: 5,
            full_sync_secs: 120,
            backoff_cap_secs: 300,
            freshness_secs: 600,
            batch_size: 100,
            backup: true,
            store: StoreConfig::default(),
        }
    }
}

impl CliConfig {
    /// Command-line flags win over the file.
    pub fn apply_args(&mut self, args: &CliArgs) {
        if let Some(dir) = &args.transcripts_dir {
            self.transcripts_dir = Some(dir.clone());
        }
        if let Some(url) = &args.store_url {
            self.store.kind = StoreKind::Rest;
            self.store.url = Some(url.clone());
        }
        if let Some(path) = &args.sqlite {
            self.store.kind = StoreKind::Sqlite;
            self.store.sqlite_path = Some(path.clone());
        }
        if let Some(secs) = args.debounce_secs {
            self.debounce_secs = secs;
        }
        if let Some(secs) = args.full_sync_secs {
            self.full_sync_secs = secs;
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: CliConfig,
    pub paths: ConfigPaths,
    pub created: bool,
}

/// Loads the config file, writing one with defaults when it does not exist.
pub fn load_or_create(explicit: Option<&Path>) -> Result<ConfigLoad> {
    let file = match explicit {
        Some(path) => path.to_path_buf(),
        None => config_dir()?.join(CONFIG_FILE_NAME),
    };
    let paths = ConfigPaths { file };

    if paths.file.exists() {
        let contents = fs::read_to_string(&paths.file)
            .with_context(|| format!("read config {}", paths.file.display()))?;
        let config: CliConfig = toml::from_str(&contents)
            .with_context(|| format!("parse config {}", paths.file.display()))?;
        return Ok(ConfigLoad {
            config,
            paths,
            created: false,
        });
    }

    if let Some(dir) = paths.file.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("create config dir {}", dir.display()))?;
    }
    let config = CliConfig::default();
    let contents = toml::to_string_pretty(&config).context("serialize config")?;
    fs::write(&paths.file, contents)
        .with_context(|| format!("write config {}", paths.file.display()))?;

    Ok(ConfigLoad {
        config,
        paths,
        created: true,
    })
}

fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME))
        .context("resolve config directory")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: CliConfig = toml::from_str(
            r#"
            debounce_secs = 2

            [store]
            kind = "rest"
            url = "https://example.supabase.co"
            "#,
        )
        .expect("parse");
        assert_eq!(config.debounce_secs, 2);
        assert_eq!(config.full_sync_secs, 120);
        assert_eq!(config.store.kind, StoreKind::Rest);
        assert_eq!(config.store.api_key_env, DEFAULT_API_KEY_ENV);
        assert_eq!(config.store.sessions_table, "agent_sessions");
    }

    #[test]
    fn creates_then_reloads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");

        let first = load_or_create(Some(&path)).expect("create");
        assert!(first.created);
        assert!(path.exists());

        let second = load_or_create(Some(&path)).expect("reload");
        assert!(!second.created);
        assert_eq!(second.config, CliConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "debounce_secs = \"soon\"").expect("write");
        assert!(load_or_create(Some(&path)).is_err());
    }

    #[test]
    fn flags_override_file() {
        let mut config = CliConfig::default();
        let args = CliArgs::parse_from([
            "session-collector",
            "--store-url",
            "http://localhost:54321",
            "--full-sync-secs",
            "30",
        ]);
        config.apply_args(&args);
        assert_eq!(config.store.kind, StoreKind::Rest);
        assert_eq!(config.store.url.as_deref(), Some("http://localhost:54321"));
        assert_eq!(config.full_sync_secs, 30);
        assert_eq!(config.debounce_secs, 5);
    }
}
