use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::CliConfig;

const STATE_DIR_NAME: &str = "session-collector";
pub const DB_FILE_NAME: &str = "collector.sqlite";
pub const BACKUP_FILE_NAME: &str = "usage-backup.jsonl";
pub const STATE_FILE_NAME: &str = "scheduler-state.json";

#[derive(Debug, Clone)]
pub struct StateDirResolution {
    pub dir: PathBuf,
    pub matched_existing: bool,
}

/// Picks the directory for the local database, backup log and state mirror.
///
/// An explicit `state_dir` wins. Otherwise the platform data dir is used,
/// falling back to a dot directory in the home dir on platforms without one.
pub fn resolve_state_dir(config: &CliConfig) -> Result<StateDirResolution> {
    if let Some(dir) = &config.state_dir {
        return Ok(StateDirResolution {
            matched_existing: dir.exists(),
            dir: dir.clone(),
        });
    }

    let dir = dirs::data_local_dir()
        .map(|data| data.join(STATE_DIR_NAME))
        .or_else(|| dirs::home_dir().map(|home| home.join(format!(".{STATE_DIR_NAME}"))))
        .context("resolve a state directory; set state_dir in the config")?;
    Ok(StateDirResolution {
        matched_existing: dir.join(DB_FILE_NAME).exists() || dir.join(BACKUP_FILE_NAME).exists(),
        dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_state_dir_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = CliConfig {
            state_dir: Some(dir.path().to_path_buf()),
            ..CliConfig::default()
        };
        let resolved = resolve_state_dir(&config).expect("resolve");
        assert_eq!(resolved.dir, dir.path());
        assert!(resolved.matched_existing);
    }

    #[test]
    fn default_state_dir_is_named_after_the_collector() {
        let resolved = resolve_state_dir(&CliConfig::default()).expect("resolve");
        let name = resolved
            .dir
            .file_name()
            .and_then(|name| name.to_str())
            .expect("dir name");
        assert!(name.trim_start_matches('.') == STATE_DIR_NAME);
    }
}
