use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ProjectError;

pub const STATE_DIR: &str = ".lazy-django";
const CONFIG_FILE: &str = "config.json";

/// Native dump/restore binaries for one engine and where to find its container.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EngineTools {
    pub dump: String,
    pub restore: String,
    /// Compose service name tried first when looking for the database container.
    pub service: String,
    /// Image used for the `docker ps --filter ancestor=` fallback.
    pub image: String,
}

/// Tool names and paths used by command execution and snapshots.
///
/// Read from `<project>/.lazy-django/config.json` when present; every field
/// has a default so a partial file is fine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ToolConfig {
    /// Snapshot directory, relative to the project root.
    pub snapshots_dir: PathBuf,
    /// Service used when the compose file offers no candidates.
    pub default_service: String,
    pub container_interpreter: String,
    pub container_entry_point: String,
    /// Scratch path inside database containers for dump/restore payloads.
    pub container_tmp_path: String,
    /// Checked in order before falling back to live settings.
    pub password_env: Vec<String>,
    pub postgres: EngineTools,
    pub mysql: EngineTools,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            snapshots_dir: Path::new(STATE_DIR).join("snapshots"),
            default_service: "web".into(),
            container_interpreter: "python".into(),
            container_entry_point: "manage.py".into(),
            container_tmp_path: "/tmp/lazy-django-snapshot.sql".into(),
            password_env: vec![
                "DB_PASSWORD".into(),
                "POSTGRES_PASSWORD".into(),
                "MYSQL_PASSWORD".into(),
            ],
            postgres: EngineTools {
                dump: "pg_dump".into(),
                restore: "psql".into(),
                service: "postgres".into(),
                image: "postgres".into(),
            },
            mysql: EngineTools {
                dump: "mysqldump".into(),
                restore: "mysql".into(),
                service: "mysql".into(),
                image: "mysql".into(),
            },
        }
    }
}

impl ToolConfig {
    pub fn config_path(root: &Path) -> PathBuf {
        root.join(STATE_DIR).join(CONFIG_FILE)
    }

    /// Defaults, overlaid with the project's config file if it exists.
    pub fn load(root: &Path) -> Result<Self, ProjectError> {
        let path = Self::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).map_err(|source| ProjectError::Io {
            path: path.clone(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content).map_err(|source| ProjectError::Config { path, source })
    }

    pub fn snapshots_dir_in(&self, root: &Path) -> PathBuf {
        if self.snapshots_dir.is_absolute() {
            self.snapshots_dir.clone()
        } else {
            root.join(&self.snapshots_dir)
        }
    }
}
