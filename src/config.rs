use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_DIR: &str = "todo-sync";
pub const SETTINGS_FILE: &str = "settings.json";

fn default_root_endpoint() -> String {
    "http://localhost:8080".into()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Default location of the settings file.
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join(APP_DIR)
        .join(SETTINGS_FILE)
}

/// Client settings. Credentials other than the username are never stored here.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    #[serde(rename = "rootEndPoint")]
    pub root_endpoint: String,
    pub user_name: String,
    /// Per-request timeout; 0 disables it.
    pub request_timeout_secs: u64,
    pub debug_logging: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root_endpoint: default_root_endpoint(),
            user_name: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
            debug_logging: false,
        }
    }
}

impl SyncConfig {
    /// Read settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(format!("Failed to read {}: {}", path.display(), e)),
        };
        serde_json::from_str(&content)
            .map_err(|e| format!("Invalid settings file {}: {}", path.display(), e))
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;
        std::fs::write(path, json).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}
