use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "config/chat.json";

const API_URL_VAR: &str = "CHAT_API_URL";
const SOCKET_URL_VAR: &str = "CHAT_SOCKET_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub socket_url: String,
    pub data_dir: String,
    /// Seconds to wait for a reply before releasing the input. 0 waits forever.
    pub reply_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            socket_url: "ws://localhost:3000".to_string(),
            data_dir: "data".to_string(),
            reply_timeout_secs: 120,
        }
    }
}

impl AppConfig {
    /// Applies `CHAT_API_URL` / `CHAT_SOCKET_URL` from `lookup` over the file values.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_VAR).filter(|url| !url.trim().is_empty()) {
            log::debug!("{API_URL_VAR} overrides api_base_url");
            self.api_base_url = url;
        }
        if let Some(url) = lookup(SOCKET_URL_VAR).filter(|url| !url.trim().is_empty()) {
            log::debug!("{SOCKET_URL_VAR} overrides socket_url");
            self.socket_url = url;
        }
    }

    pub fn reply_timeout(&self) -> Option<Duration> {
        (self.reply_timeout_secs > 0).then(|| Duration::from_secs(self.reply_timeout_secs))
    }

    pub fn credential_db_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("credentials.db")
    }
}

/// Reads the config file; a missing file is created with defaults.
pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            let config = AppConfig::default();
            if let Err(err) = save_config(path, &config) {
                log::warn!("Failed to write default config {}: {err}", path.display());
            }
            config
        }
    }
}

pub fn save_config<P: AsRef<Path>>(path: P, config: &AppConfig) -> std::io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)
}
