use std::fs;
use std::path::{Path, PathBuf};

use alert_channel::config::{ENV_WS_URL, ENV_WS_URL_FALLBACK};
use alert_channel::{ChannelConfig, DesktopNotificationConfig, Permission};
use alert_stream::StreamServerConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AppError, Result};

const APP_DIR: &str = "alertwatch";
const CONFIG_FILE: &str = "config.toml";
const REDACTED: &str = "<redacted>";

pub const ENV_TOKEN: &str = "ALERTS_TOKEN";

/// Terminal notification backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    /// Stored answer to the notification prompt.
    pub permission: Permission,
    /// Ring the terminal bell with each notification.
    pub bell: bool,
    pub colored: bool,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            permission: Permission::Default,
            bell: true,
            colored: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub channel: ChannelConfig,
    pub notifications: DesktopNotificationConfig,
    pub terminal: TerminalSettings,
    pub server: StreamServerConfig,
}

impl AppConfig {
    /// `<config dir>/alertwatch/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    fn resolve_path(path: Option<&Path>) -> Option<PathBuf> {
        path.map(Path::to_path_buf).or_else(Self::default_path)
    }

    /// Load the config file, creating it with defaults when missing, then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match Self::resolve_path(path) {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "Loading configuration");
                toml::from_str(&fs::read_to_string(&path)?)?
            }
            Some(path) => {
                let config = Self::default();
                if let Err(e) = config.save(&path) {
                    warn!(path = %path.display(), error = %e, "Could not write default configuration");
                }
                config
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overwrite the config file with defaults.
    pub fn reset(path: Option<&Path>) -> Result<PathBuf> {
        let path = Self::resolve_path(path)
            .ok_or_else(|| AppError::config("no configuration directory available"))?;
        Self::default().save(&path)?;
        Ok(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Persist a notification permission answer without touching the rest
    /// of the file or writing environment overrides back.
    pub fn remember_permission(path: Option<&Path>, permission: Permission) -> Result<()> {
        let path = Self::resolve_path(path)
            .ok_or_else(|| AppError::config("no configuration directory available"))?;
        let mut stored: Self = if path.exists() {
            toml::from_str(&fs::read_to_string(&path)?)?
        } else {
            Self::default()
        };
        stored.terminal.permission = permission;
        stored.save(&path)
    }

    /// Endpoint and token overrides; `ALERTS_WS_URL` wins over the
    /// frontend's `REACT_APP_WS_URL`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_WS_URL).or_else(|| non_empty(ENV_WS_URL_FALLBACK)) {
            self.channel.url = url;
        }
        if let Some(token) = non_empty(ENV_TOKEN) {
            self.channel.access_token = Some(token);
        }
    }

    /// TOML rendering with secrets masked.
    pub fn show(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.channel.access_token.is_some() {
            shown.channel.access_token = Some(REDACTED.to_string());
        }
        if shown.server.jwt_secret.is_some() {
            shown.server.jwt_secret = Some(REDACTED.to_string());
        }
        Ok(toml::to_string_pretty(&shown)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_load_creates_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = AppConfig::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.channel.max_reconnect_attempts, 5);
        assert_eq!(config.notifications.auto_dismiss_secs, 10);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[notifications]\nmin_risk_score = 7.5\n\n[terminal]\npermission = \"granted\"\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.notifications.min_risk_score, Some(7.5));
        assert_eq!(config.terminal.permission, Permission::Granted);
        assert_eq!(config.channel.reconnect_delay_ms, 5_000);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[channel\nurl = ").unwrap();
        assert!(matches!(
            AppConfig::load(Some(&path)),
            Err(AppError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("REACT_APP_WS_URL", "ws://frontend:8000/ws/alerts/"),
            ("ALERTS_TOKEN", "abc"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.channel.url, "ws://frontend:8000/ws/alerts/");
        assert_eq!(config.channel.access_token.as_deref(), Some("abc"));

        let env: HashMap<&str, &str> = [
            ("ALERTS_WS_URL", "wss://soc.example.com/ws/alerts/"),
            ("REACT_APP_WS_URL", "ws://frontend:8000/ws/alerts/"),
        ]
        .into_iter()
        .collect();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.channel.url, "wss://soc.example.com/ws/alerts/");
    }

    #[test]
    fn test_show_masks_secrets() {
        let mut config = AppConfig::default();
        config.channel.access_token = Some("top-secret-token".to_string());
        config.server.jwt_secret = Some("hmac-secret".to_string());

        let shown = config.show().unwrap();
        assert!(!shown.contains("top-secret-token"));
        assert!(!shown.contains("hmac-secret"));
        assert!(shown.contains(REDACTED));
    }

    #[test]
    fn test_remember_permission_keeps_file_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[terminal]\nbell = false\n").unwrap();

        AppConfig::remember_permission(Some(&path), Permission::Denied).unwrap();
        let config: AppConfig = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.terminal.permission, Permission::Denied);
        assert!(!config.terminal.bell);
        assert!(config.channel.access_token.is_none());
    }

    #[test]
    fn test_reset_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[terminal]\nbell = false\n").unwrap();

        AppConfig::reset(Some(&path)).unwrap();
        let config: AppConfig = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(config.terminal.bell);
    }
}
