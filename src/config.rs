use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BankConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub log_level: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
    pub reap_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub default_branch: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            log_level: "info".into(),
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 1800,
            reap_interval_secs: 60,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_bank_dir()
            .join("memory-bank.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            default_branch: "main".into(),
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

/// Returns `~/.memory-bank/`
pub fn default_bank_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".memory-bank")
}

/// Returns the default config file path: `~/.memory-bank/config.toml`
pub fn default_config_path() -> PathBuf {
    default_bank_dir().join("config.toml")
}

impl BankConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            BankConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.server.transport.as_str(), "stdio" | "http") {
            anyhow::bail!(
                "server.transport must be \"stdio\" or \"http\", got {:?}",
                self.server.transport
            );
        }
        if self.storage.default_branch.trim().is_empty() {
            anyhow::bail!("storage.default_branch must not be empty");
        }
        if self.session.idle_timeout_secs == 0 {
            anyhow::bail!("session.idle_timeout_secs must be at least 1");
        }
        Ok(())
    }

    /// Apply environment variable overrides (MEMORY_BANK_DB, MEMORY_BANK_LOG_LEVEL,
    /// MEMORY_BANK_PORT, MEMORY_BANK_SESSION_TIMEOUT).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MEMORY_BANK_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("MEMORY_BANK_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("MEMORY_BANK_PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid MEMORY_BANK_PORT"),
            }
        }
        if let Ok(val) = std::env::var("MEMORY_BANK_SESSION_TIMEOUT") {
            match val.parse() {
                Ok(secs) => self.session.idle_timeout_secs = secs,
                Err(_) => {
                    tracing::warn!(value = %val, "ignoring invalid MEMORY_BANK_SESSION_TIMEOUT")
                }
            }
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = BankConfig::default();
        assert_eq!(config.server.transport, "stdio");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.storage.default_branch, "main");
        assert_eq!(config.session.idle_timeout(), Duration::from_secs(1800));
        assert!(config.storage.db_path.ends_with("memory-bank.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_transport_is_rejected() {
        let mut config = BankConfig::default();
        config.server.transport = "websocket".into();
        assert!(config.validate().is_err());

        config.server.transport = "http".into();
        config.storage.default_branch = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"
port = 8811

[session]
idle_timeout_secs = 30

[storage]
db_path = "/tmp/test.db"
"#;
        let config: BankConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.port, 8811);
        assert_eq!(config.session.idle_timeout_secs, 30);
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        // defaults still apply for unset fields
        assert_eq!(config.session.reap_interval_secs, 60);
        assert_eq!(config.storage.default_branch, "main");
    }

    #[test]
    fn reap_interval_is_never_zero() {
        let session = SessionConfig {
            idle_timeout_secs: 10,
            reap_interval_secs: 0,
        };
        assert_eq!(session.reap_interval(), Duration::from_secs(1));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = BankConfig::default();
        std::env::set_var("MEMORY_BANK_DB", "/tmp/override.db");
        std::env::set_var("MEMORY_BANK_LOG_LEVEL", "trace");
        std::env::set_var("MEMORY_BANK_PORT", "9000");
        std::env::set_var("MEMORY_BANK_SESSION_TIMEOUT", "not-a-number");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.session.idle_timeout_secs, 1800);

        // Clean up
        std::env::remove_var("MEMORY_BANK_DB");
        std::env::remove_var("MEMORY_BANK_LOG_LEVEL");
        std::env::remove_var("MEMORY_BANK_PORT");
        std::env::remove_var("MEMORY_BANK_SESSION_TIMEOUT");
    }
}
