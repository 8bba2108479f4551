//! Lexfront configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LexfrontError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// SQLite database path.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Public base URL of the site (used for search-index pings).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

fn default_db_path() -> String { "~/.lexfront/site.db".into() }
fn default_base_url() -> String { "https://example-law.firm".into() }

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            base_url: default_base_url(),
            gateway: GatewayConfig::default(),
            sweep: SweepConfig::default(),
            smtp: SmtpConfig::default(),
            dispatch: DispatchConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Load config from the default path (~/.lexfront/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LexfrontError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| LexfrontError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| LexfrontError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lexfront")
            .join("config.toml")
    }

    /// Get the Lexfront home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lexfront")
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 { 8090 }
fn default_host() -> String { "0.0.0.0".into() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { port: default_port(), host: default_host() }
    }
}

/// Background sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Seconds between sweep ticks.
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

fn bool_true() -> bool { true }
fn default_sweep_interval() -> u64 { 60 }

impl Default for SweepConfig {
    fn default() -> Self {
        Self { enabled: true, interval_secs: default_sweep_interval() }
    }
}

/// SMTP relay configuration for campaign dispatch.
/// When `enabled` is false the binary wires a stub dispatcher instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    #[serde(default = "default_from_email")]
    pub from_email: String,
}

fn default_smtp_host() -> String { "smtp.gmail.com".into() }
fn default_smtp_port() -> u16 { 587 }
fn default_from_name() -> String { "Lexfront".into() }
fn default_from_email() -> String { "newsletter@example-law.firm".into() }

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_name: default_from_name(),
            from_email: default_from_email(),
        }
    }
}

/// Dispatch retry policy (applies to campaign sends).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Total attempts before a campaign is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff in seconds; attempt n waits base * 2^(n-1).
    #[serde(default = "default_retry_base")]
    pub retry_base_secs: u64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_retry_base() -> u64 { 2 }

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { max_attempts: default_max_attempts(), retry_base_secs: default_retry_base() }
    }
}

/// Search-engine ping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Ping endpoint; `{url}` is replaced with the published page URL.
    #[serde(default = "default_ping_url")]
    pub ping_url: String,
}

fn default_ping_url() -> String { "https://www.google.com/ping?sitemap={url}".into() }

impl Default for SearchConfig {
    fn default() -> Self {
        Self { enabled: true, ping_url: default_ping_url() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = SiteConfig::default();
        assert_eq!(cfg.sweep.interval_secs, 60);
        assert!(cfg.sweep.enabled);
        assert!(!cfg.smtp.enabled);
        assert_eq!(cfg.dispatch.max_attempts, 3);
        assert_eq!(cfg.gateway.port, 8090);
    }

    #[test]
    fn test_partial_toml() {
        let cfg: SiteConfig = toml::from_str(
            r#"
            base_url = "https://nguyen-law.vn"

            [sweep]
            interval_secs = 5

            [smtp]
            enabled = true
            host = "smtp.sendgrid.net"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.base_url, "https://nguyen-law.vn");
        assert_eq!(cfg.sweep.interval_secs, 5);
        assert!(cfg.sweep.enabled); // default kept
        assert!(cfg.smtp.enabled);
        assert_eq!(cfg.smtp.port, 587);
        assert_eq!(cfg.db_path, "~/.lexfront/site.db");
    }
}
