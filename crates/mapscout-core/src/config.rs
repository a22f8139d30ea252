//! Configuration management for MapScout.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/mapscout/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Browser session settings
    pub browser: BrowserConfig,
    /// Feed discovery settings
    pub scanning: ScanningConfig,
    /// Detail extraction settings
    pub detail: DetailConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> ConfigResult<Self> {
        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(config_path)?;
            let config: Self = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `MAPSCOUT_HEADLESS`: Override browser headless mode (true/false)
    /// - `MAPSCOUT_CONCURRENCY`: Override detail worker count
    /// - `MAPSCOUT_STUCK_THRESHOLD_MS`: Override the stuck-feed threshold
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(headless) = lookup("MAPSCOUT_HEADLESS").and_then(|v| v.parse().ok()) {
            self.browser.headless = headless;
            tracing::debug!("Override browser.headless from env: {}", headless);
        }

        if let Some(concurrency) = lookup("MAPSCOUT_CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.detail.concurrency = concurrency;
            tracing::debug!("Override detail.concurrency from env: {}", concurrency);
        }

        if let Some(ms) = lookup("MAPSCOUT_STUCK_THRESHOLD_MS").and_then(|v| v.parse().ok()) {
            self.scanning.stuck_threshold_ms = ms;
            tracing::debug!("Override scanning.stuck_threshold_ms from env: {}", ms);
        }
    }

    /// Check values that would make a scan unable to terminate or run.
    pub fn validate(&self) -> ConfigResult<()> {
        fn invalid(field: &str, reason: &str) -> ConfigError {
            ConfigError::InvalidValue {
                field: field.to_string(),
                reason: reason.to_string(),
            }
        }

        if self.detail.concurrency == 0 {
            return Err(invalid("detail.concurrency", "must be at least 1"));
        }
        if self.detail.max_attempts == 0 {
            return Err(invalid("detail.max_attempts", "must be at least 1"));
        }
        if self.scanning.max_scan_attempts == 0 {
            return Err(invalid("scanning.max_scan_attempts", "must be at least 1"));
        }
        if self.scanning.feed_selector.trim().is_empty() {
            return Err(invalid("scanning.feed_selector", "must not be empty"));
        }
        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, config_path: &Path) -> ConfigResult<()> {
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/mapscout/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "mapscout", "mapscout").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Language used when a query does not specify one
    pub default_lang: String,
    /// Zoom used when a query has coordinates but no zoom
    pub default_zoom: u8,
    /// Base URL of the map surface
    pub base_url: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_lang: "en".to_string(),
            default_zoom: 14,
            base_url: "https://www.google.com/maps".to_string(),
        }
    }
}

/// Browser session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
    /// How long to wait for elements that should be present
    pub long_wait_ms: u64,
    /// How long to wait for elements that are usually absent
    pub short_wait_ms: u64,
}

impl BrowserConfig {
    /// Wait used for the feed and its links.
    #[must_use]
    pub fn long_wait(&self) -> Duration {
        Duration::from_millis(self.long_wait_ms)
    }

    /// Wait used for the end-of-results marker.
    #[must_use]
    pub fn short_wait(&self) -> Duration {
        Duration::from_millis(self.short_wait_ms)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            navigation_timeout_secs: 30,
            long_wait_ms: 8_000,
            short_wait_ms: 4_000,
        }
    }
}

/// Feed discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanningConfig {
    /// Selector of the scrollable results feed
    pub feed_selector: String,
    /// Selector of result links inside the feed
    pub link_selector: String,
    /// Selector of the end-of-results marker
    pub end_marker_selector: String,
    /// Time without scroll progress before the feed counts as stuck
    pub stuck_threshold_ms: u64,
    /// Pause after a scroll that did not advance the feed
    pub scroll_poll_ms: u64,
    /// Restarts of the discovery loop after stale element errors
    pub stale_retries: u32,
    /// Full scan attempts when the feed gets stuck
    pub max_scan_attempts: u32,
    /// Cooldown between stuck scan attempts
    pub stuck_cooldown_ms: u64,
}

impl ScanningConfig {
    /// Stuck threshold as a `Duration`.
    #[must_use]
    pub fn stuck_threshold(&self) -> Duration {
        Duration::from_millis(self.stuck_threshold_ms)
    }

    /// Scroll poll interval as a `Duration`.
    #[must_use]
    pub fn scroll_poll(&self) -> Duration {
        Duration::from_millis(self.scroll_poll_ms)
    }

    /// Stuck cooldown as a `Duration`.
    #[must_use]
    pub fn stuck_cooldown(&self) -> Duration {
        Duration::from_millis(self.stuck_cooldown_ms)
    }
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            feed_selector: r#"[role="feed"]"#.to_string(),
            link_selector: r#"[role="feed"] > div > div > a"#.to_string(),
            end_marker_selector: "p.fontBodyMedium > span > span".to_string(),
            stuck_threshold_ms: 40_000,
            scroll_poll_ms: 100,
            stale_retries: 5,
            max_scan_attempts: 3,
            stuck_cooldown_ms: 60_000,
        }
    }
}

/// Detail extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailConfig {
    /// Number of concurrent detail workers
    pub concurrency: usize,
    /// Attempts per reference before it is marked failed
    pub max_attempts: u32,
    /// Cooldown after a failed attempt
    pub retry_cooldown_ms: u64,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
    /// User agent string
    pub user_agent: String,
}

impl DetailConfig {
    /// Retry cooldown as a `Duration`.
    #[must_use]
    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_millis(self.retry_cooldown_ms)
    }
}

impl Default for DetailConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_attempts: 5,
            retry_cooldown_ms: 63_000,
            request_timeout_secs: 30,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        }
    }
}
