//! Configuration management
//!
//! Handles loading, parsing, and validating the optional TOML configuration
//! file. A missing file means defaults; connection values in the file sit
//! below `REDIS_URL` and command-line flags.

use color_eyre::eyre::{self, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Smallest poll interval accepted from the config file
const MIN_INTERVAL_MS: u64 = 250;

// ============================================================================
// Public Configuration Types
// ============================================================================

/// Main configuration structure
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub connection: ConnectionSection,
    pub polling: Polling,
    pub settings: Settings,
}

/// Connection defaults; every field is optional
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConnectionSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub db: Option<i64>,
    pub prefix: Option<String>,
}

/// Poll cadence per data domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Polling {
    pub queues: Duration,
    pub jobs: Duration,
    pub workers: Duration,
    /// Jobs fetched per state for the job list
    pub job_page_size: usize,
}

impl Default for Polling {
    fn default() -> Self {
        Self {
            queues: Duration::from_millis(3000),
            jobs: Duration::from_millis(3000),
            workers: Duration::from_millis(5000),
            job_page_size: 50,
        }
    }
}

/// Global settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub log_level: String,
    /// How long a status notification stays visible
    pub status_ttl: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            status_ttl: Duration::from_millis(2000),
        }
    }
}

// ============================================================================
// Config File Deserialization (TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    connection: ConnectionSection,
    #[serde(default)]
    polling: PollingFile,
    #[serde(default)]
    settings: SettingsFile,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PollingFile {
    #[serde(default = "default_queues_ms")]
    queues_ms: u64,
    #[serde(default = "default_jobs_ms")]
    jobs_ms: u64,
    #[serde(default = "default_workers_ms")]
    workers_ms: u64,
    #[serde(default = "default_page_size")]
    job_page_size: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_status_ttl_ms")]
    status_ttl_ms: u64,
}

fn default_queues_ms() -> u64 {
    3000
}

fn default_jobs_ms() -> u64 {
    3000
}

fn default_workers_ms() -> u64 {
    5000
}

fn default_page_size() -> usize {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_status_ttl_ms() -> u64 {
    2000
}

impl Default for PollingFile {
    fn default() -> Self {
        Self {
            queues_ms: default_queues_ms(),
            jobs_ms: default_jobs_ms(),
            workers_ms: default_workers_ms(),
            job_page_size: default_page_size(),
        }
    }
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            status_ttl_ms: default_status_ttl_ms(),
        }
    }
}

// ============================================================================
// Config Implementation
// ============================================================================

impl Config {
    /// Load configuration from the default XDG config path
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read, parsed or validated.
    pub fn load() -> Result<Self> {
        match Self::get_config_path() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path; a missing file yields defaults
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read, parsed or validated.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config: {}", path.display()))?;

        Self::parse(&contents).wrap_err_with(|| format!("Invalid config: {}", path.display()))
    }

    /// Parse and validate TOML config text
    ///
    /// # Errors
    /// Returns an error on malformed TOML, unknown keys or out-of-range values.
    pub fn parse(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).wrap_err("Failed to parse TOML")?;
        Self::from_config_file(file)
    }

    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let config = Config {
            connection: file.connection,
            polling: Polling {
                queues: Duration::from_millis(file.polling.queues_ms),
                jobs: Duration::from_millis(file.polling.jobs_ms),
                workers: Duration::from_millis(file.polling.workers_ms),
                job_page_size: file.polling.job_page_size,
            },
            settings: Settings {
                log_level: file.settings.log_level,
                status_ttl: Duration::from_millis(file.settings.status_ttl_ms),
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        match self.settings.log_level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            level => eyre::bail!(
                "Invalid log_level '{level}'. Must be: error, warn, info, debug, or trace"
            ),
        }

        for (name, interval) in [
            ("queues_ms", self.polling.queues),
            ("jobs_ms", self.polling.jobs),
            ("workers_ms", self.polling.workers),
        ] {
            if interval < Duration::from_millis(MIN_INTERVAL_MS) {
                eyre::bail!(
                    "polling.{name} is {}ms, minimum is {MIN_INTERVAL_MS}ms",
                    interval.as_millis()
                );
            }
        }

        if !(1..=1000).contains(&self.polling.job_page_size) {
            eyre::bail!(
                "polling.job_page_size must be between 1 and 1000, got {}",
                self.polling.job_page_size
            );
        }

        Ok(())
    }

    /// Get the XDG config path for bullview, if a config directory is known
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bullview").join("config.toml"))
    }

    /// Print a human-readable summary of the configuration
    pub fn print_summary(&self, resolved: &crate::ConnectionConfig) {
        use crate::style::BullviewStyle;

        println!("{}", "Connection".header());
        println!("  target:   {}", resolved.target().technical());
        println!("  prefix:   {}", resolved.prefix.as_str().technical());
        let auth = if resolved.password.is_some() { "yes (hidden)" } else { "no" };
        println!("  password: {auth}");

        println!("\n{}", "Polling".header());
        println!("  queues:   {}ms", self.polling.queues.as_millis());
        println!("  jobs:     {}ms", self.polling.jobs.as_millis());
        println!("  workers:  {}ms", self.polling.workers.as_millis());
        println!("  page:     {} jobs", self.polling.job_page_size);

        println!("\n{}", "Settings".header());
        println!("  log_level:  {}", self.settings.log_level);
        println!("  status_ttl: {}ms", self.settings.status_ttl.as_millis());

        match Self::get_config_path() {
            Some(path) if path.exists() => println!("\nConfig: {}", path.display()),
            Some(path) => println!("\nConfig: {} (not present, defaults)", path.display()),
            None => println!("\nConfig: no config directory"),
        }
    }
}
