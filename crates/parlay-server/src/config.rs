//! Configuration management
//!
//! Built once at startup and handed to every component; nothing below this
//! module reads the environment.

use chrono::NaiveTime;
use chrono_tz::Tz;
use parlay_common::{ParlayError, WritePolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Refresh Configuration Constants
// ============================================================================

/// Default poller interval in seconds.
pub const DEFAULT_POLL_SECONDS: u64 = 60;

/// Default number of concurrent fetches against the remote site.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default attempts per fetch.
pub const DEFAULT_FETCH_MAX_ATTEMPTS: u32 = 5;

// ============================================================================
// Storage Configuration Constants
// ============================================================================

pub const DEFAULT_JSON_DIR: &str = "./json";
pub const DEFAULT_SNAPSHOT_DIR: &str = "./json/snapshots";
pub const DEFAULT_DISPLAY_PATH: &str = "./player_display.json";
pub const DEFAULT_STATE_DB_PATH: &str = "./data/state.sqlite";

/// Default snapshot retention window in days.
pub const DEFAULT_SNAPSHOT_RETENTION_DAYS: u32 = 7;

// ============================================================================
// Schedule Configuration Constants
// ============================================================================

pub const DEFAULT_TIMEZONE: &str = "America/New_York";
pub const DEFAULT_DAILY_RUN_AT: &str = "09:00";

/// Default CORS allowed origin.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "*";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub refresh: RefreshConfig,
    pub storage: StorageConfig,
    pub schedule: ScheduleConfig,
    pub cors: CorsConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// What to refresh and how hard to hit the remote site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Group refreshed by the poller
    pub event_url: Option<String>,
    /// Groups covered by the daily full refresh
    pub event_urls: Vec<String>,
    pub poll_seconds: u64,
    pub concurrency: usize,
    pub fetch_max_attempts: u32,
}

/// On-disk layout and write policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub json_dir: PathBuf,
    pub snapshot_dir: PathBuf,
    pub display_path: PathBuf,
    pub state_db_path: PathBuf,
    pub player_info_path: Option<PathBuf>,
    pub write_policy: WritePolicy,
    pub snapshot_enable: bool,
    pub snapshot_retention_days: u32,
}

/// Daily job timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// IANA zone name
    pub timezone: String,
    pub daily_run: bool,
    /// `HH:MM`, 24h clock
    pub daily_run_at: String,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl RefreshConfig {
    /// Groups for the daily full refresh, falling back to the poller's group
    pub fn event_groups(&self) -> Vec<String> {
        if !self.event_urls.is_empty() {
            return self.event_urls.clone();
        }
        self.event_url.iter().cloned().collect()
    }
}

impl StorageConfig {
    /// Snapshots are written only when enabled and the policy asks for them
    pub fn snapshots_active(&self) -> bool {
        self.snapshot_enable && self.write_policy.writes_snapshot()
    }
}

impl ScheduleConfig {
    pub fn tz(&self) -> Result<Tz, ParlayError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ParlayError::Config(format!("Invalid TIMEZONE '{}': {}", self.timezone, e)))
    }

    pub fn run_at(&self) -> Result<NaiveTime, ParlayError> {
        NaiveTime::parse_from_str(self.daily_run_at.trim(), "%H:%M").map_err(|e| {
            ParlayError::Config(format!(
                "Invalid DAILY_RUN_AT '{}' (expected HH:MM): {}",
                self.daily_run_at, e
            ))
        })
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup, then validate
    pub fn from_vars<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| var(key).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        let write_policy = match var("WRITE_POLICY") {
            Some(raw) => raw.parse::<WritePolicy>()?,
            None => WritePolicy::default(),
        };

        let config = Config {
            server: ServerConfig {
                host: non_empty("PARLAY_HOST").unwrap_or_else(|| DEFAULT_SERVER_HOST.to_string()),
                port: parsed(&var, "PARLAY_PORT").unwrap_or(DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: parsed(&var, "PARLAY_SHUTDOWN_TIMEOUT")
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            refresh: RefreshConfig {
                event_url: non_empty("EVENT_URL"),
                event_urls: var("EVENT_URLS").map(|s| split_list(&s)).unwrap_or_default(),
                poll_seconds: parsed(&var, "POLL_SECONDS").unwrap_or(DEFAULT_POLL_SECONDS),
                concurrency: parsed(&var, "CONCURRENCY").unwrap_or(DEFAULT_CONCURRENCY),
                fetch_max_attempts: parsed(&var, "FETCH_MAX_ATTEMPTS").unwrap_or(DEFAULT_FETCH_MAX_ATTEMPTS),
            },
            storage: StorageConfig {
                json_dir: non_empty("JSON_DIR").unwrap_or_else(|| DEFAULT_JSON_DIR.into()).into(),
                snapshot_dir: non_empty("SNAPSHOT_DIR")
                    .unwrap_or_else(|| DEFAULT_SNAPSHOT_DIR.into())
                    .into(),
                display_path: non_empty("DISPLAY_PATH")
                    .unwrap_or_else(|| DEFAULT_DISPLAY_PATH.into())
                    .into(),
                state_db_path: non_empty("STATE_DB_PATH")
                    .unwrap_or_else(|| DEFAULT_STATE_DB_PATH.into())
                    .into(),
                player_info_path: non_empty("PLAYER_INFO_PATH").map(PathBuf::from),
                write_policy,
                snapshot_enable: var("SNAPSHOT_ENABLE").map(|s| parse_flag(&s)).unwrap_or(false),
                snapshot_retention_days: parsed(&var, "SNAPSHOT_RETENTION_DAYS")
                    .unwrap_or(DEFAULT_SNAPSHOT_RETENTION_DAYS),
            },
            schedule: ScheduleConfig {
                timezone: non_empty("TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
                daily_run: var("DAILY_RUN").map(|s| parse_flag(&s)).unwrap_or(true),
                daily_run_at: non_empty("DAILY_RUN_AT")
                    .unwrap_or_else(|| DEFAULT_DAILY_RUN_AT.to_string()),
            },
            cors: CorsConfig {
                allowed_origins: split_list(
                    &var("CORS_ALLOWED_ORIGINS")
                        .unwrap_or_else(|| DEFAULT_CORS_ALLOWED_ORIGIN.to_string()),
                ),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.refresh.poll_seconds == 0 {
            anyhow::bail!("POLL_SECONDS must be greater than 0");
        }

        if self.refresh.concurrency == 0 {
            anyhow::bail!("CONCURRENCY must be greater than 0");
        }

        if self.refresh.fetch_max_attempts == 0 {
            anyhow::bail!("FETCH_MAX_ATTEMPTS must be greater than 0");
        }

        self.schedule.tz()?;
        self.schedule.run_at()?;

        if self.storage.write_policy.writes_snapshot() && !self.storage.snapshot_enable {
            tracing::warn!(
                policy = %self.storage.write_policy,
                "Write policy includes snapshots but SNAPSHOT_ENABLE is off - no snapshots will be written"
            );
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            refresh: RefreshConfig {
                event_url: None,
                event_urls: Vec::new(),
                poll_seconds: DEFAULT_POLL_SECONDS,
                concurrency: DEFAULT_CONCURRENCY,
                fetch_max_attempts: DEFAULT_FETCH_MAX_ATTEMPTS,
            },
            storage: StorageConfig {
                json_dir: DEFAULT_JSON_DIR.into(),
                snapshot_dir: DEFAULT_SNAPSHOT_DIR.into(),
                display_path: DEFAULT_DISPLAY_PATH.into(),
                state_db_path: DEFAULT_STATE_DB_PATH.into(),
                player_info_path: None,
                write_policy: WritePolicy::default(),
                snapshot_enable: false,
                snapshot_retention_days: DEFAULT_SNAPSHOT_RETENTION_DAYS,
            },
            schedule: ScheduleConfig {
                timezone: DEFAULT_TIMEZONE.to_string(),
                daily_run: true,
                daily_run_at: DEFAULT_DAILY_RUN_AT.to_string(),
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
            },
        }
    }
}

fn parsed<T, F>(var: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    var(key).and_then(|s| s.trim().parse().ok())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
