use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

/// Numeric keys are strict: a value that is present but unparseable is a
/// startup error, not a silent fallback to the default.
fn profiled_env_u64(profile: &str, key: &str, default: u64) -> Result<u64, CoreError> {
    match profiled_env_opt(profile, key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::invalid_config(key, format!("'{}' is not a non-negative integer", raw))),
        None => Ok(default),
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub scheduler: SchedulerConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `REPORTD_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, CoreError> {
        let profile = env_or("REPORTD_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Result<Self, CoreError> {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let config = Self {
            profile: p.to_string(),
            scheduler: SchedulerConfig::from_env_profiled(p)?,
            storage: StorageConfig::from_env_profiled(p),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.scheduler.validate()
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  scheduler:   max_parallel={}, delete_age_hours={}, pump={}s, sweep={}s",
            self.scheduler.max_parallel_reports,
            self.scheduler.delete_reports_age_hours,
            self.scheduler.pump_interval_seconds,
            self.scheduler.sweep_interval_seconds
        );
        tracing::info!("  storage:     data_dir={}", self.storage.data_dir.display());
    }

    /// Return a JSON view of the active settings.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "scheduler": {
                "max_parallel_reports": self.scheduler.max_parallel_reports,
                "delete_reports_age_hours": self.scheduler.delete_reports_age_hours,
                "pump_interval_seconds": self.scheduler.pump_interval_seconds,
                "sweep_interval_seconds": self.scheduler.sweep_interval_seconds,
            },
            "storage": { "data_dir": self.storage.data_dir },
        })
    }
}

// ── Scheduler ─────────────────────────────────────────────────

/// Report scheduler configuration. Missing fields take their defaults when
/// deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of queued reports executing at once. Must be >= 1.
    #[serde(default = "default_max_parallel")]
    pub max_parallel_reports: usize,
    /// Unsaved, finished requests older than this are deleted. 0 disables.
    #[serde(default = "default_delete_age_hours")]
    pub delete_reports_age_hours: u64,
    /// Interval of the background queue pump, in seconds.
    #[serde(default = "default_pump_interval")]
    pub pump_interval_seconds: u64,
    /// Interval of the retention sweep, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

fn default_max_parallel() -> usize { 1 }
fn default_delete_age_hours() -> u64 { 72 }
fn default_pump_interval() -> u64 { 5 }
fn default_sweep_interval() -> u64 { 3600 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel_reports: default_max_parallel(),
            delete_reports_age_hours: default_delete_age_hours(),
            pump_interval_seconds: default_pump_interval(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Result<Self, CoreError> {
        Ok(Self {
            max_parallel_reports: profiled_env_u64(p, "REPORT_MAX_PARALLEL", default_max_parallel() as u64)? as usize,
            delete_reports_age_hours: profiled_env_u64(p, "REPORT_DELETE_AGE_HOURS", default_delete_age_hours())?,
            pump_interval_seconds: profiled_env_u64(p, "REPORT_PUMP_INTERVAL_SECS", default_pump_interval())?,
            sweep_interval_seconds: profiled_env_u64(p, "REPORT_SWEEP_INTERVAL_SECS", default_sweep_interval())?,
        })
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_parallel_reports == 0 {
            return Err(CoreError::invalid_config("REPORT_MAX_PARALLEL", "must be at least 1"));
        }
        if self.pump_interval_seconds == 0 {
            return Err(CoreError::invalid_config("REPORT_PUMP_INTERVAL_SECS", "must be at least 1"));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(CoreError::invalid_config("REPORT_SWEEP_INTERVAL_SECS", "must be at least 1"));
        }
        Ok(())
    }

    /// Retention age, or `None` when auto-deletion is disabled.
    pub fn retention_age(&self) -> Option<Duration> {
        if self.delete_reports_age_hours == 0 {
            None
        } else {
            Some(Duration::from_secs(self.delete_reports_age_hours.saturating_mul(3600)))
        }
    }

    pub fn pump_interval(&self) -> Duration {
        Duration::from_secs(self.pump_interval_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the file-backed report history.
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_dir: PathBuf::from(profiled_env_or(p, "REPORT_DATA_DIR", "data/reports")),
        }
    }
}
