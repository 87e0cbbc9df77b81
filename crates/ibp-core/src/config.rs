//! Lookup configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) is valid.
//!
//! ```toml
//! [providers]
//! timeout_secs = 5.0
//!
//! [cache]
//! ttl_hours = 24
//! negative_ttl_minutes = 60
//!
//! [warnings]
//! min_release_days = 60
//! min_postmark_days = 90
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::WarningThresholds;

pub const DEFAULT_TDCJ_URL: &str = "https://inmate.tdcj.texas.gov/InmateSearch/search.action";
pub const DEFAULT_FBOP_URL: &str = "https://www.bop.gov/PublicInfo/execute/inmateloc";

const DEFAULT_TIMEOUT_SECS: f64 = 5.0;

/// Upper bound on `providers.timeout_secs`.
pub const MAX_TIMEOUT_SECS: f64 = 600.0;

/// Upper bound on `cache.ttl_hours` (one year).
pub const MAX_TTL_HOURS: u64 = 24 * 366;

/// FBOP facility codes located in Texas.
pub const TEXAS_FEDERAL_FACILITIES: &[&str] = &[
    "BAS", "BML", "BMM", "BMP", "BSC", "BIG", "BRY", "CRW", "EDN", "FTW", "DAL", "HOU", "LAT",
    "REE", "RVS", "SEA", "TEX", "TRV",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub providers: ProviderSettings,
    pub cache: CacheSettings,
    pub warnings: WarningThresholds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Budget for a single provider call, in seconds.
    pub timeout_secs: f64,
    pub tdcj_url: String,
    pub fbop_url: String,
    /// FBOP facility codes to keep. Empty keeps every facility.
    pub federal_facilities: Vec<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            tdcj_url: DEFAULT_TDCJ_URL.to_string(),
            fbop_url: DEFAULT_FBOP_URL.to_string(),
            federal_facilities: TEXAS_FEDERAL_FACILITIES
                .iter()
                .map(|code| code.to_string())
                .collect(),
        }
    }
}

impl ProviderSettings {
    /// Clamped to `[0, MAX_TIMEOUT_SECS]`; [`LookupConfig::validate`] rejects
    /// values outside that range.
    pub fn timeout(&self) -> Duration {
        let secs = if self.timeout_secs.is_nan() {
            DEFAULT_TIMEOUT_SECS
        } else {
            self.timeout_secs.clamp(0.0, MAX_TIMEOUT_SECS)
        };
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Lifetime of a found record.
    pub ttl_hours: u64,
    /// Lifetime of a "no such inmate" result.
    pub negative_ttl_minutes: u64,
    /// Lifetime of a rejected lookup (invalid identifier, malformed upstream data).
    pub rejected_ttl_minutes: u64,
    /// LRU bound on live entries; 0 disables the bound.
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            negative_ttl_minutes: 60,
            rejected_ttl_minutes: 10,
            max_entries: 10_000,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.saturating_mul(3600))
    }

    pub fn negative_ttl(&self) -> Duration {
        Duration::from_secs(self.negative_ttl_minutes.saturating_mul(60))
    }

    pub fn rejected_ttl(&self) -> Duration {
        Duration::from_secs(self.rejected_ttl_minutes.saturating_mul(60))
    }
}

impl LookupConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        debug!(path = %path.display(), "loaded lookup config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeout = self.providers.timeout_secs;
        if !timeout.is_finite() || timeout <= 0.0 || timeout > MAX_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "providers.timeout_secs must be in (0, {MAX_TIMEOUT_SECS}], got {timeout}"
            )));
        }

        let cache = &self.cache;
        if cache.ttl_hours == 0 || cache.negative_ttl_minutes == 0 || cache.rejected_ttl_minutes == 0
        {
            return Err(ConfigError::Invalid("cache TTLs must be non-zero".into()));
        }
        if cache.ttl_hours > MAX_TTL_HOURS {
            return Err(ConfigError::Invalid(format!(
                "cache.ttl_hours must be at most {MAX_TTL_HOURS}, got {}",
                cache.ttl_hours
            )));
        }
        if cache.negative_ttl() >= cache.ttl() || cache.rejected_ttl() >= cache.ttl() {
            return Err(ConfigError::Invalid(
                "negative and rejected TTLs must be shorter than cache.ttl_hours".into(),
            ));
        }

        if self.warnings.min_release_days < 0 || self.warnings.min_postmark_days < 0 {
            return Err(ConfigError::Invalid(
                "warning thresholds must not be negative".into(),
            ));
        }

        Ok(())
    }
}
