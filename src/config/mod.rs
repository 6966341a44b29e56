//! Configuration layer: typed settings with layered precedence (file → env).

use std::str::FromStr;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::CacheConfig;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "taskline";
const ENV_PREFIX: &str = "TASKLINE";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings from the default file, a local override file, and the
/// `TASKLINE__` environment namespace, in that precedence order.
pub fn load() -> Result<Settings, LoadError> {
    let raw: RawSettings = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?
        .try_deserialize()?;

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    response_ttl_seconds: Option<u64>,
    aggregate_ttl_seconds: Option<u64>,
    static_ttl_seconds: Option<u64>,
    warm_lock_ttl_seconds: Option<u64>,
    excluded_path_prefixes: Option<Vec<String>>,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { logging, cache } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self { logging, cache })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheConfig, LoadError> {
    let defaults = CacheConfig::default();

    let response_ttl_seconds = cache
        .response_ttl_seconds
        .unwrap_or(defaults.response_ttl_seconds);
    if response_ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.response_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let aggregate_ttl_seconds = cache
        .aggregate_ttl_seconds
        .unwrap_or(defaults.aggregate_ttl_seconds);
    if aggregate_ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.aggregate_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let static_ttl_seconds = cache
        .static_ttl_seconds
        .unwrap_or(defaults.static_ttl_seconds);
    if static_ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.static_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let warm_lock_ttl_seconds = cache
        .warm_lock_ttl_seconds
        .unwrap_or(defaults.warm_lock_ttl_seconds);
    if warm_lock_ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.warm_lock_ttl_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheConfig {
        enabled: cache.enabled.unwrap_or(defaults.enabled),
        response_ttl_seconds,
        aggregate_ttl_seconds,
        static_ttl_seconds,
        warm_lock_ttl_seconds,
        excluded_path_prefixes: cache
            .excluded_path_prefixes
            .unwrap_or(defaults.excluded_path_prefixes),
    })
}
