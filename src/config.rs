use std::{env, net::SocketAddr, time::Duration};

use chrono::{FixedOffset, Weekday};
use thiserror::Error;

use crate::pipeline::pool::HealthThresholds;
use crate::util::retry::RetryConfig;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

/// Tunable pipeline constants. None of these are invariants; operators adjust
/// them per deployment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineTuning {
    /// Generated questions at or above this confidence skip manual review.
    pub auto_approve_threshold: f64,
    /// Pool size `maintain_pool` tops up to.
    pub target_buffer: u64,
    /// Upper end of the healthy buffer range.
    pub max_buffer: u64,
    pub health_thresholds: HealthThresholds,
    pub schedule_window_days: u32,
    /// Cap on generation calls per maintenance or batch run.
    pub max_generation_attempts: usize,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            auto_approve_threshold: 0.90,
            target_buffer: 5,
            max_buffer: 10,
            health_thresholds: HealthThresholds::default(),
            schedule_window_days: 7,
            max_generation_attempts: 20,
        }
    }
}

/// Wall-clock times for the in-process job daemons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadenceSettings {
    pub enabled: bool,
    pub tz: FixedOffset,
    pub publish_hour: u32,
    pub maintain_hour: u32,
    pub weekly_batch_weekday: Weekday,
    pub weekly_batch_hour: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    http_bind: SocketAddr,
    challenge_db_dsn: String,
    challenge_db_max_connections: u32,
    challenge_db_min_connections: u32,
    challenge_db_acquire_timeout: Duration,
    challenge_db_idle_timeout: Duration,
    challenge_db_max_lifetime: Duration,
    generation_base_url: String,
    generation_timeout: Duration,
    generation_retry: RetryConfig,
    otel_exporter_endpoint: Option<String>,
    otel_sampling_ratio: f64,
    tuning: PipelineTuning,
    cadence: CadenceSettings,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// 環境変数から設定値を読み込み、検証する。
    ///
    /// # Errors
    /// `CHALLENGE_DB_DSN` / `GENERATION_BASE_URL` が未設定、もしくは各種値の
    /// パース・整合性チェックに失敗した場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let challenge_db_dsn = env_var("CHALLENGE_DB_DSN")?;
        let http_bind = parse_socket_addr("CHALLENGE_WORKER_HTTP_BIND", "0.0.0.0:9010")?;

        // Database connection pool settings
        let challenge_db_max_connections = parse_u32("CHALLENGE_DB_MAX_CONNECTIONS", 10)?;
        let challenge_db_min_connections = parse_u32("CHALLENGE_DB_MIN_CONNECTIONS", 1)?;
        let challenge_db_acquire_timeout =
            parse_duration_secs("CHALLENGE_DB_ACQUIRE_TIMEOUT_SECS", 30)?;
        let challenge_db_idle_timeout = parse_duration_secs("CHALLENGE_DB_IDLE_TIMEOUT_SECS", 600)?;
        let challenge_db_max_lifetime =
            parse_duration_secs("CHALLENGE_DB_MAX_LIFETIME_SECS", 1800)?;

        // Generation service
        let generation_base_url = env_var("GENERATION_BASE_URL")?;
        let generation_timeout = parse_duration_secs("GENERATION_TIMEOUT_SECS", 45)?;
        let generation_max_retries = parse_usize("GENERATION_MAX_RETRIES", 1)?;
        let generation_retry = RetryConfig::new(
            generation_max_retries.saturating_add(1),
            parse_u64("GENERATION_BACKOFF_BASE_MS", 500)?,
            parse_u64("GENERATION_BACKOFF_CAP_MS", 5000)?,
        );

        // OpenTelemetry settings
        let otel_exporter_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();
        let otel_sampling_ratio = parse_f64("OTEL_SAMPLING_RATIO", 1.0)?;

        let tuning = load_tuning()?;
        let cadence = load_cadence()?;

        Ok(Self {
            http_bind,
            challenge_db_dsn,
            challenge_db_max_connections,
            challenge_db_min_connections,
            challenge_db_acquire_timeout,
            challenge_db_idle_timeout,
            challenge_db_max_lifetime,
            generation_base_url,
            generation_timeout,
            generation_retry,
            otel_exporter_endpoint,
            otel_sampling_ratio,
            tuning,
            cadence,
        })
    }

    #[must_use]
    pub fn http_bind(&self) -> SocketAddr {
        self.http_bind
    }

    #[must_use]
    pub fn challenge_db_dsn(&self) -> &str {
        &self.challenge_db_dsn
    }

    #[must_use]
    pub fn challenge_db_max_connections(&self) -> u32 {
        self.challenge_db_max_connections
    }

    #[must_use]
    pub fn challenge_db_min_connections(&self) -> u32 {
        self.challenge_db_min_connections
    }

    #[must_use]
    pub fn challenge_db_acquire_timeout(&self) -> Duration {
        self.challenge_db_acquire_timeout
    }

    #[must_use]
    pub fn challenge_db_idle_timeout(&self) -> Duration {
        self.challenge_db_idle_timeout
    }

    #[must_use]
    pub fn challenge_db_max_lifetime(&self) -> Duration {
        self.challenge_db_max_lifetime
    }

    #[must_use]
    pub fn generation_base_url(&self) -> &str {
        &self.generation_base_url
    }

    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        self.generation_timeout
    }

    #[must_use]
    pub fn generation_retry(&self) -> RetryConfig {
        self.generation_retry
    }

    #[must_use]
    pub fn otel_exporter_endpoint(&self) -> Option<&str> {
        self.otel_exporter_endpoint.as_deref()
    }

    #[must_use]
    pub fn otel_sampling_ratio(&self) -> f64 {
        self.otel_sampling_ratio
    }

    #[must_use]
    pub fn tuning(&self) -> PipelineTuning {
        self.tuning
    }

    #[must_use]
    pub fn cadence(&self) -> CadenceSettings {
        self.cadence
    }
}

fn load_tuning() -> Result<PipelineTuning, ConfigError> {
    let auto_approve_threshold = parse_f64("AUTO_APPROVE_THRESHOLD", 0.90)?;
    if !(0.0..=1.0).contains(&auto_approve_threshold) {
        return Err(ConfigError::Invalid {
            name: "AUTO_APPROVE_THRESHOLD",
            source: anyhow::anyhow!("value must be between 0 and 1"),
        });
    }

    let target_buffer = parse_u64("POOL_TARGET_BUFFER", 5)?;
    let max_buffer = parse_u64("POOL_MAX_BUFFER", 10)?;
    if target_buffer == 0 || target_buffer > max_buffer {
        return Err(ConfigError::Invalid {
            name: "POOL_TARGET_BUFFER",
            source: anyhow::anyhow!(
                "target buffer {target_buffer} must be between 1 and POOL_MAX_BUFFER ({max_buffer})"
            ),
        });
    }

    let health_thresholds = parse_health_thresholds("POOL_HEALTH_THRESHOLDS", "2,5,10")?;

    let schedule_window_days = parse_u32("SCHEDULE_WINDOW_DAYS", 7)?;
    if schedule_window_days == 0 {
        return Err(ConfigError::Invalid {
            name: "SCHEDULE_WINDOW_DAYS",
            source: anyhow::anyhow!("must be greater than zero"),
        });
    }

    Ok(PipelineTuning {
        auto_approve_threshold,
        target_buffer,
        max_buffer,
        health_thresholds,
        schedule_window_days,
        max_generation_attempts: parse_usize("MAX_GENERATION_ATTEMPTS", 20)?,
    })
}

fn load_cadence() -> Result<CadenceSettings, ConfigError> {
    let offset_hours = parse_i32("CHALLENGE_TZ_OFFSET_HOURS", 9)?;
    let tz = FixedOffset::east_opt(offset_hours.saturating_mul(3600)).ok_or_else(|| {
        ConfigError::Invalid {
            name: "CHALLENGE_TZ_OFFSET_HOURS",
            source: anyhow::anyhow!("offset {offset_hours}h is out of range"),
        }
    })?;

    let weekday_raw = env::var("WEEKLY_BATCH_WEEKDAY").unwrap_or_else(|_| "sun".to_string());
    let weekly_batch_weekday =
        weekday_raw
            .parse::<Weekday>()
            .map_err(|error| ConfigError::Invalid {
                name: "WEEKLY_BATCH_WEEKDAY",
                source: anyhow::anyhow!("{error:?}: {weekday_raw}"),
            })?;

    Ok(CadenceSettings {
        enabled: parse_bool("SCHEDULER_ENABLED", true)?,
        tz,
        publish_hour: parse_hour("PUBLISH_HOUR", 5)?,
        maintain_hour: parse_hour("MAINTAIN_HOUR", 2)?,
        weekly_batch_weekday,
        weekly_batch_hour: parse_hour("WEEKLY_BATCH_HOUR", 3)?,
    })
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_secs)?;
    Ok(Duration::from_secs(value))
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u32>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_i32(name: &'static str, default: i32) -> Result<i32, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<i32>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_hour(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let hour = parse_u32(name, default)?;
    if hour > 23 {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("hour must be between 0 and 23"),
        });
    }
    Ok(hour)
}

fn parse_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<f64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("invalid boolean value: {raw}"),
        }),
    }
}

fn parse_health_thresholds(
    name: &'static str,
    default: &str,
) -> Result<HealthThresholds, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let values = raw
        .split(',')
        .map(|part| part.trim().parse::<u64>())
        .collect::<Result<Vec<u64>, _>>()
        .map_err(|error| ConfigError::Invalid {
            name,
            source: anyhow::Error::new(error),
        })?;

    let [critical_below, warning_below, good_below] = values[..] else {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("expected three comma-separated values, got {raw:?}"),
        });
    };

    HealthThresholds::new(critical_below, warning_below, good_below).ok_or_else(|| {
        ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("thresholds must be strictly ascending: {raw:?}"),
        }
    })
}
