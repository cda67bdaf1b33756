//! Engine configuration.
//!
//! Defaults can be overridden from the environment (a `.env` file is read
//! first when present):
//!
//! - `WDC_WORKERS`: worker threads, `0` = one per core
//! - `WDC_SEGMENTS`: initial segment count of new curves (1..=20)
//! - `WDC_TIMEOUT_SECS`: per-job timeout in seconds, `<= 0` disables it
//! - `WDC_PHIN`: default phase step of new segments
//!
//! CLI flags override both.

use std::time::Duration;

use crate::error::AppError;
use crate::segments::MAX_SEGMENTS;

pub const ENV_WORKERS: &str = "WDC_WORKERS";
pub const ENV_SEGMENTS: &str = "WDC_SEGMENTS";
pub const ENV_TIMEOUT_SECS: &str = "WDC_TIMEOUT_SECS";
pub const ENV_PHIN: &str = "WDC_PHIN";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub workers: usize,
    pub default_segments: usize,
    pub job_timeout: Option<Duration>,
    pub phase_step: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            default_segments: 4,
            job_timeout: Some(Duration::from_secs(30)),
            phase_step: 0.01,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, test maps).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_WORKERS) {
            config.workers = parse(ENV_WORKERS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SEGMENTS) {
            config.default_segments = parse(ENV_SEGMENTS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            config.job_timeout = timeout_from_secs(parse(ENV_TIMEOUT_SECS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_PHIN) {
            config.phase_step = parse(ENV_PHIN, &raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=MAX_SEGMENTS).contains(&self.default_segments) {
            return Err(AppError::new(
                2,
                format!("Segment count must be in 1..={MAX_SEGMENTS}."),
            ));
        }
        if !(self.phase_step.is_finite() && self.phase_step > 0.0 && self.phase_step <= 1.0) {
            return Err(AppError::new(2, "Phase step must be in (0, 1]."));
        }
        Ok(())
    }
}

/// Seconds to an optional timeout; non-positive values mean "no timeout".
pub fn timeout_from_secs(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::new(2, format!("Invalid value for {key}: '{raw}'.")))
}
