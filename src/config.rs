//! Harness configuration.
//!
//! Two layers: [`ExecLimits`] bounds a single sandboxed execution, and
//! [`HarnessConfig`] controls the run as a whole. Both have a `standard()`
//! preset that matches the CLI defaults.

use crate::error::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the Python interpreter used for sandboxes.
pub const PYTHON_ENV_VAR: &str = "EQUIV_PYTHON";

/// Interpreter used when neither `--python` nor [`PYTHON_ENV_VAR`] is set.
pub const DEFAULT_PYTHON: &str = "python3";

/// Resource ceilings for one sandboxed execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecLimits {
    /// Wall-clock budget before the process is killed.
    pub timeout: Duration,
    /// Maximum captured bytes per output stream.
    pub output_cap: usize,
    /// CPU seconds granted to the process (RLIMIT_CPU).
    pub cpu_seconds: u64,
    /// Address-space ceiling in bytes; `None` leaves it unlimited.
    pub memory_bytes: Option<u64>,
    /// Attempts at spawning the interpreter before giving up.
    pub spawn_attempts: u32,
    /// Interpreter executable.
    pub python: PathBuf,
}

impl ExecLimits {
    /// Defaults used by `equiv run`.
    pub fn standard() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            output_cap: 64 * 1024,
            cpu_seconds: 6,
            memory_bytes: Some(1024 * 1024 * 1024),
            spawn_attempts: 3,
            python: default_python(),
        }
    }

    /// Set the wall-clock timeout and keep the CPU ceiling just above it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.cpu_seconds = timeout.as_secs().saturating_add(1).max(1);
        self
    }

    /// Set the interpreter.
    pub fn with_python(mut self, python: impl Into<PathBuf>) -> Self {
        self.python = python.into();
        self
    }
}

impl Default for ExecLimits {
    fn default() -> Self {
        Self::standard()
    }
}

/// How candidate verdicts from docstring variants are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Granularity {
    /// One scored pair per (unit, candidate, variant).
    PerVariant,
    /// Variants of the same candidate collapse into one pair (worst case).
    PerUnit,
}

/// Floating-point comparison tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    /// Relative tolerance.
    pub rel: f64,
    /// Absolute tolerance.
    pub abs: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            rel: 1e-7,
            abs: 1e-9,
        }
    }
}

/// Run-level configuration.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Worker threads in the job pool.
    pub workers: usize,
    /// Independent call plans synthesized per unit.
    pub seeds: usize,
    /// Base seed; per-unit seeds are derived from it.
    pub base_seed: u64,
    /// Method calls per plan beyond the one-call-per-method minimum.
    pub extra_calls: usize,
    /// Variant keying policy.
    pub granularity: Granularity,
    /// Probe the reference to resolve untyped parameters.
    pub probe_untyped: bool,
    /// Upper bound on probe executions per unit.
    pub probe_budget: usize,
    /// Float comparison tolerance.
    pub tolerance: Tolerance,
    /// Per-execution limits.
    pub limits: ExecLimits,
}

impl HarnessConfig {
    /// Defaults used by `equiv run`.
    pub fn standard() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            seeds: 3,
            base_seed: 0x5eed,
            extra_calls: 3,
            granularity: Granularity::PerVariant,
            probe_untyped: true,
            probe_budget: 40,
            tolerance: Tolerance::default(),
            limits: ExecLimits::standard(),
        }
    }

    /// Reject values that would make the run meaningless.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.workers == 0 {
            return Err(HarnessError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.seeds == 0 {
            return Err(HarnessError::InvalidConfig(
                "seeds must be at least 1".to_string(),
            ));
        }
        if self.limits.timeout.is_zero() {
            return Err(HarnessError::InvalidConfig(
                "timeout must be positive".to_string(),
            ));
        }
        if self.limits.output_cap == 0 {
            return Err(HarnessError::InvalidConfig(
                "output cap must be positive".to_string(),
            ));
        }
        if self.limits.spawn_attempts == 0 {
            return Err(HarnessError::InvalidConfig(
                "spawn attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::standard()
    }
}

fn default_python() -> PathBuf {
    std::env::var_os(PYTHON_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PYTHON))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_limits() {
        let limits = ExecLimits::standard();
        assert_eq!(limits.timeout, Duration::from_secs(5));
        assert_eq!(limits.output_cap, 64 * 1024);
        assert_eq!(limits.spawn_attempts, 3);
    }

    #[test]
    fn test_with_timeout_tracks_cpu() {
        let limits = ExecLimits::standard().with_timeout(Duration::from_millis(500));
        assert_eq!(limits.cpu_seconds, 1);
        let limits = ExecLimits::standard().with_timeout(Duration::from_secs(10));
        assert_eq!(limits.cpu_seconds, 11);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = HarnessConfig::standard();
        config.workers = 0;
        assert!(matches!(
            config.validate(),
            Err(HarnessError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = HarnessConfig::standard();
        config.limits.timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_standard_config_is_valid() {
        assert!(HarnessConfig::standard().validate().is_ok());
        assert_eq!(HarnessConfig::standard().seeds, 3);
    }
}
