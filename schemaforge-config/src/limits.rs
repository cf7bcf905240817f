use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::limits as defaults;

/// Budgets enforced by the interpreter while executing declarative source.
///
/// These bound the work a single request can cause; they are not an OS-level
/// sandbox.
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LimitsConfig {
    /// Largest accepted source text, in bytes.
    #[serde(default = "LimitsConfig::default_max_source_bytes")]
    pub max_source_bytes: usize,
    /// Maximum syntactic and evaluation nesting depth.
    #[serde(default = "LimitsConfig::default_max_nesting_depth")]
    pub max_nesting_depth: usize,
    /// Maximum interpreter steps (statements plus evaluated expressions).
    #[serde(default = "LimitsConfig::default_max_steps")]
    pub max_steps: u64,
    /// Wall-clock deadline in milliseconds. 0 disables the deadline.
    #[serde(default = "LimitsConfig::default_timeout_ms")]
    pub timeout_ms: u64,
    /// Largest string, bytes or collection a single operation may build.
    #[serde(default = "LimitsConfig::default_max_value_bytes")]
    pub max_value_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_source_bytes: Self::default_max_source_bytes(),
            max_nesting_depth: Self::default_max_nesting_depth(),
            max_steps: Self::default_max_steps(),
            timeout_ms: Self::default_timeout_ms(),
            max_value_bytes: Self::default_max_value_bytes(),
        }
    }
}

impl LimitsConfig {
    const fn default_max_source_bytes() -> usize {
        defaults::DEFAULT_MAX_SOURCE_BYTES
    }

    const fn default_max_nesting_depth() -> usize {
        defaults::DEFAULT_MAX_NESTING_DEPTH
    }

    const fn default_max_steps() -> u64 {
        defaults::DEFAULT_MAX_STEPS
    }

    const fn default_timeout_ms() -> u64 {
        defaults::DEFAULT_TIMEOUT_MS
    }

    const fn default_max_value_bytes() -> usize {
        defaults::DEFAULT_MAX_VALUE_BYTES
    }

    /// Normalize the configured deadline into an optional duration.
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.timeout_ms))
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.max_source_bytes > 0,
            "limits.max_source_bytes must be greater than zero"
        );
        ensure!(
            self.max_nesting_depth >= 8,
            "limits.max_nesting_depth must be at least 8"
        );
        ensure!(
            self.max_steps > 0,
            "limits.max_steps must be greater than zero"
        );
        ensure!(
            self.max_value_bytes > 0,
            "limits.max_value_bytes must be greater than zero"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_disables_deadline() {
        let limits = LimitsConfig {
            timeout_ms: 0,
            ..LimitsConfig::default()
        };
        assert_eq!(limits.timeout(), None);
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn default_timeout_is_thirty_seconds() {
        assert_eq!(
            LimitsConfig::default().timeout(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn shallow_nesting_is_rejected() {
        let limits = LimitsConfig {
            max_nesting_depth: 2,
            ..LimitsConfig::default()
        };
        assert!(limits.validate().is_err());
    }
}
