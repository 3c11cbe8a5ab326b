//! # Database Configuration
//!
//! Tuning knobs for the Bw-tree maintenance machinery. All options have
//! process-wide defaults; `Database::new` uses them as-is and
//! `Database::with_config` verifies a caller-supplied set.
//!
//! | Option              | Default | Effect                                        |
//! |---------------------|---------|-----------------------------------------------|
//! | `max_keys_per_node` | 100     | key count that triggers a page split          |
//! | `max_delta_count`   | 10      | chain length that triggers consolidation      |
//! | `gc_time`           | 24h     | reserved horizon for future garbage collection|

use crate::error::{Error, Result};
use std::time::Duration;

/// Configuration options for a [`crate::Database`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of keys a data page may hold after consolidation
    /// before it is scheduled for splitting.
    pub max_keys_per_node: usize,
    /// Maximum number of delta records a read may traverse before the page
    /// is scheduled for consolidation.
    pub max_delta_count: usize,
    /// Amount of time until data becomes eligible for garbage collection.
    /// Reserved; no collector consumes it yet.
    pub gc_time: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_keys_per_node: 100,
            max_delta_count: 10,
            gc_time: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Config {
    /// Returns an error if any option violates its validity rule.
    pub fn verify(&self) -> Result<()> {
        if self.max_keys_per_node == 0 {
            return Err(Error::InvalidConfig("max_keys_per_node must be positive"));
        }
        if self.max_delta_count == 0 {
            return Err(Error::InvalidConfig("max_delta_count must be positive"));
        }
        // gc_time is a Duration and cannot be negative.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_verifies() {
        let config = Config::default();
        assert!(config.verify().is_ok());
        assert_eq!(config.max_keys_per_node, 100);
        assert_eq!(config.max_delta_count, 10);
        assert_eq!(config.gc_time, Duration::from_secs(86_400));
    }

    #[test]
    fn zero_max_keys_per_node_is_rejected() {
        let config = Config {
            max_keys_per_node: 0,
            ..Config::default()
        };
        assert!(matches!(config.verify(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn zero_max_delta_count_is_rejected() {
        let config = Config {
            max_delta_count: 0,
            ..Config::default()
        };
        assert!(matches!(config.verify(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn zero_gc_time_is_allowed() {
        let config = Config {
            gc_time: Duration::ZERO,
            ..Config::default()
        };
        assert!(config.verify().is_ok());
    }
}
