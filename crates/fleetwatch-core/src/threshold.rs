//! Three-tier thresholds.
//!
//! Whether a larger value is good or bad depends on the metric: lower
//! response time is better, higher uptime is better. Each threshold
//! carries its direction and classification branches on it.

use serde::{Deserialize, Serialize};

use crate::types::CheckStatus;

/// Which way "better" points for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    LowerIsBetter,
    HigherIsBetter,
}

/// Severity band a value falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Good,
    Warning,
    Critical,
}

impl From<Level> for CheckStatus {
    fn from(level: Level) -> Self {
        match level {
            Level::Good => CheckStatus::Passed,
            Level::Warning => CheckStatus::Warning,
            Level::Critical => CheckStatus::Failed,
        }
    }
}

/// Good / warning / critical bands for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub good: f64,
    pub warning: f64,
    pub critical: f64,
    pub direction: Direction,
}

impl Threshold {
    pub const fn lower_is_better(good: f64, warning: f64, critical: f64) -> Self {
        Self {
            good,
            warning,
            critical,
            direction: Direction::LowerIsBetter,
        }
    }

    pub const fn higher_is_better(good: f64, warning: f64, critical: f64) -> Self {
        Self {
            good,
            warning,
            critical,
            direction: Direction::HigherIsBetter,
        }
    }

    /// Classify a value. Values exactly on a boundary stay in the better band.
    pub fn classify(&self, value: f64) -> Level {
        match self.direction {
            Direction::LowerIsBetter => {
                if value > self.critical {
                    Level::Critical
                } else if value > self.warning {
                    Level::Warning
                } else {
                    Level::Good
                }
            }
            Direction::HigherIsBetter => {
                if value < self.critical {
                    Level::Critical
                } else if value < self.warning {
                    Level::Warning
                } else {
                    Level::Good
                }
            }
        }
    }
}

/// Thresholds used by health checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Milliseconds.
    pub response_time: Threshold,
    /// Fraction of checks that were healthy or warning.
    pub uptime: Threshold,
    /// Fraction of failed requests.
    pub error_rate: Threshold,
    pub memory_usage: Threshold,
    pub cpu_usage: Threshold,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            response_time: Threshold::lower_is_better(1000.0, 3000.0, 5000.0),
            uptime: Threshold::higher_is_better(0.99, 0.95, 0.90),
            error_rate: Threshold::lower_is_better(0.01, 0.05, 0.10),
            memory_usage: Threshold::lower_is_better(0.70, 0.85, 0.95),
            cpu_usage: Threshold::lower_is_better(0.70, 0.85, 0.95),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_is_better_bands() {
        let t = HealthThresholds::default().response_time;
        assert_eq!(t.classify(200.0), Level::Good);
        assert_eq!(t.classify(3000.0), Level::Good);
        assert_eq!(t.classify(3001.0), Level::Warning);
        assert_eq!(t.classify(5000.0), Level::Warning);
        assert_eq!(t.classify(5001.0), Level::Critical);
    }

    #[test]
    fn higher_is_better_bands() {
        let t = HealthThresholds::default().uptime;
        assert_eq!(t.classify(0.999), Level::Good);
        assert_eq!(t.classify(0.95), Level::Good);
        assert_eq!(t.classify(0.93), Level::Warning);
        assert_eq!(t.classify(0.5), Level::Critical);
    }

    #[test]
    fn level_maps_to_check_status() {
        assert_eq!(CheckStatus::from(Level::Good), CheckStatus::Passed);
        assert_eq!(CheckStatus::from(Level::Warning), CheckStatus::Warning);
        assert_eq!(CheckStatus::from(Level::Critical), CheckStatus::Failed);
    }
}
