//! 承認済み・未割り当ての問題数（プール）の健全性分類。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 順序付き: `Critical < Warning < Good < Excellent`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolHealth {
    Critical,
    Warning,
    Good,
    Excellent,
}

impl PoolHealth {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PoolHealth::Critical => "critical",
            PoolHealth::Warning => "warning",
            PoolHealth::Good => "good",
            PoolHealth::Excellent => "excellent",
        }
    }
}

impl fmt::Display for PoolHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper bounds (exclusive) for the first three health bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthThresholds {
    critical_below: u64,
    warning_below: u64,
    good_below: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            critical_below: 2,
            warning_below: 5,
            good_below: 10,
        }
    }
}

impl HealthThresholds {
    /// 境界は狭義単調増加でなければならない。満たさない場合は `None`。
    #[must_use]
    pub fn new(critical_below: u64, warning_below: u64, good_below: u64) -> Option<Self> {
        (critical_below < warning_below && warning_below < good_below).then_some(Self {
            critical_below,
            warning_below,
            good_below,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolHealthMonitor {
    thresholds: HealthThresholds,
}

impl PoolHealthMonitor {
    #[must_use]
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self { thresholds }
    }

    #[must_use]
    pub fn thresholds(&self) -> HealthThresholds {
        self.thresholds
    }

    #[must_use]
    pub fn classify(&self, approved_unscheduled: u64) -> PoolHealth {
        let t = &self.thresholds;
        if approved_unscheduled < t.critical_below {
            PoolHealth::Critical
        } else if approved_unscheduled < t.warning_below {
            PoolHealth::Warning
        } else if approved_unscheduled < t.good_below {
            PoolHealth::Good
        } else {
            PoolHealth::Excellent
        }
    }
}

/// Snapshot reported by `pool_health` and the maintenance job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub available: u64,
    pub health: PoolHealth,
    pub target_buffer: u64,
    pub max_buffer: u64,
    /// Boundaries the classification was made with.
    pub thresholds: HealthThresholds,
}
