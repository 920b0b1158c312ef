//! Breach policy: which observed signals crossed their limits.

use std::collections::HashMap;

use warden_core::WardenConfig;
use warden_logscan::ScanReport;
use warden_state::{ResourceSnapshot, Signal};

/// Everything gathered in one cycle. `None` means the observation failed
/// this cycle (or is disabled) and contributes no breach.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    /// Health breach as judged by the tracker.
    pub health: Option<Signal>,
    pub scan: Option<ScanReport>,
    pub processes: Option<Vec<ResourceSnapshot>>,
    pub service_active: Option<bool>,
    pub port_open: Option<bool>,
}

/// Limits a signal must strictly exceed to count as a breach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thresholds {
    /// Applies to categories without their own limit.
    pub max_errors: u64,
    pub category_limits: HashMap<String, u64>,
    pub max_errors_total: Option<u64>,
    pub max_memory_mb: u64,
    pub max_open_fds: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from_config(&WardenConfig::default())
    }
}

impl Thresholds {
    pub fn from_config(config: &WardenConfig) -> Self {
        let category_limits = config
            .logs
            .categories
            .iter()
            .filter_map(|c| c.limit.map(|limit| (c.name.clone(), limit)))
            .collect();
        Self {
            max_errors: config.thresholds.max_errors,
            category_limits,
            max_errors_total: config.thresholds.max_errors_total,
            max_memory_mb: config.thresholds.max_memory_mb,
            max_open_fds: config.thresholds.max_open_fds,
        }
    }

    pub fn error_limit(&self, category: &str) -> u64 {
        self.category_limits
            .get(category)
            .copied()
            .unwrap_or(self.max_errors)
    }

    /// Every breached signal, health first. Empty means healthy.
    pub fn breaches(&self, observation: &Observation) -> Vec<Signal> {
        let mut signals = Vec::new();

        if let Some(signal) = &observation.health {
            signals.push(signal.clone());
        }
        if observation.service_active == Some(false) {
            signals.push(Signal::ServiceInactive);
        }
        if observation.port_open == Some(false) {
            signals.push(Signal::PortClosed);
        }

        if let Some(scan) = observation.scan.as_ref().filter(|s| s.available) {
            for count in &scan.counts {
                let limit = self.error_limit(&count.category);
                if count.count > limit {
                    signals.push(Signal::ErrorCount {
                        category: count.category.clone(),
                        count: count.count,
                        limit,
                    });
                }
            }
            if let Some(limit) = self.max_errors_total {
                let total = scan.total();
                if total > limit {
                    signals.push(Signal::ErrorCount {
                        category: "total".to_string(),
                        count: total,
                        limit,
                    });
                }
            }
        }

        if let Some(processes) = &observation.processes {
            if processes.is_empty() {
                signals.push(Signal::NoProcesses);
            }
            for proc in processes {
                if proc.resident_mb > self.max_memory_mb as f64 {
                    signals.push(Signal::Memory {
                        pid: proc.pid,
                        resident_mb: proc.resident_mb,
                        limit_mb: self.max_memory_mb,
                    });
                }
                if let Some(fds) = proc.open_fds.filter(|n| *n > self.max_open_fds) {
                    signals.push(Signal::Descriptors {
                        pid: proc.pid,
                        count: fds,
                        limit: self.max_open_fds,
                    });
                }
            }
        }

        signals
    }
}
