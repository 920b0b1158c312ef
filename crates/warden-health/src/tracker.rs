//! Consecutive-failure tracking over recent health samples.

use std::collections::VecDeque;

use tracing::{debug, warn};

use warden_state::{HealthSample, HealthStatus, Signal};

/// Tracks the last few probe results for the managed service.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    /// Most recent samples, oldest first.
    samples: VecDeque<HealthSample>,
    /// Samples retained.
    capacity: usize,
    /// Consecutive non-up samples.
    consecutive_failures: u32,
    /// Failures needed before health counts as breached.
    unhealthy_threshold: u32,
}

impl HealthTracker {
    pub fn new(unhealthy_threshold: u32, capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            consecutive_failures: 0,
            unhealthy_threshold: unhealthy_threshold.max(1),
        }
    }

    /// Record a sample. Returns the breach signal if the failure streak has
    /// reached the threshold.
    pub fn record(&mut self, sample: HealthSample) -> Option<Signal> {
        if sample.is_up() {
            if self.consecutive_failures >= self.unhealthy_threshold {
                debug!(
                    failures = self.consecutive_failures,
                    "health endpoint recovered"
                );
            }
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
            if self.consecutive_failures == self.unhealthy_threshold {
                warn!(
                    failures = self.consecutive_failures,
                    threshold = self.unhealthy_threshold,
                    endpoint = %sample.endpoint,
                    "health endpoint marked unhealthy"
                );
            }
        }

        let signal = self.breach_signal(&sample);
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        signal
    }

    fn breach_signal(&self, latest: &HealthSample) -> Option<Signal> {
        if self.consecutive_failures < self.unhealthy_threshold {
            return None;
        }
        match latest.status {
            HealthStatus::Up => None,
            HealthStatus::Down => Some(Signal::HealthDown { code: latest.code }),
            HealthStatus::Timeout => Some(Signal::HealthTimeout),
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn latest(&self) -> Option<&HealthSample> {
        self.samples.back()
    }

    /// Recent samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &HealthSample> {
        self.samples.iter()
    }

    /// Forget the failure streak, e.g. after a restart replaced the service.
    pub fn reset_streak(&mut self) {
        self.consecutive_failures = 0;
    }
}
