//! The probe seam used by the recovery controller.

use std::time::Duration;

use async_trait::async_trait;

use warden_state::HealthSample;

use crate::checker::{ProbeTarget, probe_target};
use crate::error::HealthResult;

/// Something that can report whether the managed service is healthy.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> HealthSample;

    fn endpoint(&self) -> &str;
}

/// HTTP GET against a fixed URL, validated at construction.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    target: ProbeTarget,
    timeout: Duration,
}

impl HttpProbe {
    /// Fails when the URL cannot be probed at all.
    pub fn new(url: &str, timeout: Duration) -> HealthResult<Self> {
        Ok(Self {
            url: url.to_string(),
            target: ProbeTarget::parse(url)?,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self) -> HealthSample {
        probe_target(&self.target, &self.url, self.timeout).await
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}
