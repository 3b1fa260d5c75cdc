// ── Runtime configuration ──
//
// Plain structs consumed by the aggregator and collector. No file I/O
// here: `stargaze-config` loads and validates user settings and
// translates them into these.

use std::time::Duration;

use stargaze_api::{TlsMode, TransportConfig};

use crate::model::{SubnetLevel, Window};

/// Tuning for one [`Aggregator`](crate::Aggregator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    pub window: Window,
    pub subnet_level: SubnetLevel,
    /// Buckets kept in a snapshot before the tail merges into "Others".
    pub max_subnets: usize,
    /// Entries in the summary's top-N list.
    pub top_subnets: usize,
    /// Source IPs listed per bucket.
    pub top_ips: usize,
    /// Destination ports listed per protocol in subnet detail.
    pub top_ports: usize,
    /// Period of the snapshot timer.
    pub snapshot_interval: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window: Window::default(),
            subnet_level: SubnetLevel::default(),
            max_subnets: 30,
            top_subnets: 5,
            top_ips: 10,
            top_ports: 5,
            snapshot_interval: Duration::from_secs(1),
        }
    }
}

/// Exponential backoff after consecutive poll failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            max: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// `base × 2^(failures−1)`, capped at `max`; zero without failures.
    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1_u32.checked_shl(consecutive_failures - 1).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Tuning for the [`Collector`](crate::Collector).
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub polling_interval: Duration,
    /// Upper bound on one poll, request through body.
    pub polling_timeout: Duration,
    pub max_events_per_poll: u32,
    pub max_agents: usize,
    pub backoff: BackoffPolicy,
    /// Certificate handling for `https` agent endpoints.
    pub tls: TlsMode,
    /// Settings for every per-agent aggregator.
    pub aggregator: AggregatorConfig,
}

impl CollectorConfig {
    /// Transport settings every agent client is built from.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: self.tls.clone(),
            timeout: self.polling_timeout,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(2),
            polling_timeout: Duration::from_secs(5),
            max_events_per_poll: stargaze_api::DEFAULT_EVENT_LIMIT,
            max_agents: 20,
            backoff: BackoffPolicy::default(),
            tls: TlsMode::System,
            aggregator: AggregatorConfig::default(),
        }
    }
}
