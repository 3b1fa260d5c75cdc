//! Traffic aggregation and distributed polling core for stargaze.
//!
//! This crate owns everything with real invariants between the packet
//! producers and the presentation layer:
//!
//! - **[`classify`]**: pure IPv4 → `/8`, `/16`, `/24` subnet identities,
//!   provider labels, private/reserved flags.
//!
//! - **[`EventLog`]**: fixed-capacity, sequence-numbered ring buffer at
//!   each agent with a resumable `read_since` cursor API and gap detection.
//!   Readers never block the single producer.
//!
//! - **[`Aggregator`]**: trailing-window event store for one data source;
//!   builds capped, sorted subnet [`Snapshot`]s and per-subnet
//!   [`SubnetDetail`]. [`SharedAggregator`] adds the periodic snapshot timer.
//!
//! - **[`ClockSync`]**: RTT-midpoint offset estimator per agent connection.
//!
//! - **[`AgentConnection`]**: per-agent polling client: sequence cursor,
//!   health window, exponential backoff, timestamp correction.
//!
//! - **[`AgentRegistry`]**: durable CRUD store of configured agents.
//!
//! - **[`Collector`]**: drives the shared polling timer, fans out one poll
//!   per enabled agent, and owns one dedicated aggregator per agent.

pub mod aggregator;
pub mod classify;
pub mod clock_sync;
pub mod collector;
pub mod config;
pub mod connection;
pub mod convert;
pub mod error;
pub mod event_log;
pub mod model;
pub mod registry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use aggregator::{Aggregator, SharedAggregator};
pub use classify::{IpClassification, Subnet, classify};
pub use clock_sync::ClockSync;
pub use collector::{AgentTick, Collector, TickOutcome};
pub use config::{AggregatorConfig, BackoffPolicy, CollectorConfig};
pub use connection::{AgentConnection, AgentHealth, HealthWindow, PollBatch, PollOutcome};
pub use error::CoreError;
pub use event_log::{BufferedEvent, EventLog, LogStats, ReadResult};
pub use registry::{AgentRecord, AgentRegistry};

pub use model::{
    AgentStatus, IpStat, PortStat, Protocol, ProtocolBreakdown, ProtocolDetail, Snapshot,
    SubnetDetail, SubnetLevel, SubnetSummary, Summary, TopSubnet, TrafficEvent, Window,
};

/// Wall-clock milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
