// stargaze-api: Wire protocol and async client for stargaze traffic agents
//
// Agents expose a fixed-capacity, sequence-numbered event log over HTTP.
// The hub pulls from it with a "since" cursor; this crate owns the JSON
// shapes of that exchange and the reqwest client that performs it.

pub mod client;
pub mod error;
pub mod transport;
pub mod types;

pub use client::AgentClient;
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};
pub use types::{EventRecord, EventsResponse, HealthResponse, InfoResponse};

/// Default page size the agent applies when `limit` is omitted.
pub const DEFAULT_EVENT_LIMIT: u32 = 10_000;

/// Hard upper bound the agent applies to any requested `limit`.
pub const MAX_EVENT_LIMIT: u32 = 50_000;

/// Protocol version reported by agents and sent as the client user agent.
pub const PROTOCOL_VERSION: &str = "0.1.0";
