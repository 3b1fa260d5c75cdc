// Agent wire types
//
// JSON shapes exchanged between hub and agent. Field names are camelCase
// on the wire; the hub depends on them bit-for-bit, so every optional
// field tolerates absence instead of failing the whole poll.

use serde::{Deserialize, Serialize};

/// One buffered traffic event as served by `GET /api/events`.
///
/// `protocol` stays a raw string here; `stargaze-core` maps it onto its
/// protocol enum and treats anything unrecognised as "other".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub source_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_port: Option<u16>,
    pub protocol: String,
    /// Producer wall-clock time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub bytes: u64,
    pub seq: u64,
}

/// Response body of `GET /api/events?since=&limit=`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub agent_id: String,
    /// Sequence of the first returned event, 0 when `events` is empty.
    #[serde(default)]
    pub sequence_start: u64,
    /// Sequence of the last returned event, 0 when `events` is empty.
    #[serde(default)]
    pub sequence_end: u64,
    #[serde(default)]
    pub events: Vec<EventRecord>,
    /// Advisory: more events were buffered when the response was built.
    #[serde(default)]
    pub has_more: bool,
    /// The requested cursor points at data the agent already evicted.
    #[serde(default)]
    pub gap_detected: bool,
    /// Agent wall-clock time at response build, used for clock sync.
    pub server_timestamp: i64,
}

/// Response body of the unauthenticated `GET /api/health` probe.
///
/// Only `agentId` is guaranteed; the rest is diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Seconds since the agent started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_capacity: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Response body of the authenticated `GET /api/info` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub agent_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub supported_features: Vec<String>,
    #[serde(default)]
    pub timestamp: i64,
}
