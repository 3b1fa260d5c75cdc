use serde::Serialize;

use crate::connection::AgentHealth;

/// Registry entry joined with live connection state.
///
/// Never carries the credential.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub id: String,
    pub endpoint: String,
    pub label: String,
    pub enabled: bool,
    pub health: AgentHealth,
    /// Last sequence number fetched from the agent, `None` without a live connection.
    pub cursor: Option<u64>,
    /// Smoothed clock offset in milliseconds, `None` before the first sample.
    pub clock_offset_ms: Option<f64>,
    pub consecutive_failures: u32,
}
