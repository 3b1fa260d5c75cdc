// ── Per-agent polling state ──
//
// One `AgentConnection` per enabled agent. It owns the sequence cursor,
// the clock offset estimate, and the failure history that drives health
// and backoff. `poll()` never returns an error: failures are folded into
// the connection's own state and reported as `PollOutcome::Failed`.

use std::collections::VecDeque;
use std::time::Duration;

use secrecy::SecretString;
use serde::Serialize;
use strum::Display;
use tokio::time::Instant;
use tracing::{debug, warn};

use stargaze_api::{AgentClient, HealthResponse, TransportConfig};

use crate::clock_sync::ClockSync;
use crate::config::{BackoffPolicy, CollectorConfig};
use crate::error::CoreError;
use crate::model::TrafficEvent;
use crate::registry::AgentRecord;

/// Outcomes considered when classifying health.
const HEALTH_WINDOW: usize = 3;

// ── Health ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AgentHealth {
    Online,
    Degraded,
    Offline,
}

/// Rolling record of the last three poll outcomes.
#[derive(Debug, Clone, Default)]
pub struct HealthWindow {
    recent: VecDeque<bool>,
}

impl HealthWindow {
    pub fn record(&mut self, success: bool) {
        if self.recent.len() == HEALTH_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(success);
    }

    /// No failures → online; a full window of failures → offline;
    /// anything in between → degraded. No history at all is offline.
    pub fn health(&self) -> AgentHealth {
        if self.recent.is_empty() {
            return AgentHealth::Offline;
        }
        let failures = self.recent.iter().filter(|ok| !**ok).count();
        if failures == 0 {
            AgentHealth::Online
        } else if failures >= HEALTH_WINDOW {
            AgentHealth::Offline
        } else {
            AgentHealth::Degraded
        }
    }
}

impl FromIterator<bool> for HealthWindow {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut window = Self::default();
        for outcome in iter {
            window.record(outcome);
        }
        window
    }
}

// ── Poll results ────────────────────────────────────────────────────

/// Events from one successful poll, already on the hub's clock.
#[derive(Debug, Clone, Default)]
pub struct PollBatch {
    pub events: Vec<TrafficEvent>,
    /// The agent evicted data we had not fetched yet.
    pub gap_detected: bool,
    /// The agent had more buffered than this poll's limit (advisory).
    pub has_more: bool,
    /// Cursor after this poll.
    pub cursor: u64,
}

#[derive(Debug, Clone)]
pub enum PollOutcome {
    Fetched(PollBatch),
    Failed { reason: String },
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Fetched(_))
    }

    /// Fetched events, empty on failure.
    pub fn events(&self) -> &[TrafficEvent] {
        match self {
            Self::Fetched(batch) => &batch.events,
            Self::Failed { .. } => &[],
        }
    }

    pub fn into_events(self) -> Vec<TrafficEvent> {
        match self {
            Self::Fetched(batch) => batch.events,
            Self::Failed { .. } => Vec::new(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Fetched(_) => None,
            Self::Failed { reason } => Some(reason),
        }
    }
}

// ── Connection ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct AgentConnection {
    agent_id: String,
    label: String,
    client: AgentClient,
    cursor: u64,
    clock: ClockSync,
    health: HealthWindow,
    consecutive_failures: u32,
    max_events_per_poll: u32,
    timeout: Duration,
    backoff: BackoffPolicy,
    last_attempt: Option<Instant>,
}

impl AgentConnection {
    /// Build a connection for a registry record. The cursor starts at 0.
    pub fn new(record: &AgentRecord, config: &CollectorConfig) -> Result<Self, CoreError> {
        let client = AgentClient::new(
            &record.endpoint,
            Some(record.credential.clone()),
            &config.transport(),
        )?;
        Ok(Self::from_client(&record.id, &record.label, client, config))
    }

    /// Wrap an already-built client.
    pub fn from_client(
        agent_id: &str,
        label: &str,
        client: AgentClient,
        config: &CollectorConfig,
    ) -> Self {
        Self {
            agent_id: agent_id.to_owned(),
            label: label.to_owned(),
            client,
            cursor: 0,
            clock: ClockSync::new(),
            health: HealthWindow::default(),
            consecutive_failures: 0,
            max_events_per_poll: config.max_events_per_poll,
            timeout: config.polling_timeout,
            backoff: config.backoff,
            last_attempt: None,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Last sequence number fetched from the agent.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn health(&self) -> AgentHealth {
        self.health.health()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn clock_offset_ms(&self) -> Option<f64> {
        self.clock.offset_ms()
    }

    /// Wait requested before the next poll; zero while healthy.
    pub fn backoff_delay(&self) -> Duration {
        self.backoff.delay(self.consecutive_failures)
    }

    /// Whether a tick at `now` should poll this agent.
    ///
    /// While backing off, elapsed time since the last attempt is rounded
    /// to the nearest tick of `interval` before comparing, so the gate
    /// is approximate by up to half an interval.
    pub fn is_due(&self, now: Instant, interval: Duration) -> bool {
        let delay = self.backoff_delay();
        if delay.is_zero() {
            return true;
        }
        self.last_attempt.is_none_or(|at| {
            now.saturating_duration_since(at) + interval / 2 >= delay
        })
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Fetch everything after the cursor, up to the per-poll limit.
    pub async fn poll(&mut self) -> PollOutcome {
        self.last_attempt = Some(Instant::now());
        let local_send = crate::now_ms();

        let fetch = self
            .client
            .events_since(self.cursor, self.max_events_per_poll);
        let result = tokio::time::timeout(self.timeout, fetch).await;
        let resp = match result {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return self.fail(e.to_string()),
            Err(_) => {
                return self.fail(format!(
                    "Request timed out after {}ms",
                    self.timeout.as_millis()
                ));
            }
        };
        let local_recv = crate::now_ms();

        self.clock.update(local_send, local_recv, resp.server_timestamp);

        if resp.gap_detected {
            warn!(
                agent_id = %self.agent_id,
                cursor = self.cursor,
                "agent reported a gap, some events were lost upstream"
            );
        }

        if !resp.events.is_empty() {
            let highest = resp.events.iter().map(|e| e.seq).max().unwrap_or(0);
            self.cursor = resp.sequence_end.max(highest);
        }

        self.record(true);

        let clock = &self.clock;
        let events: Vec<TrafficEvent> = resp
            .events
            .into_iter()
            .map(|record| {
                let mut ev = TrafficEvent::from(record);
                ev.timestamp = clock.adjust_timestamp(ev.timestamp);
                ev
            })
            .collect();

        debug!(
            agent_id = %self.agent_id,
            count = events.len(),
            cursor = self.cursor,
            has_more = resp.has_more,
            "poll complete"
        );

        PollOutcome::Fetched(PollBatch {
            events,
            gap_detected: resp.gap_detected,
            has_more: resp.has_more,
            cursor: self.cursor,
        })
    }

    fn fail(&mut self, reason: String) -> PollOutcome {
        self.record(false);
        debug!(
            agent_id = %self.agent_id,
            failures = self.consecutive_failures,
            error = %reason,
            "poll failed"
        );
        PollOutcome::Failed { reason }
    }

    fn record(&mut self, success: bool) {
        self.health.record(success);
        if success {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
    }

    /// Forget the cursor and clock estimate; the next poll starts from 0.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.clock.reset();
    }

    // ── Reachability ─────────────────────────────────────────────────

    /// Unauthenticated health probe against this connection's endpoint.
    pub async fn test_connection(&self) -> Result<HealthResponse, CoreError> {
        probe_client(&self.client).await
    }
}

/// Probe an endpoint that has no connection yet.
pub async fn probe(
    endpoint: &str,
    credential: Option<SecretString>,
    transport: &TransportConfig,
) -> Result<HealthResponse, CoreError> {
    let client = AgentClient::new(endpoint, credential, transport)?;
    probe_client(&client).await
}

async fn probe_client(client: &AgentClient) -> Result<HealthResponse, CoreError> {
    let endpoint = client.base_url().to_string();
    let health = client
        .health()
        .await
        .map_err(|e| CoreError::Unreachable {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;
    if health.agent_id.trim().is_empty() {
        return Err(CoreError::Unreachable {
            endpoint,
            reason: "agent did not report an id".into(),
        });
    }
    Ok(health)
}
