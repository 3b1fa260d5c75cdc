// ── Collector ──
//
// Owns one `AgentConnection` and one `SharedAggregator` per agent, keyed
// by agent id. A single interval timer fans out one poll per live
// connection each tick; a tick that is still running when the next one is
// due makes the next one a no-op instead of queueing behind it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use futures_util::future::join_all;
use secrecy::SecretString;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stargaze_api::HealthResponse;

use crate::aggregator::{Aggregator, SharedAggregator};
use crate::config::CollectorConfig;
use crate::connection::{self, AgentConnection, AgentHealth, PollOutcome};
use crate::error::CoreError;
use crate::model::AgentStatus;
use crate::registry::{AgentRecord, AgentRegistry};

// ── Tick reporting ──────────────────────────────────────────────────

/// What happened to one agent during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentTick {
    Polled { agent_id: String, events: usize },
    Failed { agent_id: String, reason: String },
    /// Skipped because the connection is backing off.
    BackingOff { agent_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The previous tick was still in flight.
    Skipped,
    Completed(Vec<AgentTick>),
}

// ── Live connection ─────────────────────────────────────────────────

/// Connection state readable without waiting for an in-flight poll.
#[derive(Debug, Clone, Copy)]
struct ConnectionStatus {
    health: AgentHealth,
    cursor: u64,
    clock_offset_ms: Option<f64>,
    consecutive_failures: u32,
}

impl ConnectionStatus {
    fn of(conn: &AgentConnection) -> Self {
        Self {
            health: conn.health(),
            cursor: conn.cursor(),
            clock_offset_ms: conn.clock_offset_ms(),
            consecutive_failures: conn.consecutive_failures(),
        }
    }
}

struct LiveConnection {
    conn: tokio::sync::Mutex<AgentConnection>,
    status: ArcSwap<ConnectionStatus>,
}

impl LiveConnection {
    fn new(conn: AgentConnection) -> Self {
        let status = ArcSwap::from_pointee(ConnectionStatus::of(&conn));
        Self {
            conn: tokio::sync::Mutex::new(conn),
            status,
        }
    }
}

// ── Collector ───────────────────────────────────────────────────────

/// Cheaply cloneable; every clone drives the same agents.
#[derive(Clone)]
pub struct Collector {
    inner: Arc<CollectorInner>,
}

struct CollectorInner {
    config: CollectorConfig,
    registry: Mutex<AgentRegistry>,
    connections: DashMap<String, Arc<LiveConnection>>,
    aggregators: DashMap<String, SharedAggregator>,
    /// Held for the duration of one tick.
    in_flight: Arc<tokio::sync::Mutex<()>>,
    polling: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("agents", &self.registry().len())
            .field("connections", &self.inner.connections.len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Collector {
    /// Every enabled agent in `registry` gets a connection and an
    /// aggregator up front. Polling does not start until [`start`](Self::start).
    pub fn new(config: CollectorConfig, registry: AgentRegistry) -> Self {
        let enabled = registry.enabled();
        let collector = Self {
            inner: Arc::new(CollectorInner {
                config,
                registry: Mutex::new(registry),
                connections: DashMap::new(),
                aggregators: DashMap::new(),
                in_flight: Arc::new(tokio::sync::Mutex::new(())),
                polling: Mutex::new(None),
            }),
        };
        for record in &enabled {
            collector.attach_connection(record);
            collector.ensure_aggregator(&record.id);
        }
        collector
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.inner.config
    }

    fn registry(&self) -> MutexGuard<'_, AgentRegistry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn polling(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.inner
            .polling
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn attach_connection(&self, record: &AgentRecord) {
        match AgentConnection::new(record, &self.inner.config) {
            Ok(conn) => {
                self.inner
                    .connections
                    .insert(record.id.clone(), Arc::new(LiveConnection::new(conn)));
            }
            Err(e) => {
                warn!(agent_id = %record.id, error = %e, "cannot create agent connection");
            }
        }
    }

    fn ensure_aggregator(&self, id: &str) {
        self.inner.aggregators.entry(id.to_owned()).or_insert_with(|| {
            SharedAggregator::new(Aggregator::new(self.inner.config.aggregator.clone()))
        });
    }

    // ── Polling lifecycle ────────────────────────────────────────────

    /// Start the shared polling timer. No-op if already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut polling = self.polling();
        if polling.as_ref().is_some_and(|t| !t.is_cancelled()) {
            return;
        }
        let cancel = CancellationToken::new();
        *polling = Some(cancel.clone());
        drop(polling);

        let period = self.inner.config.polling_interval;
        info!(interval_ms = period.as_millis(), "agent polling started");

        let collector = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let tick = collector.clone();
                        let tick_cancel = cancel.clone();
                        tokio::spawn(async move {
                            tokio::select! {
                                biased;
                                () = tick_cancel.cancelled() => {}
                                _ = tick.poll_once() => {}
                            }
                        });
                    }
                }
            }
            debug!("agent polling stopped");
        });
    }

    /// Stop the polling timer and abandon any tick in flight. Idempotent.
    pub fn stop(&self) {
        if let Some(token) = self.polling().take() {
            token.cancel();
            info!("agent polling stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.polling().as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Run one tick now: poll every live connection concurrently.
    ///
    /// Returns [`TickOutcome::Skipped`] without doing anything if another
    /// tick is still in flight.
    pub async fn poll_once(&self) -> TickOutcome {
        let Ok(_guard) = Arc::clone(&self.inner.in_flight).try_lock_owned() else {
            debug!("previous polling tick still running, skipping");
            return TickOutcome::Skipped;
        };

        let targets: Vec<(String, Arc<LiveConnection>)> = self
            .inner
            .connections
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let now = Instant::now();
        let polls = targets
            .into_iter()
            .map(|(id, live)| self.poll_agent(id, live, now));
        TickOutcome::Completed(join_all(polls).await)
    }

    async fn poll_agent(&self, agent_id: String, live: Arc<LiveConnection>, now: Instant) -> AgentTick {
        let mut conn = live.conn.lock().await;
        if !conn.is_due(now, self.inner.config.polling_interval) {
            return AgentTick::BackingOff { agent_id };
        }

        let outcome = conn.poll().await;
        live.status.store(Arc::new(ConnectionStatus::of(&conn)));
        drop(conn);

        match outcome {
            PollOutcome::Fetched(batch) => {
                let events = batch.events.len();
                let aggregator = self.inner.aggregators.get(&agent_id).map(|a| a.clone());
                if let Some(aggregator) = aggregator {
                    aggregator.add_events(batch.events);
                }
                AgentTick::Polled { agent_id, events }
            }
            PollOutcome::Failed { reason } => AgentTick::Failed { agent_id, reason },
        }
    }

    // ── Agent management ─────────────────────────────────────────────

    /// Probe `endpoint`, then register it under the id the agent reports.
    ///
    /// Fails without touching the registry when the agent limit is
    /// reached, the probe fails, or the id is already registered.
    pub async fn add_agent(
        &self,
        endpoint: &str,
        credential: SecretString,
        label: &str,
    ) -> Result<AgentRecord, CoreError> {
        let max = self.inner.config.max_agents;
        if self.registry().len() >= max {
            return Err(CoreError::AgentLimitReached { max });
        }

        let health = self.test_agent(endpoint, None).await?;
        let record = AgentRecord::new(health.agent_id, endpoint.trim(), credential, label);

        {
            let mut registry = self.registry();
            if registry.len() >= max {
                return Err(CoreError::AgentLimitReached { max });
            }
            if registry.contains(&record.id) {
                return Err(CoreError::DuplicateAgent {
                    id: record.id.clone(),
                });
            }
            registry.add(record.clone());
        }

        self.attach_connection(&record);
        self.ensure_aggregator(&record.id);
        info!(agent_id = %record.id, endpoint = %record.endpoint, "agent added");
        Ok(record)
    }

    /// Drop the live connection and aggregator, then delete the record.
    pub fn remove_agent(&self, id: &str) -> Result<(), CoreError> {
        self.inner.connections.remove(id);
        if let Some((_, aggregator)) = self.inner.aggregators.remove(id) {
            aggregator.destroy();
        }
        if !self.registry().remove(id) {
            return Err(CoreError::AgentNotFound { id: id.to_owned() });
        }
        info!(agent_id = %id, "agent removed");
        Ok(())
    }

    /// Disabling drops the connection but keeps the record and the
    /// aggregator. Enabling builds a fresh connection (cursor 0) and an
    /// aggregator if none is left.
    pub fn set_agent_enabled(&self, id: &str, enabled: bool) -> Result<(), CoreError> {
        let record = {
            let mut registry = self.registry();
            if !registry.set_enabled(id, enabled) {
                return Err(CoreError::AgentNotFound { id: id.to_owned() });
            }
            registry.get(id)
        };

        if enabled {
            if let Some(record) = record {
                if !self.inner.connections.contains_key(id) {
                    self.attach_connection(&record);
                }
                self.ensure_aggregator(id);
            }
        } else {
            self.inner.connections.remove(id);
        }
        debug!(agent_id = %id, enabled, "agent enabled state changed");
        Ok(())
    }

    /// Reachability probe for an arbitrary endpoint. The health route is
    /// unauthenticated; a credential only matters for agents behind a proxy
    /// that checks it.
    pub async fn test_agent(
        &self,
        endpoint: &str,
        credential: Option<SecretString>,
    ) -> Result<HealthResponse, CoreError> {
        connection::probe(endpoint, credential, &self.inner.config.transport()).await
    }

    /// Registry entries joined with live connection state. No credentials.
    pub fn list_agents(&self) -> Vec<AgentStatus> {
        self.registry()
            .all()
            .into_iter()
            .map(|record| {
                let status = self
                    .inner
                    .connections
                    .get(&record.id)
                    .map(|live| **live.status.load());
                AgentStatus {
                    health: status.map_or(AgentHealth::Offline, |s| s.health),
                    cursor: status.map(|s| s.cursor),
                    clock_offset_ms: status.and_then(|s| s.clock_offset_ms),
                    consecutive_failures: status.map_or(0, |s| s.consecutive_failures),
                    id: record.id,
                    endpoint: record.endpoint,
                    label: record.label,
                    enabled: record.enabled,
                }
            })
            .collect()
    }

    pub fn agent(&self, id: &str) -> Option<AgentStatus> {
        self.list_agents().into_iter().find(|a| a.id == id)
    }

    /// The dedicated aggregator for one agent.
    pub fn aggregator(&self, id: &str) -> Option<SharedAggregator> {
        self.inner.aggregators.get(id).map(|a| a.clone())
    }

    pub fn has_connection(&self, id: &str) -> bool {
        self.inner.connections.contains_key(id)
    }

    /// Stop polling, drop every connection, destroy every aggregator.
    /// The registry document is left as is.
    pub fn destroy(&self) {
        self.stop();
        self.inner.connections.clear();
        for entry in &self.inner.aggregators {
            entry.value().destroy();
        }
        self.inner.aggregators.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record(id: &str, enabled: bool) -> AgentRecord {
        let mut r = AgentRecord::new(
            id,
            "http://127.0.0.1:1",
            SecretString::from("k".to_owned()),
            "",
        );
        r.enabled = enabled;
        r
    }

    fn collector_with(records: &[AgentRecord], max_agents: usize) -> Collector {
        let mut registry = AgentRegistry::in_memory();
        for r in records {
            registry.add(r.clone());
        }
        Collector::new(
            CollectorConfig {
                max_agents,
                ..CollectorConfig::default()
            },
            registry,
        )
    }

    #[test]
    fn construction_wires_enabled_agents_only() {
        let c = collector_with(&[record("a", true), record("b", false)], 20);
        assert!(c.has_connection("a"));
        assert!(c.aggregator("a").is_some());
        assert!(!c.has_connection("b"));
        assert!(c.aggregator("b").is_none());

        let listed = c.list_agents();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].health, AgentHealth::Offline);
        assert_eq!(listed[0].cursor, Some(0));
        assert_eq!(listed[1].cursor, None);
    }

    #[tokio::test]
    async fn add_agent_at_capacity_leaves_registry_alone() {
        let c = collector_with(&[record("a", true)], 1);
        let err = c
            .add_agent("http://127.0.0.1:1", SecretString::from("x".to_owned()), "")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AgentLimitReached { max: 1 }));
        assert_eq!(c.list_agents().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_agent_is_not_added() {
        let c = collector_with(&[], 20);
        let err = c
            .add_agent("http://127.0.0.1:1", SecretString::from("x".to_owned()), "")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Unreachable { .. }), "got {err:?}");
        assert!(c.list_agents().is_empty());
    }

    #[test]
    fn disable_keeps_aggregator_and_record() {
        let c = collector_with(&[record("a", true)], 20);
        c.set_agent_enabled("a", false).unwrap();
        assert!(!c.has_connection("a"));
        assert!(c.aggregator("a").is_some());
        assert!(!c.list_agents()[0].enabled);

        c.set_agent_enabled("a", true).unwrap();
        assert!(c.has_connection("a"));
        let err = c.set_agent_enabled("ghost", true).unwrap_err();
        assert!(matches!(err, CoreError::AgentNotFound { ref id } if id == "ghost"), "got {err:?}");
    }

    #[test]
    fn remove_tears_everything_down() {
        let c = collector_with(&[record("a", true)], 20);
        let agg = c.aggregator("a").unwrap();
        c.remove_agent("a").unwrap();
        assert!(!c.has_connection("a"));
        assert!(c.aggregator("a").is_none());
        assert!(agg.is_destroyed());
        assert!(c.list_agents().is_empty());
        assert!(matches!(c.remove_agent("a"), Err(CoreError::AgentNotFound { .. })));
    }

    #[tokio::test]
    async fn overlapping_tick_is_skipped() {
        let c = collector_with(&[], 20);
        let guard = Arc::clone(&c.inner.in_flight).try_lock_owned().unwrap();
        assert_eq!(c.poll_once().await, TickOutcome::Skipped);
        drop(guard);
        assert_eq!(c.poll_once().await, TickOutcome::Completed(Vec::new()));
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let c = collector_with(&[], 20);
        c.start();
        c.start();
        assert!(c.is_running());
        c.stop();
        c.stop();
        assert!(!c.is_running());
    }

    #[tokio::test]
    async fn failed_poll_is_reported_per_agent() {
        let c = collector_with(&[record("a", true)], 20);
        let TickOutcome::Completed(ticks) = c.poll_once().await else {
            panic!("tick skipped");
        };
        assert!(matches!(&ticks[0], AgentTick::Failed { agent_id, .. } if agent_id == "a"));

        // first failure: 2s backoff, the very next tick is gated
        let TickOutcome::Completed(ticks) = c.poll_once().await else {
            panic!("tick skipped");
        };
        assert!(matches!(&ticks[0], AgentTick::BackingOff { .. }));
        assert_eq!(c.agent("a").unwrap().consecutive_failures, 1);
        assert_eq!(c.agent("a").unwrap().health, AgentHealth::Degraded);
    }
}
