// Shared handle around an `Aggregator` plus its snapshot timer.
//
// The collector's poll tasks, the local ingest task and the timer all
// touch the same instance, so it lives behind a short-held mutex. Only one
// timer runs per handle; starting a new one replaces the old.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Aggregator;
use crate::model::{Snapshot, SubnetDetail, SubnetLevel, TrafficEvent, Window};

/// Cheaply cloneable, thread-safe aggregator handle.
#[derive(Clone)]
pub struct SharedAggregator {
    inner: Arc<SharedInner>,
}

struct SharedInner {
    state: Mutex<Aggregator>,
    timer: Mutex<Option<CancellationToken>>,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for SharedAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedAggregator")
            .field("events", &self.len())
            .field("timer_running", &self.is_snapshot_timer_running())
            .finish_non_exhaustive()
    }
}

impl SharedAggregator {
    pub fn new(aggregator: Aggregator) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                state: Mutex::new(aggregator),
                timer: Mutex::new(None),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    // A panic mid-snapshot leaves the event list intact, so a poisoned
    // lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Aggregator> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timer(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.inner.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the aggregator.
    pub fn with<R>(&self, f: impl FnOnce(&mut Aggregator) -> R) -> R {
        f(&mut self.lock())
    }

    /// Ingest one event. Events that are unclassifiable or already
    /// outside the window are dropped and `false` is returned.
    pub fn add_event(&self, event: TrafficEvent) -> bool {
        let mut agg = self.lock();
        if self.is_destroyed() {
            return false;
        }
        agg.ingest(event, crate::now_ms())
    }

    /// Add a batch under a single lock acquisition. Returns how many were kept.
    pub fn add_events(&self, events: impl IntoIterator<Item = TrafficEvent>) -> usize {
        let mut agg = self.lock();
        if self.is_destroyed() {
            return 0;
        }
        let now = crate::now_ms();
        events
            .into_iter()
            .map(|e| agg.ingest(e, now))
            .filter(|kept| *kept)
            .count()
    }

    pub fn build_snapshot(&self) -> Snapshot {
        self.lock().build_snapshot()
    }

    pub fn build_subnet_detail(&self, network: &str) -> Option<SubnetDetail> {
        self.lock().build_subnet_detail(network)
    }

    pub fn set_window(&self, value: &str) -> bool {
        self.lock().set_window(value)
    }

    pub fn set_subnet_level(&self, value: &str) -> bool {
        self.lock().set_subnet_level(value)
    }

    pub fn window(&self) -> Window {
        self.lock().window()
    }

    pub fn subnet_level(&self) -> SubnetLevel {
        self.lock().subnet_level()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // ── Periodic snapshot ────────────────────────────────────────────

    /// Build a snapshot every `snapshot_interval` and hand it to `callback`.
    ///
    /// Must be called from within a Tokio runtime. Replaces any timer
    /// already running on this handle. No-op after [`destroy`](Self::destroy).
    pub fn start_periodic_snapshot<F>(&self, mut callback: F)
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        if self.is_destroyed() {
            return;
        }
        let period = self.lock().config().snapshot_interval;
        let cancel = CancellationToken::new();
        if let Some(previous) = self.timer().replace(cancel.clone()) {
            previous.cancel();
        }

        let handle = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let snapshot = handle.build_snapshot();
                        callback(snapshot);
                    }
                }
            }
            debug!("snapshot timer stopped");
        });
    }

    pub fn stop_periodic_snapshot(&self) {
        if let Some(token) = self.timer().take() {
            token.cancel();
        }
    }

    pub fn is_snapshot_timer_running(&self) -> bool {
        self.timer().as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Stop the timer and discard every event. Later events are ignored.
    pub fn destroy(&self) {
        {
            // flag and clear under the state lock so no add lands in between
            let mut agg = self.lock();
            self.inner.destroyed.store(true, Ordering::Release);
            agg.clear();
        }
        self.stop_periodic_snapshot();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::AggregatorConfig;
    use crate::model::Protocol;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn shared() -> SharedAggregator {
        SharedAggregator::new(Aggregator::new(AggregatorConfig {
            snapshot_interval: Duration::from_millis(1_000),
            ..AggregatorConfig::default()
        }))
    }

    fn now_event() -> TrafficEvent {
        TrafficEvent::new("10.0.0.1", Protocol::Udp, crate::now_ms())
    }

    #[tokio::test(start_paused = true)]
    async fn timer_delivers_snapshots_until_stopped() {
        let agg = shared();
        agg.add_event(now_event());

        let (tx, mut rx) = mpsc::unbounded_channel();
        agg.start_periodic_snapshot(move |snap| {
            let _ = tx.send(snap.summary.total_packets);
        });
        assert!(agg.is_snapshot_timer_running());

        tokio::time::sleep(Duration::from_millis(3_100)).await;
        let mut received = Vec::new();
        while let Ok(n) = rx.try_recv() {
            received.push(n);
        }
        assert_eq!(received, vec![1, 1, 1]);

        agg.stop_periodic_snapshot();
        assert!(!agg.is_snapshot_timer_running());
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_replaces_previous_timer() {
        let agg = shared();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let first = tx.clone();
        agg.start_periodic_snapshot(move |_| {
            let _ = first.send("first");
        });
        agg.start_periodic_snapshot(move |_| {
            let _ = tx.send("second");
        });

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let mut seen = Vec::new();
        while let Ok(tag) = rx.try_recv() {
            seen.push(tag);
        }
        assert_eq!(seen, vec!["second", "second"]);
        agg.stop_periodic_snapshot();
    }

    #[tokio::test]
    async fn destroy_discards_events_and_rejects_new_ones() {
        let agg = shared();
        agg.add_event(now_event());
        agg.start_periodic_snapshot(|_| {});
        agg.destroy();

        assert!(agg.is_empty());
        assert!(!agg.is_snapshot_timer_running());
        assert!(!agg.add_event(now_event()));
        assert!(agg.is_empty());
    }

    #[test]
    fn batch_add_counts_accepted_events() {
        let agg = shared();
        let kept = agg.add_events(vec![
            now_event(),
            TrafficEvent::new("bogus", Protocol::Tcp, 0),
            now_event(),
        ]);
        assert_eq!(kept, 2);
        assert_eq!(agg.len(), 2);
    }

    fn stale_event() -> TrafficEvent {
        TrafficEvent::new("10.0.0.2", Protocol::Tcp, crate::now_ms() - 3_600_000)
    }

    #[test]
    fn ingest_drops_expired_events_without_a_snapshot() {
        let agg = shared();
        let mut batch: Vec<TrafficEvent> = (0..10_000).map(|_| stale_event()).collect();
        batch.push(now_event());
        assert_eq!(agg.add_events(batch), 1);
        assert_eq!(agg.len(), 1);

        for _ in 0..1_000 {
            agg.add_event(stale_event());
        }
        agg.add_event(now_event());
        assert_eq!(agg.len(), 2);
    }

    #[test]
    fn late_stale_events_in_a_batch_are_dropped() {
        let agg = shared();
        agg.add_events(vec![now_event(), stale_event(), stale_event(), now_event()]);
        assert_eq!(agg.len(), 2);
    }

    #[test]
    fn adds_racing_destroy_leave_it_empty() {
        let agg = shared();
        let stop = std::sync::atomic::AtomicBool::new(false);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    while !stop.load(Ordering::Relaxed) {
                        agg.add_event(now_event());
                        agg.add_events(vec![now_event(), now_event()]);
                    }
                });
            }
            std::thread::sleep(Duration::from_millis(20));
            agg.destroy();
            std::thread::sleep(Duration::from_millis(20));
            stop.store(true, Ordering::Relaxed);
        });
        assert!(agg.is_destroyed());
        assert!(agg.is_empty());
    }
}
