// ── Sliding-window subnet aggregation ──
//
// One `Aggregator` per data source (local capture or one remote agent).
// Events are kept in arrival order; every snapshot prunes the expired
// prefix and regroups what is left from scratch. Nothing here locks:
// `SharedAggregator` wraps an instance for the periodic timer.

mod detail;
mod shared;

pub use detail::port_label;
pub use shared::SharedAggregator;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::str::FromStr;

use tracing::debug;

use crate::classify::{IpClassification, Subnet, classify};
use crate::config::AggregatorConfig;
use crate::model::{
    IpStat, Protocol, Snapshot, SubnetLevel, SubnetSummary, Summary, TopSubnet, TrafficEvent,
    Window,
};

/// An accepted event tagged with its classification.
#[derive(Debug, Clone)]
struct Entry {
    event: TrafficEvent,
    class: IpClassification,
}

#[derive(Debug, Clone, Copy, Default)]
struct IpTally {
    count: u64,
    bytes: u64,
}

impl IpTally {
    fn add(&mut self, bytes: u64) {
        self.count += 1;
        self.bytes += bytes;
    }
}

/// Per-network accumulator, rebuilt on every snapshot.
struct Bucket<'a> {
    subnet: Subnet,
    parent: Option<Subnet>,
    is_private: bool,
    count: u64,
    bytes: u64,
    protocols: BTreeMap<Protocol, u64>,
    ips: HashMap<&'a str, IpTally>,
}

#[derive(Debug)]
pub struct Aggregator {
    config: AggregatorConfig,
    events: VecDeque<Entry>,
    /// An event older than its predecessor was appended, so the
    /// prefix scan alone no longer finds every expired entry.
    out_of_order: bool,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default())
    }
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            events: VecDeque::new(),
            out_of_order: false,
        }
    }

    // ── Ingestion ────────────────────────────────────────────────────

    /// Classify and retain an event. Unclassifiable sources are dropped
    /// and `false` is returned.
    pub fn add_event(&mut self, event: TrafficEvent) -> bool {
        let Some(class) = classify(&event.source_ip) else {
            debug!(source_ip = %event.source_ip, "dropping unclassifiable event");
            return false;
        };
        if self
            .events
            .back()
            .is_some_and(|last| event.timestamp < last.event.timestamp)
        {
            self.out_of_order = true;
        }
        self.events.push_back(Entry { event, class });
        true
    }

    /// [`add_event`](Self::add_event) against a live clock: an event
    /// already outside the window is dropped, and expired entries are
    /// popped off the front. Keeps the aggregator bounded by its window
    /// even when no snapshot is ever built.
    pub fn ingest(&mut self, event: TrafficEvent, now_ms: i64) -> bool {
        if event.timestamp < now_ms - self.config.window.millis() {
            return false;
        }
        let kept = self.add_event(event);
        self.trim_expired(now_ms);
        kept
    }

    /// Pop expired entries off the front only.
    pub fn trim_expired(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.config.window.millis();
        while self
            .events
            .front()
            .is_some_and(|e| e.event.timestamp < cutoff)
        {
            self.events.pop_front();
        }
    }

    /// Drop every entry older than `now_ms − window`.
    pub fn prune(&mut self, now_ms: i64) {
        self.trim_expired(now_ms);
        if self.out_of_order {
            let cutoff = now_ms - self.config.window.millis();
            self.events.retain(|e| e.event.timestamp >= cutoff);
            self.out_of_order = self
                .events
                .iter()
                .zip(self.events.iter().skip(1))
                .any(|(a, b)| b.event.timestamp < a.event.timestamp);
        }
    }

    /// Discard all retained events.
    pub fn clear(&mut self) {
        self.events.clear();
        self.out_of_order = false;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    // ── Settings ─────────────────────────────────────────────────────

    pub fn window(&self) -> Window {
        self.config.window
    }

    pub fn subnet_level(&self) -> SubnetLevel {
        self.config.subnet_level
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Switch the window (`"1m"`, `"5m"`, `"15m"`, `"1h"`). Anything else
    /// leaves the current window in place and returns `false`.
    pub fn set_window(&mut self, value: &str) -> bool {
        match Window::from_str(value) {
            Ok(window) => {
                self.config.window = window;
                true
            }
            Err(_) => {
                debug!(value, "ignoring unknown window");
                false
            }
        }
    }

    /// Switch the grouping level (`"/8"`, `"/16"`, `"/24"`). Anything else
    /// leaves the current level in place and returns `false`.
    pub fn set_subnet_level(&mut self, value: &str) -> bool {
        match SubnetLevel::from_str(value) {
            Ok(level) => {
                self.config.subnet_level = level;
                true
            }
            Err(_) => {
                debug!(value, "ignoring unknown subnet level");
                false
            }
        }
    }

    // ── Snapshot ─────────────────────────────────────────────────────

    pub fn build_snapshot(&mut self) -> Snapshot {
        self.build_snapshot_at(crate::now_ms())
    }

    /// Prune against `now_ms` and regroup everything retained.
    pub fn build_snapshot_at(&mut self, now_ms: i64) -> Snapshot {
        self.prune(now_ms);

        let level = self.config.subnet_level;
        let window_secs = self.config.window.seconds();
        let events = &self.events;

        let mut grouped: HashMap<u32, Bucket<'_>> = HashMap::new();
        let mut all_ips: HashSet<&str> = HashSet::new();
        let mut total_bytes = 0_u64;

        for entry in events {
            let subnet = entry.class.subnet(level);
            let bucket = grouped.entry(subnet.key()).or_insert_with(|| Bucket {
                subnet,
                parent: entry.class.parent(level),
                is_private: entry.class.is_private,
                count: 0,
                bytes: 0,
                protocols: BTreeMap::new(),
                ips: HashMap::new(),
            });
            let ev = &entry.event;
            bucket.count += 1;
            bucket.bytes += ev.bytes;
            *bucket.protocols.entry(ev.protocol).or_default() += 1;
            bucket.ips.entry(ev.source_ip.as_str()).or_default().add(ev.bytes);

            all_ips.insert(ev.source_ip.as_str());
            total_bytes += ev.bytes;
        }

        let mut buckets: Vec<Bucket<'_>> = grouped.into_values().collect();
        buckets.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.subnet.key().cmp(&b.subnet.key()))
        });

        let overflow = if buckets.len() > self.config.max_subnets {
            Some(buckets.split_off(self.config.max_subnets))
        } else {
            None
        };

        let mut subnets: Vec<SubnetSummary> = buckets
            .iter()
            .map(|b| self.summarize(b, window_secs))
            .collect();

        if let Some(tail) = overflow {
            let retained: HashSet<u32> = buckets.iter().map(|b| b.subnet.key()).collect();
            subnets.push(self.merge_others(&tail, &retained, window_secs));
        }

        let total_packets = u64::try_from(events.len()).unwrap_or(u64::MAX);
        let top_subnets = subnets
            .iter()
            .take(self.config.top_subnets)
            .map(|s| TopSubnet {
                network: s.network.clone(),
                label: s.label.clone(),
                count: s.count,
                percentage: percentage(s.count, total_packets),
            })
            .collect();

        Snapshot {
            timestamp: now_ms,
            window: self.config.window,
            subnet_level: level,
            summary: Summary {
                total_packets,
                total_unique_ips: u64::try_from(all_ips.len()).unwrap_or(u64::MAX),
                total_bytes,
                total_pps: rate(total_packets, window_secs),
                top_subnets,
            },
            subnets,
        }
    }

    fn summarize(&self, bucket: &Bucket<'_>, window_secs: u64) -> SubnetSummary {
        SubnetSummary {
            network: bucket.subnet.to_string(),
            parent_network: bucket.parent.map(|p| p.to_string()),
            label: bucket.subnet.label().map(str::to_owned),
            count: bucket.count,
            unique_ips: u64::try_from(bucket.ips.len()).unwrap_or(u64::MAX),
            bytes: bucket.bytes,
            pps: rate(bucket.count, window_secs),
            is_private: bucket.is_private,
            protocols: bucket.protocols.clone(),
            top_ips: top_ips(&bucket.ips, self.config.top_ips, window_secs),
        }
    }

    /// Fold the overflow tail into one bucket. Distinct IPs come from a
    /// rescan of every event outside the retained networks rather than
    /// from the tail's own sets.
    fn merge_others(
        &self,
        tail: &[Bucket<'_>],
        retained: &HashSet<u32>,
        window_secs: u64,
    ) -> SubnetSummary {
        let level = self.config.subnet_level;
        let mut protocols: BTreeMap<Protocol, u64> = BTreeMap::new();
        for bucket in tail {
            for (proto, n) in &bucket.protocols {
                *protocols.entry(*proto).or_default() += n;
            }
        }

        let mut ips: HashMap<&str, IpTally> = HashMap::new();
        for entry in &self.events {
            if !retained.contains(&entry.class.subnet(level).key()) {
                ips.entry(entry.event.source_ip.as_str())
                    .or_default()
                    .add(entry.event.bytes);
            }
        }

        let count = tail.iter().map(|b| b.count).sum();
        SubnetSummary {
            network: SubnetSummary::OTHERS.to_owned(),
            parent_network: None,
            label: None,
            count,
            unique_ips: u64::try_from(ips.len()).unwrap_or(u64::MAX),
            bytes: tail.iter().map(|b| b.bytes).sum(),
            pps: rate(count, window_secs),
            is_private: false,
            protocols,
            top_ips: top_ips(&ips, self.config.top_ips, window_secs),
        }
    }
}

// ── Numeric helpers ─────────────────────────────────────────────────

/// Round to one decimal place.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
pub(crate) fn rate(count: u64, window_secs: u64) -> f64 {
    if window_secs == 0 {
        return 0.0;
    }
    round1(count as f64 / window_secs as f64)
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round1(count as f64 * 100.0 / total as f64)
}

/// Busiest first; ties broken by address text so output is stable.
fn sorted_ips(ips: &HashMap<&str, IpTally>, window_secs: u64) -> Vec<IpStat> {
    let mut list: Vec<(&str, IpTally)> = ips.iter().map(|(ip, t)| (*ip, *t)).collect();
    list.sort_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(b.0)));
    list.into_iter()
        .map(|(ip, t)| IpStat {
            ip: ip.to_owned(),
            count: t.count,
            bytes: t.bytes,
            pps: rate(t.count, window_secs),
        })
        .collect()
}

fn top_ips(ips: &HashMap<&str, IpTally>, limit: usize, window_secs: u64) -> Vec<IpStat> {
    let mut list = sorted_ips(ips, window_secs);
    list.truncate(limit);
    list
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NOW: i64 = 1_700_000_000_000;

    fn tcp(ip: &str, ts: i64) -> TrafficEvent {
        TrafficEvent::new(ip, Protocol::Tcp, ts).with_port(443).with_bytes(100)
    }

    fn one_minute() -> Aggregator {
        Aggregator::new(AggregatorConfig {
            window: Window::OneMinute,
            ..AggregatorConfig::default()
        })
    }

    fn bucket<'a>(snap: &'a Snapshot, network: &str) -> &'a SubnetSummary {
        snap.subnets.iter().find(|s| s.network == network).unwrap()
    }

    #[test]
    fn groups_by_slash16() {
        let mut agg = one_minute();
        agg.add_event(tcp("192.168.1.100", NOW));
        agg.add_event(tcp("192.168.1.100", NOW));
        agg.add_event(tcp("192.168.1.200", NOW));
        agg.add_event(tcp("10.0.0.5", NOW));

        let snap = agg.build_snapshot_at(NOW);
        assert_eq!(snap.summary.total_packets, 4);
        assert_eq!(snap.summary.total_unique_ips, 3);

        let lan = bucket(&snap, "192.168.0.0/16");
        assert_eq!(lan.count, 3);
        assert_eq!(lan.unique_ips, 2);
        assert_eq!(lan.parent_network.as_deref(), Some("192.0.0.0/8"));
        assert!(lan.is_private);
        assert_eq!(lan.top_ips[0].ip, "192.168.1.100");
        assert_eq!(lan.top_ips[0].count, 2);

        let ten = bucket(&snap, "10.0.0.0/16");
        assert_eq!(ten.count, 1);
        assert_eq!(ten.unique_ips, 1);

        assert_eq!(snap.subnets[0].network, "192.168.0.0/16");
        assert_eq!(snap.summary.top_subnets[0].percentage, 75.0);
        assert_eq!(snap.summary.top_subnets[1].percentage, 25.0);
    }

    #[test]
    fn unclassifiable_events_are_dropped() {
        let mut agg = one_minute();
        assert!(!agg.add_event(tcp("not-an-ip", NOW)));
        assert!(!agg.add_event(tcp("300.1.1.1", NOW)));
        assert!(agg.add_event(tcp("1.1.1.1", NOW)));
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn expired_events_never_reach_a_snapshot() {
        let mut agg = one_minute();
        agg.add_event(tcp("10.0.0.1", NOW - 120_000));
        agg.add_event(tcp("10.0.0.2", NOW - 60_001));
        agg.add_event(tcp("10.0.0.3", NOW - 60_000));
        agg.add_event(tcp("10.0.0.4", NOW));

        let snap = agg.build_snapshot_at(NOW);
        assert_eq!(snap.summary.total_packets, 2);
        assert_eq!(agg.len(), 2);
    }

    #[test]
    fn ingest_stays_bounded_by_the_window() {
        let mut agg = one_minute();
        for i in 0..1_000 {
            assert!(agg.ingest(tcp("10.0.0.1", NOW + i), NOW + i));
        }
        // a minute later only the newest events survive, without a snapshot
        let later = NOW + 60_000 + 500;
        assert!(agg.ingest(tcp("10.0.0.2", later), later));
        assert_eq!(agg.len(), 501);

        assert!(!agg.ingest(tcp("10.0.0.3", NOW - 3_600_000), later));
        assert_eq!(agg.len(), 501);
    }

    #[test]
    fn late_arrivals_are_pruned_too() {
        let mut agg = one_minute();
        agg.add_event(tcp("10.0.0.1", NOW));
        agg.add_event(tcp("10.0.0.2", NOW - 90_000));
        agg.add_event(tcp("10.0.0.3", NOW));

        let snap = agg.build_snapshot_at(NOW);
        assert_eq!(snap.summary.total_packets, 2);
        assert_eq!(snap.summary.total_unique_ips, 2);
    }

    #[test]
    fn overflow_merges_into_others() {
        let mut agg = Aggregator::new(AggregatorConfig {
            window: Window::OneMinute,
            subnet_level: SubnetLevel::Slash24,
            max_subnets: 5,
            ..AggregatorConfig::default()
        });
        // ten /24s with 10 - i events each, two distinct hosts per net
        for i in 0_u8..10 {
            for n in 0..(10 - u64::from(i)) {
                let host = if n % 2 == 0 { 1 } else { 2 };
                agg.add_event(tcp(&format!("10.1.{i}.{host}"), NOW));
            }
        }

        let snap = agg.build_snapshot_at(NOW);
        assert_eq!(snap.subnets.len(), 6);

        let others = snap.subnets.last().unwrap();
        assert!(others.is_others());
        // nets 5..9 carry 5+4+3+2+1 events
        assert_eq!(others.count, 15);
        // hosts .1 and .2 in each of nets 5..8, only .1 in net 9
        assert_eq!(others.unique_ips, 9);
        assert_eq!(others.bytes, 1_500);

        let total: u64 = snap.subnets.iter().map(|s| s.count).sum();
        assert_eq!(total, snap.summary.total_packets);
        for s in &snap.subnets {
            assert!(s.unique_ips <= s.count);
        }
        assert_eq!(snap.subnets[0].network, "10.1.0.0/24");
    }

    #[test]
    fn invalid_settings_are_ignored() {
        let mut agg = one_minute();
        assert!(!agg.set_window("2h"));
        assert!(!agg.set_subnet_level("/12"));
        assert_eq!(agg.window(), Window::OneMinute);
        assert_eq!(agg.subnet_level(), SubnetLevel::Slash16);

        assert!(agg.set_window("15m"));
        assert!(agg.set_subnet_level("/8"));
        assert_eq!(agg.window(), Window::FifteenMinutes);
        assert_eq!(agg.subnet_level(), SubnetLevel::Slash8);
    }

    #[test]
    fn level_change_regroups_retained_events() {
        let mut agg = one_minute();
        agg.add_event(tcp("10.1.0.1", NOW));
        agg.add_event(tcp("10.2.0.1", NOW));
        assert_eq!(agg.build_snapshot_at(NOW).subnets.len(), 2);

        agg.set_subnet_level("/8");
        let snap = agg.build_snapshot_at(NOW);
        assert_eq!(snap.subnets.len(), 1);
        assert_eq!(snap.subnets[0].network, "10.0.0.0/8");
        assert_eq!(snap.subnets[0].parent_network, None);
    }

    #[test]
    fn rates_round_to_one_decimal() {
        let mut agg = one_minute();
        for _ in 0..7 {
            agg.add_event(tcp("8.8.8.8", NOW));
        }
        let snap = agg.build_snapshot_at(NOW);
        // 7 / 60 = 0.1166..
        assert_eq!(snap.summary.total_pps, 0.1);
        assert_eq!(snap.subnets[0].label.as_deref(), Some("Google DNS"));
        assert_eq!(snap.subnets[0].protocols.get(&Protocol::Tcp), Some(&7));
    }

    #[test]
    fn empty_snapshot() {
        let mut agg = Aggregator::default();
        let snap = agg.build_snapshot_at(NOW);
        assert_eq!(snap.summary.total_packets, 0);
        assert_eq!(snap.summary.total_pps, 0.0);
        assert!(snap.subnets.is_empty());
        assert!(snap.summary.top_subnets.is_empty());
    }
}
