// ── Wire-to-domain conversions ──
//
// Bridges `stargaze_api` wire records and core domain types in both
// directions: the hub turns polled records into `TrafficEvent`s, the agent
// turns buffered events back into records for `/api/events`.

use stargaze_api::EventRecord;

use crate::event_log::BufferedEvent;
use crate::model::{Protocol, TrafficEvent};

impl From<EventRecord> for TrafficEvent {
    fn from(record: EventRecord) -> Self {
        Self {
            protocol: Protocol::from_wire(&record.protocol),
            source_ip: record.source_ip,
            dest_port: record.dest_port,
            timestamp: record.timestamp,
            bytes: record.bytes,
        }
    }
}

impl From<&BufferedEvent> for EventRecord {
    fn from(buffered: &BufferedEvent) -> Self {
        let ev = &buffered.event;
        Self {
            source_ip: ev.source_ip.clone(),
            dest_port: ev.dest_port,
            protocol: ev.protocol.as_str().to_owned(),
            timestamp: ev.timestamp,
            bytes: ev.bytes,
            seq: buffered.seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_to_event_maps_protocol() {
        let record = EventRecord {
            source_ip: "52.1.2.3".into(),
            dest_port: Some(443),
            protocol: "tcp".into(),
            timestamp: 42,
            bytes: 1500,
            seq: 9,
        };
        let ev = TrafficEvent::from(record);
        assert_eq!(ev.protocol, Protocol::Tcp);
        assert_eq!(ev.dest_port, Some(443));
        assert_eq!(ev.timestamp, 42);
    }

    #[test]
    fn buffered_event_to_record_keeps_seq() {
        let buffered = BufferedEvent {
            seq: 17,
            event: TrafficEvent::new("10.0.0.1", Protocol::Icmp, 5).with_bytes(64),
        };
        let record = EventRecord::from(&buffered);
        assert_eq!(record.seq, 17);
        assert_eq!(record.protocol, "ICMP");
        assert_eq!(record.dest_port, None);
    }
}
