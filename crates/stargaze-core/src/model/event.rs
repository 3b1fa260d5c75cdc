use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Transport protocol of a traffic event.
///
/// Anything the producer reports that is not TCP, UDP or ICMP lands in
/// [`Protocol::Other`] instead of failing the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Other,
}

impl Protocol {
    /// Case-insensitive mapping from the producer's protocol string.
    pub fn from_wire(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("tcp") {
            Self::Tcp
        } else if raw.eq_ignore_ascii_case("udp") {
            Self::Udp
        } else if raw.eq_ignore_ascii_case("icmp") {
            Self::Icmp
        } else {
            Self::Other
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Icmp => "ICMP",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Protocol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&raw))
    }
}

/// One observed packet (or flow sample) from a producer.
///
/// Not validated beyond classification: an unparseable `source_ip` is
/// dropped by the aggregator, not rejected here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficEvent {
    pub source_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_port: Option<u16>,
    pub protocol: Protocol,
    /// Milliseconds since the Unix epoch, on the hub's clock once corrected.
    pub timestamp: i64,
    #[serde(default)]
    pub bytes: u64,
}

impl TrafficEvent {
    pub fn new(source_ip: impl Into<String>, protocol: Protocol, timestamp: i64) -> Self {
        Self {
            source_ip: source_ip.into(),
            dest_port: None,
            protocol,
            timestamp,
            bytes: 0,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.dest_port = Some(port);
        self
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = bytes;
        self
    }
}
