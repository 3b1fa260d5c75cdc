use std::collections::BTreeMap;

use serde::Serialize;

use super::{Protocol, SubnetLevel, Window};

/// A fully recomputed aggregation result for the active window and level.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Hub wall-clock time the snapshot was built at (ms).
    pub timestamp: i64,
    pub window: Window,
    pub subnet_level: SubnetLevel,
    pub summary: Summary,
    /// Descending by count, capped; overflow merged into a trailing "Others".
    pub subnets: Vec<SubnetSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_packets: u64,
    pub total_unique_ips: u64,
    pub total_bytes: u64,
    /// Packets per second over the window, one decimal.
    pub total_pps: f64,
    pub top_subnets: Vec<TopSubnet>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopSubnet {
    pub network: String,
    pub label: Option<String>,
    pub count: u64,
    /// Share of `total_packets`, one decimal.
    pub percentage: f64,
}

/// One grouped subnet bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSummary {
    pub network: String,
    pub parent_network: Option<String>,
    pub label: Option<String>,
    pub count: u64,
    pub unique_ips: u64,
    pub bytes: u64,
    pub pps: f64,
    pub is_private: bool,
    pub protocols: BTreeMap<Protocol, u64>,
    pub top_ips: Vec<IpStat>,
}

impl SubnetSummary {
    /// Network name of the synthetic overflow bucket.
    pub const OTHERS: &'static str = "Others";

    pub fn is_others(&self) -> bool {
        self.network == Self::OTHERS
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpStat {
    pub ip: String,
    pub count: u64,
    pub bytes: u64,
    pub pps: f64,
}

/// Uncapped per-subnet breakdown for a single network.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetDetail {
    pub network: String,
    pub label: Option<String>,
    pub total_packets: u64,
    pub all_ips: Vec<IpStat>,
    pub protocol_detail: ProtocolDetail,
}

/// Fixed TCP/UDP/ICMP breakdown; other protocols only count toward totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolDetail {
    #[serde(rename = "TCP")]
    pub tcp: ProtocolBreakdown,
    #[serde(rename = "UDP")]
    pub udp: ProtocolBreakdown,
    #[serde(rename = "ICMP")]
    pub icmp: ProtocolBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolBreakdown {
    pub count: u64,
    pub bytes: u64,
    pub pps: f64,
    /// Present for TCP and UDP only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_ports: Option<Vec<PortStat>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortStat {
    pub port: u16,
    pub count: u64,
    pub label: Option<&'static str>,
}
