// Per-subnet drill-down: every source IP plus a fixed TCP/UDP/ICMP breakdown.

use std::collections::HashMap;

use super::{Aggregator, IpTally, rate, sorted_ips};
use crate::classify::Subnet;
use crate::model::{PortStat, Protocol, ProtocolBreakdown, ProtocolDetail, SubnetDetail};

#[derive(Default)]
struct ProtoTally {
    count: u64,
    bytes: u64,
    ports: HashMap<u16, u64>,
}

impl ProtoTally {
    fn breakdown(&self, window_secs: u64, top_ports: Option<usize>) -> ProtocolBreakdown {
        ProtocolBreakdown {
            count: self.count,
            bytes: self.bytes,
            pps: rate(self.count, window_secs),
            top_ports: top_ports.map(|k| self.top_ports(k)),
        }
    }

    fn top_ports(&self, k: usize) -> Vec<PortStat> {
        let mut ports: Vec<(u16, u64)> = self.ports.iter().map(|(p, n)| (*p, *n)).collect();
        ports.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ports
            .into_iter()
            .take(k)
            .map(|(port, count)| PortStat {
                port,
                count,
                label: port_label(port),
            })
            .collect()
    }
}

impl Aggregator {
    pub fn build_subnet_detail(&mut self, network: &str) -> Option<SubnetDetail> {
        self.build_subnet_detail_at(network, crate::now_ms())
    }

    /// Rescan retained events for `network` at the current level.
    ///
    /// `None` when the network is malformed, belongs to another level, or
    /// has no traffic in the current window.
    pub fn build_subnet_detail_at(&mut self, network: &str, now_ms: i64) -> Option<SubnetDetail> {
        self.prune(now_ms);

        let level = self.config.subnet_level;
        let target = Subnet::parse(network)?;
        if target.prefix_len() != level.prefix_len() {
            return None;
        }

        let window_secs = self.config.window.seconds();
        let mut ips: HashMap<&str, IpTally> = HashMap::new();
        let mut tcp = ProtoTally::default();
        let mut udp = ProtoTally::default();
        let mut icmp = ProtoTally::default();
        let mut total = 0_u64;

        for entry in self
            .events
            .iter()
            .filter(|e| e.class.subnet(level).key() == target.key())
        {
            let ev = &entry.event;
            total += 1;
            ips.entry(ev.source_ip.as_str()).or_default().add(ev.bytes);

            let tally = match ev.protocol {
                Protocol::Tcp => &mut tcp,
                Protocol::Udp => &mut udp,
                Protocol::Icmp => &mut icmp,
                Protocol::Other => continue,
            };
            tally.count += 1;
            tally.bytes += ev.bytes;
            if let Some(port) = ev.dest_port {
                *tally.ports.entry(port).or_default() += 1;
            }
        }

        if total == 0 {
            return None;
        }

        let k = self.config.top_ports;
        Some(SubnetDetail {
            network: target.to_string(),
            label: target.label().map(str::to_owned),
            total_packets: total,
            all_ips: sorted_ips(&ips, window_secs),
            protocol_detail: ProtocolDetail {
                tcp: tcp.breakdown(window_secs, Some(k)),
                udp: udp.breakdown(window_secs, Some(k)),
                icmp: icmp.breakdown(window_secs, None),
            },
        })
    }
}

/// Human name for well-known destination ports.
pub fn port_label(port: u16) -> Option<&'static str> {
    Some(match port {
        21 => "FTP",
        22 => "SSH",
        25 => "SMTP",
        53 => "DNS",
        80 => "HTTP",
        110 => "POP3",
        143 => "IMAP",
        443 => "HTTPS",
        993 => "IMAPS",
        995 => "POP3S",
        3306 => "MySQL",
        3389 => "RDP",
        5432 => "PostgreSQL",
        6379 => "Redis",
        8080 => "HTTP-Alt",
        27017 => "MongoDB",
        _ => return None,
    })
}
