// ── IPv4 classification ──
//
// Pure address → hierarchical subnet identity. Runs on every ingested
// event, so the result is `Copy` and carries no heap data: networks are
// kept as `Ipv4Addr` + prefix length and only formatted on output.

use std::fmt;
use std::net::Ipv4Addr;

use crate::model::SubnetLevel;

// ── Subnet ──────────────────────────────────────────────────────────

/// A masked network at one prefix length, with its provider label if known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix_len: u8,
    label: Option<&'static str>,
}

impl Subnet {
    fn of(addr: Ipv4Addr, prefix_len: u8) -> Self {
        let mask = u32::MAX << (32 - u32::from(prefix_len));
        let network = Ipv4Addr::from(u32::from(addr) & mask);
        Self {
            network,
            prefix_len,
            label: lookup_label(network, prefix_len),
        }
    }

    /// Parse `a.b.c.d/len`. The address must already be masked to `len`.
    pub fn parse(cidr: &str) -> Option<Self> {
        let (addr, len) = cidr.split_once('/')?;
        let prefix_len: u8 = len.parse().ok()?;
        SubnetLevel::from_prefix_len(prefix_len)?;
        let addr = parse_ipv4(addr)?;
        let subnet = Self::of(addr, prefix_len);
        (subnet.network == addr).then_some(subnet)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn label(&self) -> Option<&'static str> {
        self.label
    }

    /// Grouping key, unique within one prefix length.
    pub(crate) fn key(&self) -> u32 {
        u32::from(self.network)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Everything derived from one source address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpClassification {
    pub address: Ipv4Addr,
    pub slash8: Subnet,
    pub slash16: Subnet,
    pub slash24: Subnet,
    pub is_private: bool,
    pub is_reserved: bool,
}

impl IpClassification {
    pub fn subnet(&self, level: SubnetLevel) -> Subnet {
        match level {
            SubnetLevel::Slash8 => self.slash8,
            SubnetLevel::Slash16 => self.slash16,
            SubnetLevel::Slash24 => self.slash24,
        }
    }

    /// The enclosing network one level up, `None` at `/8`.
    pub fn parent(&self, level: SubnetLevel) -> Option<Subnet> {
        level.parent().map(|p| self.subnet(p))
    }
}

/// Classify a dotted-quad IPv4 address.
///
/// Returns `None` for anything that is not exactly four decimal octets in
/// `0..=255`. Leading zeros are accepted (`010.0.0.1` is `10.0.0.1`).
pub fn classify(ip: &str) -> Option<IpClassification> {
    let address = parse_ipv4(ip)?;
    let [a, b, c, _] = address.octets();

    let is_private = a == 10 || (a == 172 && (16..=31).contains(&b)) || (a == 192 && b == 168);
    let is_reserved = a == 0
        || a == 127
        || a >= 224
        || (a == 169 && b == 254)
        || (a == 192 && b == 0 && c == 2)
        || (a == 198 && b == 51 && c == 100)
        || (a == 203 && b == 0 && c == 113);

    Some(IpClassification {
        address,
        slash8: Subnet::of(address, 8),
        slash16: Subnet::of(address, 16),
        slash24: Subnet::of(address, 24),
        is_private,
        is_reserved,
    })
}

fn parse_ipv4(raw: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = raw.split('.');
    for slot in &mut octets {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *slot = part.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}

// ── Provider labels ─────────────────────────────────────────────────

/// Exact-network label table. Each level is looked up independently, so
/// `8.8.8.0/24` and `8.8.0.0/16` both resolve.
const KNOWN_NETWORKS: &[(Ipv4Addr, u8, &str)] = &[
    (Ipv4Addr::new(8, 8, 0, 0), 16, "Google DNS"),
    (Ipv4Addr::new(8, 8, 8, 0), 24, "Google DNS"),
    (Ipv4Addr::new(1, 1, 0, 0), 16, "Cloudflare DNS"),
    (Ipv4Addr::new(1, 0, 0, 0), 16, "Cloudflare DNS"),
    (Ipv4Addr::new(9, 0, 0, 0), 8, "IBM"),
    (Ipv4Addr::new(13, 0, 0, 0), 8, "Microsoft Azure"),
    (Ipv4Addr::new(20, 0, 0, 0), 8, "Microsoft Azure"),
    (Ipv4Addr::new(34, 0, 0, 0), 8, "Google Cloud"),
    (Ipv4Addr::new(35, 0, 0, 0), 8, "Google Cloud"),
    (Ipv4Addr::new(52, 0, 0, 0), 8, "Amazon AWS"),
    (Ipv4Addr::new(54, 0, 0, 0), 8, "Amazon AWS"),
    (Ipv4Addr::new(104, 0, 0, 0), 8, "Cloudflare / Akamai"),
    (Ipv4Addr::new(142, 250, 0, 0), 16, "Google"),
    (Ipv4Addr::new(151, 101, 0, 0), 16, "Fastly CDN"),
    (Ipv4Addr::new(172, 217, 0, 0), 16, "Google"),
    (Ipv4Addr::new(185, 199, 0, 0), 16, "GitHub"),
    (Ipv4Addr::new(192, 30, 0, 0), 16, "GitHub"),
    (Ipv4Addr::new(198, 41, 0, 0), 16, "Cloudflare"),
    (Ipv4Addr::new(199, 232, 0, 0), 16, "Fastly CDN"),
    (Ipv4Addr::new(203, 0, 113, 0), 24, "TEST-NET-3 (RFC 5737)"),
    (Ipv4Addr::new(198, 51, 100, 0), 24, "TEST-NET-2 (RFC 5737)"),
    (Ipv4Addr::new(192, 0, 2, 0), 24, "TEST-NET-1 (RFC 5737)"),
];

fn lookup_label(network: Ipv4Addr, prefix_len: u8) -> Option<&'static str> {
    KNOWN_NETWORKS
        .iter()
        .find(|(net, len, _)| *len == prefix_len && *net == network)
        .map(|(_, _, label)| *label)
}
