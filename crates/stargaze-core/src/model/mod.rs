// ── Domain model ──
//
// Plain data types shared by every core component. Wire-facing names
// (snapshot and detail objects) serialize camelCase for the presentation
// layer.

mod agent;
mod event;
mod settings;
mod snapshot;

pub use agent::AgentStatus;
pub use event::{Protocol, TrafficEvent};
pub use settings::{SubnetLevel, Window};
pub use snapshot::{
    IpStat, PortStat, ProtocolBreakdown, ProtocolDetail, Snapshot, SubnetDetail, SubnetSummary,
    Summary, TopSubnet,
};
