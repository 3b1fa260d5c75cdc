//! `stargaze hub`: poll agents, aggregate, render snapshots.

use std::fmt::Write as _;

use tabled::Tabled;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use stargaze_core::{
    Aggregator, AgentRegistry, Collector, ProtocolBreakdown, SharedAggregator, Snapshot,
    SubnetDetail, SubnetSummary,
};

use crate::cli::{GlobalOpts, HubArgs, OutputFormat};
use crate::error::CliError;
use crate::ingest::{Ingest, InputSource};
use crate::output;

/// Name of the hub's own data source.
const LOCAL_SOURCE: &str = "local";

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct SubnetRow {
    #[tabled(rename = "Network")]
    network: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Packets")]
    count: u64,
    #[tabled(rename = "IPs")]
    unique_ips: u64,
    #[tabled(rename = "Bytes")]
    bytes: u64,
    #[tabled(rename = "PPS")]
    pps: f64,
    #[tabled(rename = "Scope")]
    scope: String,
    #[tabled(rename = "Top source")]
    top_ip: String,
}

impl SubnetRow {
    fn new(s: &SubnetSummary, color: bool) -> Self {
        Self {
            network: s.network.clone(),
            label: s.label.clone().unwrap_or_default(),
            count: s.count,
            unique_ips: s.unique_ips,
            bytes: s.bytes,
            pps: s.pps,
            scope: output::paint_private(s.is_private, color),
            top_ip: s
                .top_ips
                .first()
                .map(|ip| format!("{} ({})", ip.ip, ip.count))
                .unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct ProtocolRow {
    #[tabled(rename = "Protocol")]
    protocol: &'static str,
    #[tabled(rename = "Packets")]
    count: u64,
    #[tabled(rename = "Bytes")]
    bytes: u64,
    #[tabled(rename = "PPS")]
    pps: f64,
    #[tabled(rename = "Top ports")]
    ports: String,
}

impl ProtocolRow {
    fn new(protocol: &'static str, b: &ProtocolBreakdown) -> Self {
        let ports = b
            .top_ports
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|p| match p.label {
                Some(label) => format!("{}/{label} ({})", p.port, p.count),
                None => format!("{} ({})", p.port, p.count),
            })
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            protocol,
            count: b.count,
            bytes: b.bytes,
            pps: b.pps,
            ports,
        }
    }
}

// ── Renderers ───────────────────────────────────────────────────────

fn snapshot_table(snap: &Snapshot, color: bool) -> String {
    let s = &snap.summary;
    let mut out = format!(
        "window {} | level {} | {} packets | {} IPs | {} bytes | {} pps\n",
        snap.window, snap.subnet_level, s.total_packets, s.total_unique_ips, s.total_bytes, s.total_pps
    );
    let rows: Vec<SubnetRow> = snap.subnets.iter().map(|b| SubnetRow::new(b, color)).collect();
    out.push_str(&output::render_table(&rows));
    out
}

fn render_snapshot(format: &OutputFormat, snap: &Snapshot, color: bool) -> Result<String, CliError> {
    match format {
        // one object per line so the stream stays machine-readable
        OutputFormat::Json | OutputFormat::JsonCompact => {
            output::render_single(&OutputFormat::JsonCompact, snap, |_| String::new(), |_| String::new())
        }
        OutputFormat::Yaml => Ok(format!(
            "---\n{}",
            output::render_single(format, snap, |_| String::new(), |_| String::new())?
        )),
        OutputFormat::Table => Ok(snapshot_table(snap, color)),
        OutputFormat::Plain => Ok(snap
            .subnets
            .iter()
            .map(|b| format!("{}\t{}", b.network, b.count))
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

fn detail_table(d: &SubnetDetail) -> String {
    let mut out = String::new();
    let _ = write!(out, "{}", d.network);
    if let Some(ref label) = d.label {
        let _ = write!(out, " ({label})");
    }
    let _ = writeln!(out, ": {} packets, {} sources", d.total_packets, d.all_ips.len());

    let p = &d.protocol_detail;
    let rows = [
        ProtocolRow::new("TCP", &p.tcp),
        ProtocolRow::new("UDP", &p.udp),
        ProtocolRow::new("ICMP", &p.icmp),
    ];
    out.push_str(&output::render_table(&rows));
    out
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: HubArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = super::load_config(global)?;
    let mut hub = cfg.hub;
    if let Some(window) = args.window {
        hub.window = window;
    }
    if let Some(level) = args.level {
        hub.subnet_level = level;
    }
    let config = hub.collector_config()?;
    let queue = cfg.agent.validated_ingest_queue()?;

    let registry = AgentRegistry::open(super::registry_path(global, &hub));
    let collector = Collector::new(config.clone(), registry);
    let local = SharedAggregator::new(Aggregator::new(config.aggregator.clone()));
    let cancel = CancellationToken::new();

    let ingest = args.input.as_deref().map(|path| {
        let sink = local.clone();
        Ingest::spawn(InputSource::from_path(path), queue, cancel.child_token(), move |event| {
            sink.add_event(event);
        })
    });

    let target = if args.source == LOCAL_SOURCE {
        local.clone()
    } else {
        collector
            .aggregator(&args.source)
            .ok_or_else(|| CliError::UnknownSource {
                source_id: args.source.clone(),
            })?
    };

    let result = match args.detail {
        Some(network) => {
            // fill the source once, then report
            match ingest {
                Some(ingest) if args.source == LOCAL_SOURCE => {
                    ingest.finished().await;
                }
                _ => {
                    collector.poll_once().await;
                }
            }
            print_detail(&target, &network, global)
        }
        None => {
            collector.start();
            let streamed = stream_snapshots(&target, args.count, global).await;
            if let Some(ingest) = ingest {
                ingest.abort();
            }
            streamed
        }
    };

    cancel.cancel();
    collector.destroy();
    local.destroy();
    result
}

fn print_detail(target: &SharedAggregator, network: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let detail = target
        .build_subnet_detail(network)
        .ok_or_else(|| CliError::EmptySubnet {
            network: network.to_owned(),
        })?;
    let out = output::render_single(&global.output, &detail, detail_table, |d| {
        d.all_ips
            .iter()
            .map(|ip| ip.ip.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

async fn stream_snapshots(
    target: &SharedAggregator,
    count: Option<u64>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let (tx, mut rx) = mpsc::channel::<Snapshot>(4);
    target.start_periodic_snapshot(move |snap| {
        if tx.try_send(snap).is_err() {
            debug!("renderer behind, dropping snapshot");
        }
    });

    let mut printed = 0_u64;
    let result = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                info!("hub shutting down");
                break signal.map_err(CliError::from);
            }
            snap = rx.recv() => {
                let Some(snap) = snap else { break Ok(()) };
                let out = match render_snapshot(&global.output, &snap, color) {
                    Ok(out) => out,
                    Err(e) => break Err(e),
                };
                output::print_output(&out, global.quiet);
                printed += 1;
                if count.is_some_and(|n| printed >= n) {
                    break Ok(());
                }
            }
        }
    };

    target.stop_periodic_snapshot();
    result
}
