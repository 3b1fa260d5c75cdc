//! Agent registry command handlers.

use secrecy::SecretString;
use tabled::Tabled;

use stargaze_api::HealthResponse;
use stargaze_core::{AgentRegistry, AgentStatus, Collector};

use crate::cli::{AgentsArgs, AgentsCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct AgentRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Endpoint")]
    endpoint: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Health")]
    health: String,
}

impl AgentRow {
    fn new(a: &AgentStatus, color: bool) -> Self {
        Self {
            id: a.id.clone(),
            label: a.label.clone(),
            endpoint: a.endpoint.clone(),
            enabled: if a.enabled { "yes" } else { "no" }.into(),
            health: output::paint_health(a.health, color),
        }
    }
}

fn health_detail(h: &HealthResponse) -> String {
    use std::fmt::Write;
    let mut out = format!("agent    {}\n", h.agent_id);
    if let Some(ref status) = h.status {
        let _ = writeln!(out, "status   {status}");
    }
    if let Some(ref version) = h.version {
        let _ = writeln!(out, "version  {version}");
    }
    if let Some(uptime) = h.uptime {
        let _ = writeln!(out, "uptime   {uptime}s");
    }
    if let (Some(size), Some(cap)) = (h.buffer_size, h.buffer_capacity) {
        let _ = writeln!(out, "buffer   {size}/{cap}");
    }
    out.trim_end().to_owned()
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: AgentsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let hub = super::load_config(global)?.hub;
    let registry = AgentRegistry::open(super::registry_path(global, &hub));
    let collector = Collector::new(hub.collector_config()?, registry);
    let color = output::should_color(&global.color);

    match args.command {
        AgentsCommand::List => {
            let agents = collector.list_agents();
            let out = output::render_list(
                &global.output,
                &agents,
                |a| AgentRow::new(a, color),
                |a| a.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        AgentsCommand::Add {
            endpoint,
            api_key,
            label,
        } => {
            let credential = SecretString::from(api_key.unwrap_or_default());
            let record = collector.add_agent(&endpoint, credential, &label).await?;
            if !global.quiet {
                eprintln!("Agent '{}' added", record.id);
            }
            Ok(())
        }

        AgentsCommand::Remove { id } => {
            collector.remove_agent(&id)?;
            if !global.quiet {
                eprintln!("Agent '{id}' removed");
            }
            Ok(())
        }

        AgentsCommand::Enable { id } => set_enabled(&collector, &id, true, global.quiet),
        AgentsCommand::Disable { id } => set_enabled(&collector, &id, false, global.quiet),

        AgentsCommand::Test { endpoint } => {
            let health = collector.test_agent(&endpoint, None).await?;
            let out = output::render_single(&global.output, &health, health_detail, |h| {
                h.agent_id.clone()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

fn set_enabled(collector: &Collector, id: &str, enabled: bool, quiet: bool) -> Result<(), CliError> {
    collector.set_agent_enabled(id, enabled)?;
    if !quiet {
        let state = if enabled { "enabled" } else { "disabled" };
        eprintln!("Agent '{id}' {state}");
    }
    Ok(())
}
