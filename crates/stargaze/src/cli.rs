//! Clap derive structures for the `stargaze` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// stargaze -- live traffic by source subnet, from one host or many
#[derive(Debug, Parser)]
#[command(
    name = "stargaze",
    version,
    about = "Watch live traffic grouped by source subnet",
    long_about = "Aggregates packet events over a sliding window into /8, /16 or /24\n\
        source subnets. Run `stargaze agent` next to each capture point and\n\
        `stargaze hub` to poll them and render snapshots.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config dir)
    #[arg(long, env = "STARGAZE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Agent registry document (overrides config)
    #[arg(long, env = "STARGAZE_REGISTRY", global = true)]
    pub registry: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "STARGAZE_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll agents and render subnet snapshots
    Hub(HubArgs),

    /// Buffer local events and serve them to hubs over HTTP
    Agent(AgentArgs),

    /// Manage the agents a hub polls
    #[command(alias = "a")]
    Agents(AgentsArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Hub ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct HubArgs {
    /// Data source to render: "local" or an agent id
    #[arg(long, short = 's', default_value = "local")]
    pub source: String,

    /// NDJSON traffic events for the local source ("-" for stdin)
    #[arg(long, short = 'i')]
    pub input: Option<PathBuf>,

    /// Trailing window (1m, 5m, 15m, 1h)
    #[arg(long, short = 'w')]
    pub window: Option<String>,

    /// Subnet grouping level (/8, /16, /24)
    #[arg(long, short = 'l')]
    pub level: Option<String>,

    /// Print the breakdown of one subnet instead of snapshots
    #[arg(long, value_name = "NETWORK")]
    pub detail: Option<String>,

    /// Exit after this many snapshots
    #[arg(long, short = 'n')]
    pub count: Option<u64>,
}

// ── Agent ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AgentArgs {
    /// Listen address (overrides config)
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Agent id reported to hubs (overrides config)
    #[arg(long)]
    pub agent_id: Option<String>,

    /// Ring buffer capacity in events (overrides config)
    #[arg(long)]
    pub buffer_capacity: Option<usize>,

    /// NDJSON traffic events to buffer ("-" for stdin, the default)
    #[arg(long, short = 'i')]
    pub input: Option<PathBuf>,
}

// ── Agents ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AgentsArgs {
    #[command(subcommand)]
    pub command: AgentsCommand,
}

#[derive(Debug, Subcommand)]
pub enum AgentsCommand {
    /// List registered agents
    #[command(alias = "ls")]
    List,

    /// Probe an agent and register it under the id it reports
    Add {
        /// Agent base URL (e.g., "http://10.0.0.5:15119")
        endpoint: String,

        /// Bearer token the agent expects
        #[arg(long, env = "STARGAZE_AGENT_API_KEY", hide_env = true)]
        api_key: Option<String>,

        /// Display label
        #[arg(long, default_value = "")]
        label: String,
    },

    /// Forget an agent
    #[command(alias = "rm")]
    Remove {
        /// Agent id
        id: String,
    },

    /// Resume polling an agent
    Enable {
        /// Agent id
        id: String,
    },

    /// Stop polling an agent, keeping its record
    Disable {
        /// Agent id
        id: String,
    },

    /// Probe an endpoint without registering it
    Test {
        /// Agent base URL
        endpoint: String,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (secrets masked)
    Show,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the config file path
    Path,

    /// Store the agent API key in the system keyring
    SetKey {
        /// Agent id the key belongs to (defaults to the configured id)
        #[arg(long)]
        agent_id: Option<String>,

        /// The key
        key: String,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
