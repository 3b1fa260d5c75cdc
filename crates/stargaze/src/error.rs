//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use stargaze_config::ConfigError;
use stargaze_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach agent at {endpoint}")]
    #[diagnostic(
        code(stargaze::unreachable),
        help(
            "Check that `stargaze agent` is running there and the port is open.\n\
             Reason: {reason}"
        )
    )]
    Unreachable { endpoint: String, reason: String },

    #[error("Agent API error: {message}")]
    #[diagnostic(code(stargaze::api_error))]
    Api { message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("Agent '{id}' not found")]
    #[diagnostic(
        code(stargaze::not_found),
        help("Run: stargaze agents list to see registered agents")
    )]
    AgentNotFound { id: String },

    #[error("Agent '{id}' is already registered")]
    #[diagnostic(
        code(stargaze::conflict),
        help("Remove it first with: stargaze agents remove {id}")
    )]
    DuplicateAgent { id: String },

    #[error("Agent limit of {max} reached")]
    #[diagnostic(
        code(stargaze::agent_limit),
        help("Raise hub.max_agents in the config file or remove an unused agent.")
    )]
    AgentLimit { max: usize },

    #[error("Unknown data source '{source_id}'")]
    #[diagnostic(
        code(stargaze::unknown_source),
        help("Use --source local or one of the ids from: stargaze agents list")
    )]
    UnknownSource { source_id: String },

    #[error("No traffic in {network} for the current window")]
    #[diagnostic(
        code(stargaze::empty_subnet),
        help("The network must match the active subnet level, e.g. 10.1.0.0/16 at /16.")
    )]
    EmptySubnet { network: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(stargaze::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(stargaze::config),
        help("Inspect the effective settings with: stargaze config show")
    )]
    Config(#[from] ConfigError),

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(code(stargaze::config_exists), help("Pass --force to overwrite it."))]
    ConfigExists { path: String },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    #[diagnostic(code(stargaze::serialization))]
    Serialization(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Unreachable { .. } | Self::Api { .. } => exit_code::CONNECTION,
            Self::AgentNotFound { .. } | Self::UnknownSource { .. } | Self::EmptySubnet { .. } => {
                exit_code::NOT_FOUND
            }
            Self::DuplicateAgent { .. } | Self::AgentLimit { .. } | Self::ConfigExists { .. } => {
                exit_code::CONFLICT
            }
            Self::Validation { .. } => exit_code::USAGE,
            Self::Config(_) | Self::Io(_) | Self::Serialization(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AgentLimitReached { max } => CliError::AgentLimit { max },
            CoreError::DuplicateAgent { id } => CliError::DuplicateAgent { id },
            CoreError::AgentNotFound { id } => CliError::AgentNotFound { id },
            CoreError::Unreachable { endpoint, reason } => {
                CliError::Unreachable { endpoint, reason }
            }
            CoreError::Api { message, .. } => CliError::Api { message },
            CoreError::Config { message } => CliError::Validation {
                field: "endpoint".into(),
                reason: message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let code = |e: CoreError| CliError::from(e).exit_code();
        assert_eq!(code(CoreError::AgentLimitReached { max: 20 }), exit_code::CONFLICT);
        assert_eq!(
            code(CoreError::DuplicateAgent { id: "a".into() }),
            exit_code::CONFLICT
        );
        assert_eq!(
            code(CoreError::AgentNotFound { id: "a".into() }),
            exit_code::NOT_FOUND
        );
        assert_eq!(
            code(CoreError::Unreachable {
                endpoint: "http://x".into(),
                reason: "refused".into()
            }),
            exit_code::CONNECTION
        );
        assert_eq!(
            code(CoreError::Config {
                message: "bad url".into()
            }),
            exit_code::USAGE
        );
    }
}
