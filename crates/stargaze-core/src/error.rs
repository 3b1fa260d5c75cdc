// ── Core error types ──
//
// Errors surfaced by collector management operations. Polling itself
// never returns these: a failed poll is a `PollOutcome::Failed` that only
// moves the agent's health and backoff. The `From<stargaze_api::Error>`
// impl translates transport-layer errors into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Agent management ─────────────────────────────────────────────
    #[error("Maximum agent limit ({max}) reached")]
    AgentLimitReached { max: usize },

    #[error("Agent with id \"{id}\" already exists")]
    DuplicateAgent { id: String },

    #[error("Agent not found: {id}")]
    AgentNotFound { id: String },

    #[error("Cannot reach agent at {endpoint}: {reason}")]
    Unreachable { endpoint: String, reason: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("Agent API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if the agent answered).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<stargaze_api::Error> for CoreError {
    fn from(err: stargaze_api::Error) -> Self {
        match err {
            stargaze_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid agent endpoint: {e}"),
            },
            stargaze_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS setup failed: {msg}"),
            },
            stargaze_api::Error::InvalidCredential { message } => CoreError::Config {
                message: format!("Invalid credential: {message}"),
            },
            other => {
                let status = other.status();
                CoreError::Api {
                    message: other.to_string(),
                    status,
                }
            }
        }
    }
}
