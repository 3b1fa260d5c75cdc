//! Command handlers, one module per top-level subcommand.

pub mod agent;
pub mod agents;
pub mod config_cmd;
pub mod hub;

use std::path::PathBuf;

use stargaze_config::{Config, HubSettings};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file plus environment, honoring `--config`.
pub(crate) fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(stargaze_config::load_config(global.config.as_deref())?)
}

/// `--registry` wins over the configured path.
pub(crate) fn registry_path(global: &GlobalOpts, hub: &HubSettings) -> PathBuf {
    global
        .registry
        .clone()
        .unwrap_or_else(|| hub.registry_path())
}
