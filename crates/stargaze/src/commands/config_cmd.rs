//! Config subcommand handlers.

use stargaze_config::{Config, config_path};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = global.config.clone().unwrap_or_else(config_path);

    match args.command {
        ConfigCommand::Show => {
            let cfg = super::load_config(global)?.redacted();
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(&cfg)
                    .map_err(|e| CliError::Serialization(e.to_string()))?,
                ref format => output::render_single(format, &cfg, |_| String::new(), |_| String::new())?,
            };
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            stargaze_config::save_config(&Config::default(), &path)?;
            if !global.quiet {
                eprintln!("Config written to {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::SetKey { agent_id, key } => {
            let agent_id = match agent_id {
                Some(id) => id,
                None => super::load_config(global)?.agent.resolved_agent_id(),
            };
            stargaze_config::store_api_key(&agent_id, &key)?;
            if !global.quiet {
                eprintln!("API key for '{agent_id}' stored in the system keyring");
            }
            Ok(())
        }
    }
}
