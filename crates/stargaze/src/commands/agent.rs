//! `stargaze agent`: buffer producer events and serve them to hubs.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use stargaze_core::EventLog;

use crate::agent::{self, AgentState};
use crate::cli::{AgentArgs, GlobalOpts};
use crate::error::CliError;
use crate::ingest::{Ingest, InputSource};

pub async fn handle(args: AgentArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut settings = super::load_config(global)?.agent;
    if let Some(bind) = args.bind {
        settings.bind = bind;
    }
    if let Some(id) = args.agent_id {
        settings.agent_id = Some(id);
    }
    if let Some(capacity) = args.buffer_capacity {
        settings.buffer_capacity = capacity;
    }

    let agent_id = settings.resolved_agent_id();
    let bind = settings.bind_addr()?;
    let capacity = settings.validated_capacity()?;
    let queue = settings.validated_ingest_queue()?;
    let api_key = stargaze_config::resolve_api_key(&settings, &agent_id);
    if api_key.is_none() {
        warn!("no API key configured, /api/events and /api/info are unprotected");
    }

    let log = Arc::new(EventLog::with_capacity(capacity));
    let cancel = CancellationToken::new();

    let source = args
        .input
        .as_deref()
        .map_or(InputSource::Stdin, InputSource::from_path);
    let sink = Arc::clone(&log);
    let ingest = Ingest::spawn(source, queue, cancel.child_token(), move |event| {
        sink.push(event);
    });

    let listener = TcpListener::bind(bind).await?;
    if !global.quiet {
        eprintln!(
            "stargaze agent [{agent_id}] listening on http://{} (buffer {capacity})",
            listener.local_addr()?
        );
    }

    let state = Arc::new(AgentState {
        agent_id,
        log,
        api_key,
        started: std::time::Instant::now(),
    });
    let server = tokio::spawn(agent::serve(listener, state, cancel.clone()));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("agent shutting down");
        }
        result = server => {
            ingest.abort();
            return match result {
                Ok(served) => Ok(served?),
                Err(e) => Err(CliError::Io(std::io::Error::other(e))),
            };
        }
    }

    cancel.cancel();
    ingest.abort();
    Ok(())
}
