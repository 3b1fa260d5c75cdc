// Agent HTTP handlers.
//
// `/api/health` is open; `/api/events` and `/api/info` check the bearer
// token when one is configured.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use stargaze_api::{
    DEFAULT_EVENT_LIMIT, EventRecord, EventsResponse, HealthResponse, InfoResponse,
    MAX_EVENT_LIMIT,
};
use stargaze_core::EventLog;

/// Shared state for axum handlers.
pub struct AgentState {
    pub agent_id: String,
    pub log: Arc<EventLog>,
    pub api_key: Option<SecretString>,
    pub started: std::time::Instant,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn authorized(state: &AgentState, headers: &HeaderMap) -> bool {
    let Some(key) = &state.api_key else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == key.expose_secret())
}

/// GET /api/health - unauthenticated liveness and identity.
pub async fn health(State(state): State<Arc<AgentState>>) -> Json<HealthResponse> {
    let stats = state.log.stats();
    Json(HealthResponse {
        agent_id: state.agent_id.clone(),
        status: Some("ok".into()),
        uptime: Some(state.started.elapsed().as_secs()),
        buffer_size: Some(stats.size),
        buffer_capacity: Some(stats.capacity),
        version: Some(env!("CARGO_PKG_VERSION").into()),
        timestamp: Some(now_ms()),
    })
}

/// `since`/`limit` after validation.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct EventsQuery {
    pub since: Option<u64>,
    pub limit: usize,
}

impl EventsQuery {
    /// Non-numeric `since` or a `limit` below 1 is a client error. A
    /// negative `since` reads from the oldest buffered event; `limit` is
    /// capped at the protocol maximum.
    pub(crate) fn parse(params: &HashMap<String, String>) -> Result<Self, &'static str> {
        let since = match params.get("since") {
            None => None,
            Some(raw) => {
                let n: i64 = raw.trim().parse().map_err(|_| "Invalid since parameter")?;
                Some(u64::try_from(n).unwrap_or(0))
            }
        };
        let limit = match params.get("limit") {
            None => DEFAULT_EVENT_LIMIT,
            Some(raw) => {
                let n: i64 = raw.trim().parse().map_err(|_| "Invalid limit parameter")?;
                if n < 1 {
                    return Err("Invalid limit parameter");
                }
                u32::try_from(n).unwrap_or(MAX_EVENT_LIMIT).min(MAX_EVENT_LIMIT)
            }
        };
        Ok(Self {
            since,
            limit: usize::try_from(limit).unwrap_or(usize::MAX),
        })
    }
}

/// GET /api/events?since=&limit= - resumable read of the ring buffer.
pub async fn events(
    State(state): State<Arc<AgentState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&state, &headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let query = match EventsQuery::parse(&params) {
        Ok(q) => q,
        Err(message) => return error(StatusCode::BAD_REQUEST, message),
    };

    let read = match query.since {
        Some(since) => state.log.read_since(since, query.limit),
        None => state.log.read_all(query.limit),
    };
    let newest = state.log.newest_seq();
    let events: Vec<EventRecord> = read.events.iter().map(|b| EventRecord::from(&**b)).collect();
    let last = events.last().map_or(0, |e| e.seq);

    Json(EventsResponse {
        agent_id: state.agent_id.clone(),
        sequence_start: events.first().map_or(0, |e| e.seq),
        sequence_end: last,
        has_more: !events.is_empty() && last < newest,
        gap_detected: read.gap_detected,
        events,
        server_timestamp: now_ms(),
    })
    .into_response()
}

/// GET /api/info - identity and capabilities.
pub async fn info(State(state): State<Arc<AgentState>>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    Json(InfoResponse {
        agent_id: state.agent_id.clone(),
        hostname: state.agent_id.clone(),
        version: env!("CARGO_PKG_VERSION").into(),
        supported_features: vec!["events".into(), "health".into()],
        timestamp: now_ms(),
    })
    .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(pairs: &[(&str, &str)]) -> Result<EventsQuery, &'static str> {
        let params = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        EventsQuery::parse(&params)
    }

    #[test]
    fn defaults_and_caps() {
        assert_eq!(
            parse(&[]).unwrap(),
            EventsQuery {
                since: None,
                limit: 10_000
            }
        );
        assert_eq!(parse(&[("limit", "999999")]).unwrap().limit, 50_000);
        assert_eq!(parse(&[("since", "-3")]).unwrap().since, Some(0));
        assert_eq!(parse(&[("since", "42")]).unwrap().since, Some(42));
    }

    #[test]
    fn bad_parameters_are_rejected() {
        assert_eq!(parse(&[("since", "abc")]).unwrap_err(), "Invalid since parameter");
        assert_eq!(parse(&[("limit", "0")]).unwrap_err(), "Invalid limit parameter");
        assert_eq!(parse(&[("limit", "-1")]).unwrap_err(), "Invalid limit parameter");
        assert_eq!(parse(&[("limit", "ten")]).unwrap_err(), "Invalid limit parameter");
    }
}
