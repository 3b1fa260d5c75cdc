#![allow(clippy::unwrap_used)]
// Integration tests for `AgentClient` using wiremock.

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stargaze_api::{AgentClient, Error, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup(credential: Option<&str>) -> (MockServer, AgentClient) {
    let server = MockServer::start().await;
    let client = AgentClient::new(
        &server.uri(),
        credential.map(|c| SecretString::from(c.to_owned())),
        &TransportConfig::with_timeout(Duration::from_millis(500)),
    )
    .unwrap();
    (server, client)
}

fn events_body() -> serde_json::Value {
    json!({
        "agentId": "edge-1",
        "sequenceStart": 11,
        "sequenceEnd": 12,
        "events": [
            { "sourceIp": "10.0.0.1", "destPort": 443, "protocol": "TCP",
              "timestamp": 1_700_000_000_000_i64, "bytes": 1200, "seq": 11 },
            { "sourceIp": "10.0.0.2", "destPort": 53, "protocol": "UDP",
              "timestamp": 1_700_000_000_100_i64, "bytes": 80, "seq": 12 }
        ],
        "hasMore": true,
        "gapDetected": false,
        "serverTimestamp": 1_700_000_000_200_i64
    })
}

// ── Events ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_events_since_sends_cursor_limit_and_bearer() {
    let (server, client) = setup(Some("s3cret")).await;

    Mock::given(method("GET"))
        .and(path("/api/events"))
        .and(query_param("since", "10"))
        .and(query_param("limit", "500"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(events_body()))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client.events_since(10, 500).await.unwrap();

    assert_eq!(resp.agent_id, "edge-1");
    assert_eq!(resp.sequence_end, 12);
    assert_eq!(resp.events.len(), 2);
    assert_eq!(resp.events[1].dest_port, Some(53));
    assert!(resp.has_more);
}

#[tokio::test]
async fn test_unauthorized_maps_to_error() {
    let (server, client) = setup(Some("wrong")).await;

    Mock::given(method("GET"))
        .and(path("/api/events"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "Unauthorized" })))
        .mount(&server)
        .await;

    let err = client.events_since(0, 10).await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized), "got: {err:?}");
}

#[tokio::test]
async fn test_server_error_carries_status() {
    let (server, client) = setup(None).await;

    Mock::given(method("GET"))
        .and(path("/api/events"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let err = client.events_since(0, 10).await.unwrap_err();
    match err {
        Error::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "busy");
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup(None).await;

    Mock::given(method("GET"))
        .and(path("/api/events"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"agentId\": 5"))
        .mount(&server)
        .await;

    let err = client.events_since(0, 10).await.unwrap_err();
    assert!(matches!(err, Error::Deserialization { .. }), "got: {err:?}");
}

#[tokio::test]
async fn test_slow_agent_times_out() {
    let (server, client) = setup(None).await;

    Mock::given(method("GET"))
        .and(path("/api/events"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(events_body())
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = client.events_since(0, 10).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { timeout_ms: 500 }), "got: {err:?}");
}

// ── Health / info ───────────────────────────────────────────────────

#[tokio::test]
async fn test_health_is_unauthenticated() {
    let (server, client) = setup(Some("s3cret")).await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "agentId": "edge-1",
            "uptime": 42,
            "bufferSize": 10,
            "bufferCapacity": 100
        })))
        .mount(&server)
        .await;

    let health = client.health().await.unwrap();
    assert_eq!(health.agent_id, "edge-1");
    assert_eq!(health.buffer_capacity, Some(100));
}

#[tokio::test]
async fn test_info_reports_identity() {
    let (server, client) = setup(Some("k")).await;

    Mock::given(method("GET"))
        .and(path("/api/info"))
        .and(header("authorization", "Bearer k"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "agentId": "edge-1",
            "hostname": "edge-1",
            "version": "0.1.0",
            "supportedFeatures": ["events", "health"],
            "timestamp": 1
        })))
        .mount(&server)
        .await;

    let info = client.info().await.unwrap();
    assert_eq!(info.supported_features, vec!["events", "health"]);
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let client = AgentClient::new(
        "http://127.0.0.1:1",
        None,
        &TransportConfig::with_timeout(Duration::from_millis(500)),
    )
    .unwrap();

    let err = client.health().await.unwrap_err();
    assert!(
        matches!(err, Error::Transport(_) | Error::Timeout { .. }),
        "got: {err:?}"
    );
}

#[test]
fn test_credential_with_control_characters_is_rejected() {
    let err = AgentClient::new(
        "http://127.0.0.1:1",
        Some(SecretString::from("line\nbreak".to_owned())),
        &TransportConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidCredential { .. }), "got: {err:?}");
}
