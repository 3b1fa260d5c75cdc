// Agent HTTP client
//
// Wraps `reqwest::Client` with agent URL construction, bearer
// authentication, and status/body handling. One instance per agent
// endpoint; cheap to clone.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;
use crate::types::{EventsResponse, HealthResponse, InfoResponse};

/// Async client for a single stargaze agent.
///
/// `events_since` and `info` carry the bearer credential; `health` is the
/// unauthenticated reachability probe used before an agent is registered.
#[derive(Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    base_url: Url,
    credential: Option<SecretString>,
    timeout: Duration,
}

impl std::fmt::Debug for AgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentClient")
            .field("base_url", &self.base_url.as_str())
            .field("has_credential", &self.credential.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AgentClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build a client for `endpoint` from a transport config.
    ///
    /// An empty credential is treated as "none": no `Authorization`
    /// header is sent. A credential that cannot be sent as a header is
    /// rejected here rather than on the first request.
    pub fn new(
        endpoint: &str,
        credential: Option<SecretString>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::with_client(endpoint, http, credential, transport.timeout)
    }

    /// Wrap an existing `reqwest::Client`.
    ///
    /// `timeout` is only used for error reporting; the client's own
    /// timeout governs the request.
    pub fn with_client(
        endpoint: &str,
        http: reqwest::Client,
        credential: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let base_url = Self::normalize_base_url(endpoint)?;
        let credential = credential.filter(|c| !c.expose_secret().is_empty());
        if let Some(ref secret) = credential {
            HeaderValue::from_str(&format!("Bearer {}", secret.expose_secret())).map_err(|_| {
                Error::InvalidCredential {
                    message: "contains characters not allowed in an HTTP header".into(),
                }
            })?;
        }
        Ok(Self {
            http,
            base_url,
            credential,
            timeout,
        })
    }

    /// Strip trailing slashes, then re-add exactly one so relative joins
    /// land under the endpoint path instead of replacing its last segment.
    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw.trim())?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        url.set_query(None);
        Ok(url)
    }

    /// The normalized agent base URL (always ends with `/`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Fetch buffered events with sequence greater than `since`.
    ///
    /// `GET /api/events?since={since}&limit={limit}`
    pub async fn events_since(&self, since: u64, limit: u32) -> Result<EventsResponse, Error> {
        let url = self.base_url.join("api/events")?;
        debug!(%url, since, limit, "polling agent events");

        let req = self
            .http
            .get(url)
            .query(&[("since", since.to_string()), ("limit", limit.to_string())]);
        let resp = self.authorize(req).send().await.map_err(|e| self.map_send_error(e))?;
        self.handle_response(resp).await
    }

    /// Unauthenticated reachability probe.
    ///
    /// `GET /api/health`
    pub async fn health(&self) -> Result<HealthResponse, Error> {
        let url = self.base_url.join("api/health")?;
        debug!(%url, "probing agent health");

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.handle_response(resp).await
    }

    /// Agent identity and capabilities.
    ///
    /// `GET /api/info`
    pub async fn info(&self) -> Result<InfoResponse, Error> {
        let url = self.base_url.join("api/info")?;
        debug!(%url, "fetching agent info");

        let req = self.http.get(url);
        let resp = self.authorize(req).send().await.map_err(|e| self.map_send_error(e))?;
        self.handle_response(resp).await
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credential {
            Some(secret) => req.bearer_auth(secret.expose_secret()),
            None => req,
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            Error::Transport(err)
        }
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized);
        }

        let body = resp.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(endpoint: &str) -> AgentClient {
        AgentClient::with_client(
            endpoint,
            reqwest::Client::new(),
            None,
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn base_url_gets_single_trailing_slash() {
        assert_eq!(client("http://h:15119").base_url().as_str(), "http://h:15119/");
        assert_eq!(client("http://h:15119///").base_url().as_str(), "http://h:15119/");
        assert_eq!(
            client("http://h/agents/edge/").base_url().as_str(),
            "http://h/agents/edge/"
        );
    }

    #[test]
    fn empty_credential_means_no_auth() {
        let c = AgentClient::with_client(
            "http://h:1",
            reqwest::Client::new(),
            Some(SecretString::from(String::new())),
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(c.credential.is_none());
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let err = AgentClient::with_client(
            "not a url",
            reqwest::Client::new(),
            None,
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }
}
