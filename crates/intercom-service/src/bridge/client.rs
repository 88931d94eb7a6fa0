//! HTTP client for the media bridge conference/endpoint control protocol.
//!
//! The base URL addresses the bridge's conference collection:
//!
//! | Call | Request |
//! |------|---------|
//! | allocate conference | `POST {base}` with `{}` |
//! | list conferences | `GET {base}` |
//! | conference detail | `GET {base}/{conference}` |
//! | allocate / configure / expire endpoint | `POST {base}/{conference}/{endpoint}` |
//!
//! No retries happen here. Allocation failures are errors; list and detail
//! failures degrade to empty results.

use crate::bridge::types::{
    AllocateConferenceResponse, AllocateEndpointRequest, ConfigureEndpointRequest,
    EndpointAllocation, EndpointDescription, EndpointStatus, ExpireEndpointRequest,
};
use crate::errors::IntercomError;
use crate::observability::metrics;
use common::secret::{is_configured, ExposeSecret, SecretString};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

/// Default timeout for bridge requests in seconds.
const BRIDGE_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default connect timeout in seconds.
const BRIDGE_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Media bridge HTTP client.
#[derive(Clone)]
pub struct BridgeClient {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl BridgeClient {
    /// Create a new bridge client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Conference collection URL (e.g. "http://bridge:8080/conferences")
    /// * `api_key` - Bearer token attached to every request when present and non-empty
    ///
    /// # Errors
    ///
    /// Returns `IntercomError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: Option<SecretString>) -> Result<Self, IntercomError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(BRIDGE_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(BRIDGE_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                error!(target: "intercom.bridge", error = %e, "Failed to build HTTP client");
                IntercomError::Internal
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| is_configured(Some(key))),
        })
    }

    fn conference_url(&self, conference_id: &str) -> String {
        format!("{}/{}", self.base_url, conference_id)
    }

    fn endpoint_url(&self, conference_id: &str, endpoint_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, conference_id, endpoint_id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }

    /// Allocate a new conference and return its id.
    ///
    /// # Errors
    ///
    /// `IntercomError::BridgeUnreachable` on transport failure, non-2xx, or a
    /// response without an `id`.
    #[instrument(skip(self))]
    pub async fn allocate_conference(&self) -> Result<String, IntercomError> {
        let start = Instant::now();
        let result: Result<String, IntercomError> = async {
            let response = self
                .authorize(self.client.post(&self.base_url))
                .json(&serde_json::json!({}))
                .send()
                .await
                .map_err(unreachable)?;
            let body: AllocateConferenceResponse = expect_success(response).await?;
            Ok(body.id)
        }
        .await;

        record("allocate_conference", &result, start);
        if let Ok(id) = &result {
            debug!(target: "intercom.bridge", conference_id = %id, "Allocated conference");
        }
        result
    }

    /// Allocate an endpoint inside a conference.
    ///
    /// # Errors
    ///
    /// `IntercomError::BridgeUnreachable` on transport failure, non-2xx, or an
    /// endpoint description that does not deserialize.
    #[instrument(skip(self, allocation), fields(conference_id = %conference_id, endpoint_id = %endpoint_id))]
    pub async fn allocate_endpoint(
        &self,
        conference_id: &str,
        endpoint_id: &str,
        allocation: &EndpointAllocation,
    ) -> Result<EndpointDescription, IntercomError> {
        let start = Instant::now();
        let request = AllocateEndpointRequest::from(allocation);
        let result: Result<EndpointDescription, IntercomError> = async {
            let response = self
                .authorize(self.client.post(self.endpoint_url(conference_id, endpoint_id)))
                .json(&request)
                .send()
                .await
                .map_err(unreachable)?;
            let mut description: EndpointDescription = expect_success(response).await?;
            if !allocation.audio {
                description.audio = None;
            }
            if !allocation.video {
                description.video = None;
            }
            Ok(description)
        }
        .await;

        record("allocate_endpoint", &result, start);
        result
    }

    /// Push a negotiated endpoint description to the bridge.
    ///
    /// # Errors
    ///
    /// - `IntercomError::BridgeUnreachable` on transport failure
    /// - `IntercomError::ConfigureRejected` on non-2xx, carrying the bridge's body
    #[instrument(skip(self, description), fields(conference_id = %conference_id, endpoint_id = %endpoint_id))]
    pub async fn configure_endpoint(
        &self,
        conference_id: &str,
        endpoint_id: &str,
        description: &EndpointDescription,
    ) -> Result<(), IntercomError> {
        let start = Instant::now();
        let request = ConfigureEndpointRequest {
            action: "configure",
            description,
        };
        let result: Result<(), IntercomError> = async {
            let response = self
                .authorize(self.client.post(self.endpoint_url(conference_id, endpoint_id)))
                .json(&request)
                .send()
                .await
                .map_err(unreachable)?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            let detail = rejection_detail(response).await;
            warn!(target: "intercom.bridge", status = %status, detail = %detail, "Bridge rejected configure");
            Err(IntercomError::ConfigureRejected(detail))
        }
        .await;

        record("configure_endpoint", &result, start);
        result
    }

    /// Ask the bridge to release an endpoint. Failures are logged only.
    #[instrument(skip(self), fields(conference_id = %conference_id, endpoint_id = %endpoint_id))]
    pub async fn expire_endpoint(&self, conference_id: &str, endpoint_id: &str) {
        let start = Instant::now();
        let result = self
            .authorize(self.client.post(self.endpoint_url(conference_id, endpoint_id)))
            .json(&ExpireEndpointRequest { action: "expire" })
            .send()
            .await
            .map_err(unreachable)
            .and_then(|response| {
                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(IntercomError::BridgeUnreachable(format!(
                        "expire returned {}",
                        response.status()
                    )))
                }
            });

        if let Err(e) = &result {
            warn!(target: "intercom.bridge", error = %e, "Endpoint expire failed; idle timeout will reclaim it");
        }
        record("expire_endpoint", &result, start);
    }

    /// List active conference ids. Any failure yields an empty list.
    #[instrument(skip(self))]
    pub async fn list_conferences(&self) -> Vec<String> {
        let start = Instant::now();
        let result = self.get_json::<Vec<String>>(&self.base_url).await;
        record("list_conferences", &result, start);

        result.unwrap_or_else(|e| {
            warn!(target: "intercom.bridge", error = %e, "Listing conferences failed, treating as empty");
            Vec::new()
        })
    }

    /// Per-endpoint transport state of one conference. Any failure yields an
    /// empty list.
    #[instrument(skip(self), fields(conference_id = %conference_id))]
    pub async fn get_conference_detail(&self, conference_id: &str) -> Vec<EndpointStatus> {
        let start = Instant::now();
        let result = self
            .get_json::<Vec<EndpointStatus>>(&self.conference_url(conference_id))
            .await;
        record("get_conference_detail", &result, start);

        result.unwrap_or_else(|e| {
            warn!(target: "intercom.bridge", error = %e, "Conference detail failed, treating as empty");
            Vec::new()
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, IntercomError> {
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(unreachable)?;
        expect_success(response).await
    }
}

fn unreachable(e: reqwest::Error) -> IntercomError {
    warn!(target: "intercom.bridge", error = %e, "Bridge request failed");
    IntercomError::BridgeUnreachable(e.to_string())
}

/// Require a 2xx and decode the body.
async fn expect_success<T: DeserializeOwned>(response: Response) -> Result<T, IntercomError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(target: "intercom.bridge", status = %status, body = %body, "Bridge returned error status");
        return Err(IntercomError::BridgeUnreachable(format!(
            "bridge returned {status}"
        )));
    }

    response.json().await.map_err(|e| {
        error!(target: "intercom.bridge", error = %e, "Failed to parse bridge response");
        IntercomError::BridgeUnreachable(format!("invalid bridge response: {e}"))
    })
}

/// The bridge's error body, compacted when it is JSON and verbatim otherwise.
async fn rejection_detail(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if text.trim().is_empty() {
        return format!("bridge returned {status}");
    }
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(json) => json.to_string(),
        Err(_) => text,
    }
}

fn record<T>(operation: &'static str, result: &Result<T, IntercomError>, start: Instant) {
    let status = if result.is_ok() { "success" } else { "error" };
    metrics::record_bridge_request(operation, status, start.elapsed());
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = BridgeClient::new("http://bridge:8080/conferences/", None).unwrap();
        assert_eq!(client.base_url, "http://bridge:8080/conferences");
        assert_eq!(
            client.conference_url("c1"),
            "http://bridge:8080/conferences/c1"
        );
        assert_eq!(
            client.endpoint_url("c1", "e1"),
            "http://bridge:8080/conferences/c1/e1"
        );
    }

    #[tokio::test]
    async fn test_list_conferences_unreachable_is_empty() {
        // Port 9 (discard) on localhost is not expected to serve HTTP.
        let client = BridgeClient::new("http://127.0.0.1:9/conferences", None).unwrap();
        assert!(client.list_conferences().await.is_empty());
    }

    #[tokio::test]
    async fn test_allocate_conference_unreachable_is_error() {
        let client = BridgeClient::new("http://127.0.0.1:9/conferences", None).unwrap();
        let result = client.allocate_conference().await;
        assert!(matches!(result, Err(IntercomError::BridgeUnreachable(_))));
    }
}
