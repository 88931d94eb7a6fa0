//! wiremock-backed media bridge.
//!
//! Serves the conference collection under `/conferences` and answers
//! allocate, configure and expire actions on endpoint URLs.
//!
//! # Example
//!
//! ```rust,ignore
//! let bridge = MockBridgeServer::start().await;
//! bridge.mount_conference_allocation("conf-1").await;
//! bridge.mount_endpoint_actions().await;
//!
//! let client = BridgeClient::new(&bridge.conferences_url(), None)?;
//! ```

use crate::fixtures::bridge_endpoint_json;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CONFERENCES_PATH: &str = "/conferences";

/// A running mock bridge.
pub struct MockBridgeServer {
    server: MockServer,
}

impl MockBridgeServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL to hand to `BridgeClient::new`.
    pub fn conferences_url(&self) -> String {
        format!("{}{}", self.server.uri(), CONFERENCES_PATH)
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// `POST /conferences` returns `{"id": conference_id}`.
    pub async fn mount_conference_allocation(&self, conference_id: &str) {
        Mock::given(method("POST"))
            .and(path(CONFERENCES_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": conference_id })))
            .mount(&self.server)
            .await;
    }

    /// `GET /conferences` returns `conference_ids`.
    pub async fn mount_conference_list(&self, conference_ids: &[&str]) {
        Mock::given(method("GET"))
            .and(path(CONFERENCES_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(conference_ids)))
            .mount(&self.server)
            .await;
    }

    /// `GET /conferences/{id}` returns `statuses`.
    pub async fn mount_conference_detail(&self, conference_id: &str, statuses: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(format!("{CONFERENCES_PATH}/{conference_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(statuses)))
            .mount(&self.server)
            .await;
    }

    /// Endpoint allocation returns [`bridge_endpoint_json`]; configure and
    /// expire succeed with an empty body.
    pub async fn mount_endpoint_actions(&self) {
        self.mount_endpoint_action("allocate", ResponseTemplate::new(200).set_body_json(bridge_endpoint_json()))
            .await;
        self.mount_endpoint_action("configure", ResponseTemplate::new(200))
            .await;
        self.mount_endpoint_action("expire", ResponseTemplate::new(200))
            .await;
    }

    /// Respond to `action` on any endpoint URL with `response`.
    pub async fn mount_endpoint_action(&self, action: &str, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path_regex(format!(r"^{CONFERENCES_PATH}/[^/]+/[^/]+$")))
            .and(body_partial_json(json!({ "action": action })))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Bodies of every request received with the given `action`.
    pub async fn received_actions(&self, action: &str) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter_map(|request| serde_json::from_slice::<Value>(&request.body).ok())
            .filter(|body| body.get("action").and_then(Value::as_str) == Some(action))
            .collect()
    }
}
