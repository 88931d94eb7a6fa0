//! Bridge client integration tests.
//!
//! Runs `BridgeClient` against a wiremock bridge speaking the
//! conference/endpoint control protocol.

// Test code is allowed to use expect/unwrap for assertions
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

use anyhow::Result;
use common::secret::SecretString;
use intercom_service::bridge::{BridgeClient, EndpointAllocation, MediaBridge};
use intercom_service::errors::IntercomError;
use intercom_test_utils::{bridge_endpoint_json, endpoint_status_json, MockBridgeServer};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_allocate_conference_returns_id() -> Result<()> {
    let bridge = MockBridgeServer::start().await;
    bridge.mount_conference_allocation("conf-42").await;

    let client = BridgeClient::new(&bridge.conferences_url(), None)?;
    assert_eq!(client.allocate_conference().await?, "conf-42");
    Ok(())
}

#[tokio::test]
async fn test_api_key_is_sent_as_bearer() -> Result<()> {
    let bridge = MockBridgeServer::start().await;
    Mock::given(method("GET"))
        .and(path("/conferences"))
        .and(header("authorization", "Bearer bridge-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["c1"])))
        .mount(bridge.server())
        .await;

    let client = BridgeClient::new(
        &bridge.conferences_url(),
        Some(SecretString::from("bridge-key")),
    )?;
    assert_eq!(client.list_conferences().await, vec!["c1".to_string()]);

    // Without the key the request does not match and the list degrades to empty.
    let anonymous = BridgeClient::new(&bridge.conferences_url(), None)?;
    assert!(anonymous.list_conferences().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_allocate_endpoint_coerces_string_numbers() -> Result<()> {
    let bridge = MockBridgeServer::start().await;
    bridge.mount_endpoint_actions().await;

    let client = BridgeClient::new(&bridge.conferences_url(), None)?;
    let description = client
        .allocate_endpoint("conf-1", "ep-1", &EndpointAllocation::ingest(60))
        .await?;

    let candidate = &description.bundle_transport.ice.candidates[0];
    assert_eq!(candidate.port, 10000);
    assert_eq!(candidate.priority, 2_130_706_431);
    assert_eq!(description.audio.as_ref().unwrap().ssrcs, vec![1111]);
    let video = description.video.as_ref().unwrap();
    assert_eq!(video.streams[0].sources[0].feedback, Some(3333));
    assert_eq!(video.payload_types[1].parameters["apt"].0, "100");

    let allocations = bridge.received_actions("allocate").await;
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0]["bundle-transport"]["ice-controlling"], false);
    assert_eq!(allocations[0]["idleTimeout"], 60);
    assert_eq!(allocations[0]["audio"]["relay-type"], "ssrc-rewrite");
    assert!(allocations[0].get("data").is_none());
    Ok(())
}

#[tokio::test]
async fn test_allocate_endpoint_sends_both_placeholder_blocks() -> Result<()> {
    let bridge = MockBridgeServer::start().await;
    Mock::given(method("POST"))
        .and(path("/conferences/conf-1/ep-1"))
        .and(body_json(json!({
            "action": "allocate",
            "bundle-transport": {
                "ice-controlling": true,
                "ice": true,
                "dtls": true,
                "sdes": false
            },
            "audio": { "relay-type": "ssrc-rewrite", "ssrcs": [] },
            "video": { "relay-type": "ssrc-rewrite", "ssrcs": [] },
            "data": {},
            "idleTimeout": 60
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(bridge_endpoint_json()))
        .expect(1)
        .mount(bridge.server())
        .await;

    let client = BridgeClient::new(&bridge.conferences_url(), None)?;
    let description = client
        .allocate_endpoint("conf-1", "ep-1", &EndpointAllocation::audio_with_data(60))
        .await?;

    // Audio-only sessions never carry the bridge's video placeholder forward.
    assert!(description.audio.is_some());
    assert!(description.video.is_none());
    Ok(())
}

#[tokio::test]
async fn test_allocate_endpoint_error_status_is_unreachable() -> Result<()> {
    let bridge = MockBridgeServer::start().await;
    bridge
        .mount_endpoint_action("allocate", ResponseTemplate::new(503))
        .await;

    let client = BridgeClient::new(&bridge.conferences_url(), None)?;
    let result = client
        .allocate_endpoint("conf-1", "ep-1", &EndpointAllocation::audio_with_data(60))
        .await;
    assert!(matches!(result, Err(IntercomError::BridgeUnreachable(_))));
    Ok(())
}

#[tokio::test]
async fn test_configure_rejection_carries_bridge_body() -> Result<()> {
    let bridge = MockBridgeServer::start().await;
    bridge.mount_endpoint_actions().await;
    let client = BridgeClient::new(&bridge.conferences_url(), None)?;
    let description = client
        .allocate_endpoint("conf-1", "ep-1", &EndpointAllocation::ingest(60))
        .await?;

    let rejecting = MockBridgeServer::start().await;
    rejecting
        .mount_endpoint_action(
            "configure",
            ResponseTemplate::new(400).set_body_json(json!({ "error": "bad ssrc" })),
        )
        .await;
    let client = BridgeClient::new(&rejecting.conferences_url(), None)?;

    match client
        .configure_endpoint("conf-1", "ep-1", &description)
        .await
    {
        Err(IntercomError::ConfigureRejected(detail)) => {
            assert_eq!(detail, r#"{"error":"bad ssrc"}"#);
        }
        other => panic!("expected ConfigureRejected, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_configure_sends_description() -> Result<()> {
    let bridge = MockBridgeServer::start().await;
    bridge.mount_endpoint_actions().await;
    let client = BridgeClient::new(&bridge.conferences_url(), None)?;

    let description = client
        .allocate_endpoint("conf-1", "ep-1", &EndpointAllocation::ingest(60))
        .await?;
    client
        .configure_endpoint("conf-1", "ep-1", &description)
        .await?;

    let configures = bridge.received_actions("configure").await;
    assert_eq!(configures.len(), 1);
    assert_eq!(
        configures[0]["bundle-transport"]["ice"]["ufrag"],
        "bridgeufrag"
    );
    // Numeric strings go back out as numbers.
    assert_eq!(configures[0]["audio"]["ssrcs"], json!([1111]));
    Ok(())
}

#[tokio::test]
async fn test_expire_failure_is_swallowed() -> Result<()> {
    let bridge = MockBridgeServer::start().await;
    bridge
        .mount_endpoint_action("expire", ResponseTemplate::new(500))
        .await;

    let client = BridgeClient::new(&bridge.conferences_url(), None)?;
    client.expire_endpoint("conf-1", "ep-1").await;
    assert_eq!(bridge.received_actions("expire").await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_conference_detail_reports_failed_endpoints() -> Result<()> {
    let bridge = MockBridgeServer::start().await;
    bridge
        .mount_conference_detail(
            "conf-1",
            vec![
                endpoint_status_json("ep-ok", "COMPLETED", "CONNECTED"),
                endpoint_status_json("ep-bad", "FAILED", "CONNECTED"),
            ],
        )
        .await;

    let client = BridgeClient::new(&bridge.conferences_url(), None)?;
    let statuses = client.get_conference_detail("conf-1").await;
    assert_eq!(statuses.len(), 2);
    let failed: Vec<_> = statuses.iter().filter(|s| s.is_failed()).map(|s| s.id.as_str()).collect();
    assert_eq!(failed, vec!["ep-bad"]);

    // Unknown conference: 404 from wiremock, degraded to empty.
    assert!(client.get_conference_detail("conf-2").await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_client_through_trait_object() -> Result<()> {
    let bridge = MockBridgeServer::start().await;
    bridge.mount_conference_allocation("conf-7").await;
    bridge.mount_conference_list(&["conf-7"]).await;

    let client: Box<dyn MediaBridge> = Box::new(BridgeClient::new(&bridge.conferences_url(), None)?);
    assert_eq!(client.allocate_conference().await?, "conf-7");
    assert_eq!(client.list_conferences().await, vec!["conf-7".to_string()]);
    Ok(())
}

#[test]
fn test_fixture_is_a_valid_description() {
    let description: intercom_service::bridge::EndpointDescription =
        serde_json::from_value(bridge_endpoint_json()).unwrap();
    assert_eq!(description.data.unwrap().port, 5000);
}
