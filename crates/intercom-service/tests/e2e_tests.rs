//! End-to-end tests: real HTTP server, real bridge client, wiremock bridge.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use anyhow::Result;
use intercom_service::bridge::BridgeClient;
use intercom_test_utils::{MockBridgeServer, TestIntercomServer, WHIP_AUDIO_OFFER};
use serde_json::{json, Value};
use std::sync::Arc;

async fn spawn() -> Result<(TestIntercomServer, MockBridgeServer)> {
    let bridge = MockBridgeServer::start().await;
    bridge.mount_conference_allocation("conf-1").await;
    bridge.mount_conference_list(&["conf-1"]).await;
    bridge.mount_endpoint_actions().await;

    let client = BridgeClient::new(&bridge.conferences_url(), None)?;
    let server = TestIntercomServer::spawn(Arc::new(client)).await?;
    Ok((server, bridge))
}

async fn create_production(server: &TestIntercomServer) -> Result<(String, String)> {
    let body: Value = reqwest::Client::new()
        .post(format!("{}/api/v1/productions", server.url()))
        .json(&json!({ "name": "Show", "lines": [{ "name": "Studio" }] }))
        .send()
        .await?
        .json()
        .await?;
    Ok((
        body["id"].as_str().unwrap().to_string(),
        body["lines"][0]["id"].as_str().unwrap().to_string(),
    ))
}

#[tokio::test]
async fn test_whip_ingest_against_bridge() -> Result<()> {
    let (server, bridge) = spawn().await?;
    let (production_id, line_id) = create_production(&server).await?;

    let response = reqwest::Client::new()
        .post(format!(
            "{}/whip/productions/{production_id}/lines/{line_id}?username=camera",
            server.url()
        ))
        .header("content-type", "application/sdp")
        .body(WHIP_AUDIO_OFFER)
        .send()
        .await?;

    assert_eq!(response.status(), 201);
    let location = response
        .headers()
        .get("location")
        .unwrap()
        .to_str()?
        .to_string();
    let answer = response.text().await?;

    // The answer carries the bridge's transport.
    assert!(answer.contains("a=ice-ufrag:bridgeufrag"));
    assert!(answer.contains("a=fingerprint:sha-256 11:22:33:44"));
    assert!(answer.contains("a=candidate:1 1 udp 2130706431 203.0.113.10 10000 typ host"));

    // The configure call carries the client's.
    let configures = bridge.received_actions("configure").await;
    assert_eq!(configures.len(), 1);
    let configure = &configures[0];
    assert_eq!(configure["audio"]["ssrcs"], json!([555]));
    assert_eq!(configure["audio"]["payload-type"]["id"], 111);
    assert_eq!(configure["bundle-transport"]["ice"]["ufrag"], "abc");
    assert_eq!(configure["bundle-transport"]["dtls"]["hash"], "AA:BB");

    let deleted = reqwest::Client::new()
        .delete(format!("{}{location}", server.url()))
        .send()
        .await?;
    assert_eq!(deleted.status(), 200);
    assert_eq!(bridge.received_actions("expire").await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_conference_is_reused_while_bridge_lists_it() -> Result<()> {
    let (server, bridge) = spawn().await?;
    let (production_id, line_id) = create_production(&server).await?;
    let client = reqwest::Client::new();
    let uri = format!(
        "{}/api/v1/productions/{production_id}/lines/{line_id}/conference",
        server.url()
    );

    for _ in 0..3 {
        let body: Value = client.post(&uri).send().await?.json().await?;
        assert_eq!(body["conferenceId"], "conf-1");
    }

    let allocations = bridge
        .server()
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == "/conferences")
        .count();
    assert_eq!(allocations, 1);
    Ok(())
}
