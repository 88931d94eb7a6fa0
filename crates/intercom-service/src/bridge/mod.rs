//! Media bridge control plane.
//!
//! # Components
//!
//! - `client` - reqwest client for the conference/endpoint protocol
//! - `types` - wire types of that protocol
//! - `mock` - in-memory bridge for orchestration tests

pub mod client;
pub mod types;

pub use client::BridgeClient;
pub use types::{EndpointAllocation, EndpointDescription, EndpointStatus, RelayType};

use crate::errors::IntercomError;

/// Trait for media bridge operations (enables mocking).
#[async_trait::async_trait]
pub trait MediaBridge: Send + Sync {
    /// Allocate a conference, returning its id.
    async fn allocate_conference(&self) -> Result<String, IntercomError>;

    /// Allocate an endpoint inside a conference.
    async fn allocate_endpoint(
        &self,
        conference_id: &str,
        endpoint_id: &str,
        allocation: &EndpointAllocation,
    ) -> Result<EndpointDescription, IntercomError>;

    /// Push a negotiated description to the bridge.
    async fn configure_endpoint(
        &self,
        conference_id: &str,
        endpoint_id: &str,
        description: &EndpointDescription,
    ) -> Result<(), IntercomError>;

    /// Release an endpoint. Best effort.
    async fn expire_endpoint(&self, conference_id: &str, endpoint_id: &str);

    /// Active conference ids; empty on failure.
    async fn list_conferences(&self) -> Vec<String>;

    /// Per-endpoint transport state; empty on failure.
    async fn get_conference_detail(&self, conference_id: &str) -> Vec<EndpointStatus>;
}

#[async_trait::async_trait]
impl MediaBridge for BridgeClient {
    async fn allocate_conference(&self) -> Result<String, IntercomError> {
        self.allocate_conference().await
    }

    async fn allocate_endpoint(
        &self,
        conference_id: &str,
        endpoint_id: &str,
        allocation: &EndpointAllocation,
    ) -> Result<EndpointDescription, IntercomError> {
        self.allocate_endpoint(conference_id, endpoint_id, allocation)
            .await
    }

    async fn configure_endpoint(
        &self,
        conference_id: &str,
        endpoint_id: &str,
        description: &EndpointDescription,
    ) -> Result<(), IntercomError> {
        self.configure_endpoint(conference_id, endpoint_id, description)
            .await
    }

    async fn expire_endpoint(&self, conference_id: &str, endpoint_id: &str) {
        self.expire_endpoint(conference_id, endpoint_id).await;
    }

    async fn list_conferences(&self) -> Vec<String> {
        self.list_conferences().await
    }

    async fn get_conference_detail(&self, conference_id: &str) -> Vec<EndpointStatus> {
        self.get_conference_detail(conference_id).await
    }
}

/// Mock bridge module for testing.
///
/// Keeps conferences and configure calls in memory so tests can assert on
/// what the orchestration layer sent.
pub mod mock {
    use super::types::{
        AudioDescription, BundleTransport, DataDescription, DtlsTransport, IceCandidate,
        IceTransport, ParamValue, PayloadType, RtcpFeedback, RtpHeaderExtension,
        VideoDescription,
    };
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use std::time::Duration;

    /// A recorded configure call.
    #[derive(Debug, Clone)]
    pub struct ConfigureCall {
        pub conference_id: String,
        pub endpoint_id: String,
        pub description: EndpointDescription,
    }

    /// In-memory media bridge.
    #[derive(Default)]
    pub struct MockBridge {
        conferences: Mutex<Vec<String>>,
        configured: Mutex<Vec<ConfigureCall>>,
        expired: Mutex<Vec<(String, String)>>,
        endpoint_status: Mutex<Vec<EndpointStatus>>,
        conference_allocations: AtomicUsize,
        endpoint_allocations: AtomicUsize,
        list_calls: AtomicUsize,
        list_fails: AtomicBool,
        allocate_fails: AtomicBool,
        configure_rejection: Mutex<Option<String>>,
        allocate_delay: Option<Duration>,
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    impl MockBridge {
        /// A healthy, empty bridge.
        pub fn new() -> Self {
            Self::default()
        }

        /// A bridge whose conference allocation takes `delay`, widening the
        /// window for check-then-allocate races.
        pub fn with_allocate_delay(delay: Duration) -> Self {
            Self {
                allocate_delay: Some(delay),
                ..Self::default()
            }
        }

        /// Make `list_conferences` behave as if the bridge were unreachable.
        pub fn set_list_fails(&self, fails: bool) {
            self.list_fails.store(fails, Ordering::SeqCst);
        }

        /// Make conference and endpoint allocation fail.
        pub fn set_allocate_fails(&self, fails: bool) {
            self.allocate_fails.store(fails, Ordering::SeqCst);
        }

        /// Reject every configure call with `detail`.
        pub fn reject_configure(&self, detail: &str) {
            *lock(&self.configure_rejection) = Some(detail.to_string());
        }

        /// Set the per-endpoint state returned by `get_conference_detail`.
        pub fn set_endpoint_status(&self, status: Vec<EndpointStatus>) {
            *lock(&self.endpoint_status) = status;
        }

        /// Forget a conference, as if the bridge had reaped it.
        pub fn drop_conference(&self, conference_id: &str) {
            lock(&self.conferences).retain(|c| c != conference_id);
        }

        pub fn conference_allocations(&self) -> usize {
            self.conference_allocations.load(Ordering::SeqCst)
        }

        pub fn endpoint_allocations(&self) -> usize {
            self.endpoint_allocations.load(Ordering::SeqCst)
        }

        pub fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }

        pub fn configure_calls(&self) -> Vec<ConfigureCall> {
            lock(&self.configured).clone()
        }

        pub fn expired_endpoints(&self) -> Vec<(String, String)> {
            lock(&self.expired).clone()
        }
    }

    #[async_trait::async_trait]
    impl MediaBridge for MockBridge {
        async fn allocate_conference(&self) -> Result<String, IntercomError> {
            if let Some(delay) = self.allocate_delay {
                tokio::time::sleep(delay).await;
            }
            if self.allocate_fails.load(Ordering::SeqCst) {
                return Err(IntercomError::BridgeUnreachable(
                    "Mock bridge error".to_string(),
                ));
            }

            let n = self.conference_allocations.fetch_add(1, Ordering::SeqCst);
            let id = format!("conference-{}", n + 1);
            lock(&self.conferences).push(id.clone());
            Ok(id)
        }

        async fn allocate_endpoint(
            &self,
            _conference_id: &str,
            _endpoint_id: &str,
            allocation: &EndpointAllocation,
        ) -> Result<EndpointDescription, IntercomError> {
            if self.allocate_fails.load(Ordering::SeqCst) {
                return Err(IntercomError::BridgeUnreachable(
                    "Mock bridge error".to_string(),
                ));
            }
            self.endpoint_allocations.fetch_add(1, Ordering::SeqCst);
            Ok(sample_description(allocation))
        }

        async fn configure_endpoint(
            &self,
            conference_id: &str,
            endpoint_id: &str,
            description: &EndpointDescription,
        ) -> Result<(), IntercomError> {
            if let Some(detail) = lock(&self.configure_rejection).clone() {
                return Err(IntercomError::ConfigureRejected(detail));
            }
            lock(&self.configured).push(ConfigureCall {
                conference_id: conference_id.to_string(),
                endpoint_id: endpoint_id.to_string(),
                description: description.clone(),
            });
            Ok(())
        }

        async fn expire_endpoint(&self, conference_id: &str, endpoint_id: &str) {
            lock(&self.expired).push((conference_id.to_string(), endpoint_id.to_string()));
        }

        async fn list_conferences(&self) -> Vec<String> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.list_fails.load(Ordering::SeqCst) {
                return Vec::new();
            }
            lock(&self.conferences).clone()
        }

        async fn get_conference_detail(&self, _conference_id: &str) -> Vec<EndpointStatus> {
            lock(&self.endpoint_status).clone()
        }
    }

    /// The description a bridge hands back for `allocation`.
    pub fn sample_description(allocation: &EndpointAllocation) -> EndpointDescription {
        let opus = PayloadType {
            id: 111,
            name: "opus".to_string(),
            clockrate: 48000,
            channels: Some(2),
            parameters: BTreeMap::from([
                ("minptime".to_string(), ParamValue::from("10")),
                ("useinbandfec".to_string(), ParamValue::from("1")),
            ]),
            rtcp_fbs: Vec::new(),
        };

        let vp8 = PayloadType {
            id: 100,
            name: "VP8".to_string(),
            clockrate: 90000,
            channels: None,
            parameters: BTreeMap::new(),
            rtcp_fbs: vec![
                RtcpFeedback {
                    kind: "nack".to_string(),
                    subtype: None,
                },
                RtcpFeedback {
                    kind: "nack".to_string(),
                    subtype: Some("pli".to_string()),
                },
            ],
        };
        let rtx = PayloadType {
            id: 96,
            name: "rtx".to_string(),
            clockrate: 90000,
            channels: None,
            parameters: BTreeMap::from([("apt".to_string(), ParamValue::from("100"))]),
            rtcp_fbs: Vec::new(),
        };

        EndpointDescription {
            bundle_transport: BundleTransport {
                ice_controlling: Some(allocation.ice_controlling),
                ice: IceTransport {
                    ufrag: "bridgeufrag".to_string(),
                    pwd: "bridgepassword0123456789".to_string(),
                    candidates: vec![IceCandidate {
                        generation: 0,
                        component: 1,
                        protocol: "udp".to_string(),
                        port: 10000,
                        ip: "192.0.2.10".to_string(),
                        rel_port: None,
                        rel_addr: None,
                        foundation: "1".to_string(),
                        priority: 2_130_706_431,
                        kind: "host".to_string(),
                        network: 1,
                    }],
                },
                dtls: DtlsTransport {
                    setup: "actpass".to_string(),
                    hash_type: "sha-256".to_string(),
                    hash: "11:22:33:44".to_string(),
                },
            },
            audio: allocation.audio.then(|| AudioDescription {
                ssrcs: vec![11111, 22222],
                payload_type: opus,
                rtp_hdrexts: vec![
                    RtpHeaderExtension {
                        id: 1,
                        uri: "urn:ietf:params:rtp-hdrext:ssrc-audio-level".to_string(),
                    },
                    RtpHeaderExtension {
                        id: 3,
                        uri: "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time"
                            .to_string(),
                    },
                ],
            }),
            video: allocation.video.then(|| VideoDescription {
                streams: Vec::new(),
                payload_types: vec![vp8, rtx],
                rtp_hdrexts: vec![RtpHeaderExtension {
                    id: 3,
                    uri: "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time".to_string(),
                }],
            }),
            data: allocation.data.then_some(DataDescription { port: 5000 }),
        }
    }
}
