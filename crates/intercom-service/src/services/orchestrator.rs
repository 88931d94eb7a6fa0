//! Session orchestration.
//!
//! Composes the bridge client, the negotiation functions and the session
//! directory into the operations the HTTP layer calls. Each step's failure
//! aborts the remaining steps and is returned as-is.
//!
//! # Conference allocation
//!
//! `ensure_line_conference` is the only path that creates a conference. It
//! runs inside the [`RequestSerializer`] so two requests for a cold line can
//! never both observe "no conference" and allocate twice.

use crate::bridge::{EndpointAllocation, EndpointDescription, MediaBridge};
use crate::config::DEFAULT_ENDPOINT_IDLE_TIMEOUT_SECONDS;
use crate::directory::{
    NewSession, Participant, SessionDirectory, SessionKind, SweepReport, UserSession,
};
use crate::errors::IntercomError;
use crate::negotiation;
use crate::observability::metrics;
use crate::serializer::RequestSerializer;
use common::types::{LineId, ProductionId, SessionId};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// SDP produced by a negotiation step, with the description that goes with it.
#[derive(Debug, Clone)]
pub struct Negotiated {
    /// Offer (server-offer flow) or answer (client-offer flow).
    pub sdp: String,
    pub description: EndpointDescription,
}

/// A freshly created session and the SDP to hand its client.
#[derive(Debug, Clone)]
pub struct SessionOffer {
    pub session_id: SessionId,
    pub sdp: String,
}

pub struct Orchestrator {
    bridge: Arc<dyn MediaBridge>,
    directory: Arc<SessionDirectory>,
    serializer: RequestSerializer,
    endpoint_idle_timeout_seconds: u64,
}

impl Orchestrator {
    pub fn new(
        bridge: Arc<dyn MediaBridge>,
        directory: Arc<SessionDirectory>,
        serializer: RequestSerializer,
    ) -> Self {
        Self {
            bridge,
            directory,
            serializer,
            endpoint_idle_timeout_seconds: DEFAULT_ENDPOINT_IDLE_TIMEOUT_SECONDS,
        }
    }

    /// Idle timeout requested for every allocated endpoint.
    #[must_use]
    pub fn with_endpoint_idle_timeout(mut self, seconds: u64) -> Self {
        self.endpoint_idle_timeout_seconds = seconds;
        self
    }

    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }

    /// Return the line's live conference, allocating one if the stored id is
    /// missing or no longer known to the bridge.
    ///
    /// A failed conference listing reads as "no conferences", so the line is
    /// given a new one rather than failing.
    #[instrument(skip_all, fields(production_id = %production_id, line_id = %line_id))]
    pub async fn ensure_line_conference(
        &self,
        production_id: ProductionId,
        line_id: LineId,
    ) -> Result<String, IntercomError> {
        let bridge = Arc::clone(&self.bridge);
        let directory = Arc::clone(&self.directory);

        self.serializer
            .enqueue(move || async move {
                let line = directory.get_line(production_id, line_id).await?;
                let active = bridge.list_conferences().await;

                if let Some(existing) = line
                    .bridge_conference_id
                    .filter(|id| active.iter().any(|a| a == id))
                {
                    debug!(
                        target: "intercom.orchestrator",
                        conference_id = %existing,
                        "Reusing line conference"
                    );
                    metrics::record_line_conference("reused");
                    return Ok(existing);
                }

                let conference_id = bridge.allocate_conference().await?;
                directory
                    .set_line_conference_id(production_id, line_id, conference_id.clone())
                    .await?;

                info!(
                    target: "intercom.orchestrator",
                    production_id = %production_id,
                    line_id = %line_id,
                    conference_id = %conference_id,
                    "Allocated line conference"
                );
                metrics::record_line_conference("allocated");
                Ok::<_, IntercomError>(conference_id)
            })
            .await
    }

    #[instrument(skip_all, fields(conference_id = %conference_id, endpoint_id = %endpoint_id))]
    pub async fn create_endpoint(
        &self,
        conference_id: &str,
        endpoint_id: &str,
        allocation: &EndpointAllocation,
    ) -> Result<EndpointDescription, IntercomError> {
        self.bridge
            .allocate_endpoint(conference_id, endpoint_id, allocation)
            .await
    }

    /// Without an offer, build the server offer for `description`; nothing is
    /// sent to the bridge. With a client offer, configure the endpoint from
    /// it and answer.
    #[instrument(skip_all, fields(conference_id = %conference_id, endpoint_id = %endpoint_id))]
    pub async fn negotiate(
        &self,
        conference_id: &str,
        endpoint_id: &str,
        offer: Option<&str>,
        description: EndpointDescription,
    ) -> Result<Negotiated, IntercomError> {
        let Some(offer) = offer else {
            let sdp = negotiation::create_offer(&description)?;
            return Ok(Negotiated { sdp, description });
        };

        let configured = negotiation::configure_from_offer(&description, offer)?;
        self.bridge
            .configure_endpoint(conference_id, endpoint_id, &configured)
            .await?;
        let sdp = negotiation::create_answer(offer, &description)?;

        Ok(Negotiated {
            sdp,
            description: configured,
        })
    }

    /// Fold the client's answer into the session's endpoint and configure it.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn submit_answer(
        &self,
        session_id: SessionId,
        answer: &str,
    ) -> Result<(), IntercomError> {
        let result = self.submit_answer_inner(session_id, answer).await;
        metrics::record_negotiation("answer", outcome(&result));
        result
    }

    async fn submit_answer_inner(
        &self,
        session_id: SessionId,
        answer: &str,
    ) -> Result<(), IntercomError> {
        let session = self.directory.get_session(session_id)?;
        if session.kind != SessionKind::Legacy {
            return Err(IntercomError::BadRequest(format!(
                "{} sessions are negotiated at creation",
                session.kind.as_str()
            )));
        }

        let updated = negotiation::apply_answer(&session.description, answer)?;
        self.bridge
            .configure_endpoint(&session.conference_id, &session.endpoint_id, &updated)
            .await?;
        self.directory.update_session_endpoint(session_id, updated)?;

        debug!(target: "intercom.orchestrator", session_id = %session_id, "Answer applied");
        Ok(())
    }

    /// Start a broker-offered session: the returned SDP is the offer the
    /// client must answer through [`Orchestrator::submit_answer`].
    #[instrument(skip_all, fields(production_id = %production_id, line_id = %line_id))]
    pub async fn create_session_offer(
        &self,
        production_id: ProductionId,
        line_id: LineId,
        username: &str,
    ) -> Result<SessionOffer, IntercomError> {
        let result = self
            .start_session(production_id, line_id, username, None, SessionKind::Legacy)
            .await;
        metrics::record_negotiation("offer", outcome(&result));
        result
    }

    /// Start a WHIP or WHEP session from the client's offer. The returned SDP
    /// is the answer.
    #[instrument(skip_all, fields(production_id = %production_id, line_id = %line_id, kind = kind.as_str()))]
    pub async fn create_ingest_session(
        &self,
        production_id: ProductionId,
        line_id: LineId,
        username: &str,
        offer: &str,
        kind: SessionKind,
    ) -> Result<SessionOffer, IntercomError> {
        let result = self
            .start_session(production_id, line_id, username, Some(offer), kind)
            .await;
        metrics::record_negotiation(kind.as_str(), outcome(&result));
        result
    }

    async fn start_session(
        &self,
        production_id: ProductionId,
        line_id: LineId,
        username: &str,
        offer: Option<&str>,
        kind: SessionKind,
    ) -> Result<SessionOffer, IntercomError> {
        let conference_id = self.ensure_line_conference(production_id, line_id).await?;

        let session_id = SessionId::new();
        let endpoint_id = session_id.to_string();
        let allocation = match kind {
            SessionKind::Legacy => {
                EndpointAllocation::audio_with_data(self.endpoint_idle_timeout_seconds)
            }
            SessionKind::Whip | SessionKind::Whep => {
                EndpointAllocation::ingest(self.endpoint_idle_timeout_seconds)
            }
        };

        let allocated = self
            .create_endpoint(&conference_id, &endpoint_id, &allocation)
            .await?;
        let negotiated = match self
            .negotiate(&conference_id, &endpoint_id, offer, allocated)
            .await
        {
            Ok(negotiated) => negotiated,
            Err(e) => {
                self.bridge
                    .expire_endpoint(&conference_id, &endpoint_id)
                    .await;
                return Err(e);
            }
        };

        self.directory.create_user_session(NewSession {
            session_id,
            production_id,
            line_id,
            name: username.to_string(),
            conference_id,
            endpoint_id,
            description: negotiated.description,
            kind,
        });

        info!(
            target: "intercom.orchestrator",
            session_id = %session_id,
            kind = kind.as_str(),
            "Session started"
        );
        Ok(SessionOffer {
            session_id,
            sdp: negotiated.sdp,
        })
    }

    /// Remove the session and release its bridge endpoint.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn delete_session(&self, session_id: SessionId) -> Result<(), IntercomError> {
        let session = self.directory.delete_user_session(session_id)?;
        self.release_endpoints(std::slice::from_ref(&session)).await;
        Ok(())
    }

    /// Delete a production, releasing every endpoint its sessions held.
    #[instrument(skip_all, fields(production_id = %production_id))]
    pub async fn delete_production(&self, production_id: ProductionId) -> Result<(), IntercomError> {
        let removed = self.directory.delete_production(production_id).await?;
        self.release_endpoints(&removed).await;
        Ok(())
    }

    /// Delete a line, releasing every endpoint its sessions held.
    #[instrument(skip_all, fields(production_id = %production_id, line_id = %line_id))]
    pub async fn delete_line(
        &self,
        production_id: ProductionId,
        line_id: LineId,
    ) -> Result<(), IntercomError> {
        let removed = self.directory.delete_line(production_id, line_id).await?;
        self.release_endpoints(&removed).await;
        Ok(())
    }

    async fn release_endpoints(&self, sessions: &[UserSession]) {
        for session in sessions {
            self.bridge
                .expire_endpoint(&session.conference_id, &session.endpoint_id)
                .await;
        }
        if !sessions.is_empty() {
            debug!(
                target: "intercom.orchestrator",
                count = sessions.len(),
                "Released bridge endpoints"
            );
        }
    }

    /// Run one liveness sweep. Endpoints of reaped sessions are expired on a
    /// separate task so a slow bridge never delays the next sweep.
    pub fn sweep_sessions(&self, now: Instant) -> SweepReport {
        let report = self.directory.sweep(now);
        if !report.reaped.is_empty() {
            let bridge = Arc::clone(&self.bridge);
            let endpoints: Vec<(String, String)> = report
                .reaped
                .iter()
                .map(|s| (s.conference_id.clone(), s.endpoint_id.clone()))
                .collect();
            tokio::spawn(async move {
                for (conference_id, endpoint_id) in &endpoints {
                    bridge.expire_endpoint(conference_id, endpoint_id).await;
                }
                debug!(
                    target: "intercom.orchestrator",
                    count = endpoints.len(),
                    "Released endpoints of reaped sessions"
                );
            });
        }
        report
    }

    pub fn heartbeat(&self, session_id: SessionId) -> Result<(), IntercomError> {
        self.directory.record_heartbeat(session_id, Instant::now())
    }

    pub async fn list_participants(
        &self,
        production_id: ProductionId,
        line_id: LineId,
    ) -> Result<Vec<Participant>, IntercomError> {
        self.directory.get_line(production_id, line_id).await?;
        Ok(self.directory.get_users_for_line(production_id, line_id))
    }

    /// Long-poll the participant list: resolves on the next change or after
    /// `timeout` with the current list.
    pub async fn wait_for_participants(
        &self,
        production_id: ProductionId,
        line_id: LineId,
        timeout: Duration,
    ) -> Result<Vec<Participant>, IntercomError> {
        self.directory.get_line(production_id, line_id).await?;
        Ok(self
            .directory
            .wait_for_users_change(production_id, line_id, timeout)
            .await)
    }
}

fn outcome<T>(result: &Result<T, IntercomError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) => {
            warn!(target: "intercom.orchestrator", error = %e, "Negotiation step failed");
            "error"
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::bridge::mock::MockBridge;
    use crate::directory::{LivenessThresholds, NewLine};

    struct Harness {
        bridge: Arc<MockBridge>,
        orchestrator: Orchestrator,
        production_id: ProductionId,
        line_id: LineId,
    }

    async fn harness(bridge: MockBridge) -> Harness {
        let bridge = Arc::new(bridge);
        let directory = Arc::new(SessionDirectory::in_memory(LivenessThresholds::default()));
        let production = directory
            .create_production("Show".into(), vec![NewLine::named("Studio")])
            .await
            .unwrap();
        let line_id = production.lines[0].id;
        let orchestrator = Orchestrator::new(
            bridge.clone() as Arc<dyn MediaBridge>,
            directory,
            RequestSerializer::new(),
        );
        Harness {
            bridge,
            orchestrator,
            production_id: production.id,
            line_id,
        }
    }

    const ANSWER: &str = "v=0\r\n\
o=- 99 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 0 1\r\n\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
a=mid:0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
a=ice-ufrag:client\r\n\
a=ice-pwd:clientpassword\r\n\
a=fingerprint:sha-256 CC:DD\r\n\
a=setup:active\r\n\
a=mid:1\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=ssrc:3 cname:c\r\n\
a=candidate:1 1 udp 2122260223 10.0.0.7 5000 typ host\r\n";

    const WHIP_OFFER: &str = "v=0\r\n\
o=- 7000 1 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
a=ice-ufrag:abc\r\n\
a=ice-pwd:abcdefghijklmnopqrstuv\r\n\
a=fingerprint:sha-256 AA:BB\r\n\
a=setup:actpass\r\n\
a=mid:0\r\n\
a=sendonly\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=ssrc:555 msid:s a\r\n\
a=candidate:1 1 udp 2122260223 192.168.1.5 54321 typ host\r\n";

    #[tokio::test]
    async fn test_concurrent_ensure_allocates_once() {
        let h = harness(MockBridge::with_allocate_delay(Duration::from_millis(20))).await;

        let (a, b) = tokio::join!(
            h.orchestrator
                .ensure_line_conference(h.production_id, h.line_id),
            h.orchestrator
                .ensure_line_conference(h.production_id, h.line_id),
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(h.bridge.conference_allocations(), 1);
    }

    #[tokio::test]
    async fn test_ensure_reallocates_when_listing_fails() {
        let h = harness(MockBridge::new()).await;
        let first = h
            .orchestrator
            .ensure_line_conference(h.production_id, h.line_id)
            .await
            .unwrap();

        h.bridge.set_list_fails(true);
        let second = h
            .orchestrator
            .ensure_line_conference(h.production_id, h.line_id)
            .await
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(h.bridge.conference_allocations(), 2);
        let line = h
            .orchestrator
            .directory()
            .get_line(h.production_id, h.line_id)
            .await
            .unwrap();
        assert_eq!(line.bridge_conference_id, Some(second));
    }

    #[tokio::test]
    async fn test_ensure_reallocates_after_bridge_forgets_conference() {
        let h = harness(MockBridge::new()).await;
        let first = h
            .orchestrator
            .ensure_line_conference(h.production_id, h.line_id)
            .await
            .unwrap();
        h.bridge.drop_conference(&first);

        let second = h
            .orchestrator
            .ensure_line_conference(h.production_id, h.line_id)
            .await
            .unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_ensure_unknown_line() {
        let h = harness(MockBridge::new()).await;
        let result = h
            .orchestrator
            .ensure_line_conference(h.production_id, LineId::new())
            .await;
        assert!(matches!(result, Err(IntercomError::LineNotFound(_))));
        assert_eq!(h.bridge.conference_allocations(), 0);
    }

    #[tokio::test]
    async fn test_offer_then_answer_replaces_ssrcs() {
        let h = harness(MockBridge::new()).await;
        let offer = h
            .orchestrator
            .create_session_offer(h.production_id, h.line_id, "alice")
            .await
            .unwrap();
        assert!(offer.sdp.contains("m=application"));
        // Server offer does not configure.
        assert!(h.bridge.configure_calls().is_empty());

        h.orchestrator
            .submit_answer(offer.session_id, ANSWER)
            .await
            .unwrap();

        let calls = h.bridge.configure_calls();
        assert_eq!(calls.len(), 1);
        let description = &calls[0].description;
        assert_eq!(description.audio.as_ref().unwrap().ssrcs, vec![3]);
        assert_eq!(description.bundle_transport.ice.ufrag, "client");
        assert_eq!(calls[0].endpoint_id, offer.session_id.to_string());

        let stored = h
            .orchestrator
            .directory()
            .get_session(offer.session_id)
            .unwrap();
        assert_eq!(stored.description, *description);
    }

    #[tokio::test]
    async fn test_whip_session_configures_and_answers() {
        let h = harness(MockBridge::new()).await;
        let created = h
            .orchestrator
            .create_ingest_session(h.production_id, h.line_id, "camera", WHIP_OFFER, SessionKind::Whip)
            .await
            .unwrap();

        let calls = h.bridge.configure_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].description.audio.as_ref().unwrap().ssrcs, vec![555]);
        assert_eq!(calls[0].description.bundle_transport.ice.ufrag, "abc");

        assert_eq!(created.sdp.matches("m=audio").count(), 1);
        assert!(created.sdp.contains("a=recvonly"));
        assert_eq!(created.sdp.matches("a=group:BUNDLE").count(), 1);
        // Answer carries the bridge's transport, not the client's.
        assert!(created.sdp.contains("a=ice-ufrag:bridgeufrag"));

        let participants = h
            .orchestrator
            .list_participants(h.production_id, h.line_id)
            .await
            .unwrap();
        assert_eq!(participants.len(), 1);
        assert!(participants[0].is_active);
    }

    #[tokio::test]
    async fn test_answer_for_ingest_session_is_rejected() {
        let h = harness(MockBridge::new()).await;
        let created = h
            .orchestrator
            .create_ingest_session(h.production_id, h.line_id, "viewer", WHIP_OFFER, SessionKind::Whep)
            .await
            .unwrap();
        let result = h.orchestrator.submit_answer(created.session_id, ANSWER).await;
        assert!(matches!(result, Err(IntercomError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_configure_rejection_aborts_session() {
        let h = harness(MockBridge::new()).await;
        h.bridge.reject_configure("{\"error\":\"bad ssrc\"}");

        let result = h
            .orchestrator
            .create_ingest_session(h.production_id, h.line_id, "camera", WHIP_OFFER, SessionKind::Whip)
            .await;
        assert!(matches!(result, Err(IntercomError::ConfigureRejected(d)) if d.contains("bad ssrc")));
        assert_eq!(h.bridge.expired_endpoints().len(), 1);
        assert!(h
            .orchestrator
            .list_participants(h.production_id, h.line_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_allocation_failure_surfaces() {
        let h = harness(MockBridge::new()).await;
        h.bridge.set_allocate_fails(true);
        let result = h
            .orchestrator
            .create_session_offer(h.production_id, h.line_id, "alice")
            .await;
        assert!(matches!(result, Err(IntercomError::BridgeUnreachable(_))));
    }

    #[tokio::test]
    async fn test_delete_session_expires_endpoint() {
        let h = harness(MockBridge::new()).await;
        let offer = h
            .orchestrator
            .create_session_offer(h.production_id, h.line_id, "alice")
            .await
            .unwrap();

        h.orchestrator.delete_session(offer.session_id).await.unwrap();
        let expired = h.bridge.expired_endpoints();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].1, offer.session_id.to_string());

        assert!(matches!(
            h.orchestrator.heartbeat(offer.session_id),
            Err(IntercomError::SessionNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_expires_endpoints_of_reaped_sessions() {
        let h = harness(MockBridge::new()).await;
        let offer = h
            .orchestrator
            .create_session_offer(h.production_id, h.line_id, "alice")
            .await
            .unwrap();

        let quiet = h.orchestrator.sweep_sessions(Instant::now());
        assert!(quiet.reaped.is_empty());

        tokio::time::advance(Duration::from_secs(31)).await;
        let report = h.orchestrator.sweep_sessions(Instant::now());
        assert_eq!(report.reaped.len(), 1);

        // Release runs on its own task.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let expired = h.bridge.expired_endpoints();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].1, offer.session_id.to_string());
    }

    #[tokio::test]
    async fn test_delete_production_releases_all_endpoints() {
        let h = harness(MockBridge::new()).await;
        for name in ["a", "b"] {
            h.orchestrator
                .create_session_offer(h.production_id, h.line_id, name)
                .await
                .unwrap();
        }
        h.orchestrator
            .delete_production(h.production_id)
            .await
            .unwrap();
        assert_eq!(h.bridge.expired_endpoints().len(), 2);
    }
}
