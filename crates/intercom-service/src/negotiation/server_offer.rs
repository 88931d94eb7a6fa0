//! Server-offer flow: offer built from a bridge endpoint, answer folded back.

use super::{to_bridge_candidate, to_sdp_candidate, MediaStreamInfo, OPUS};
use crate::bridge::types::{DtlsTransport, EndpointDescription, IceTransport, PayloadType};
use crate::errors::IntercomError;
use crate::sdp::{
    Direction, ExtMap, Fingerprint, Fmtp, Group, MediaKind, MediaSection, MsidSemantic, Origin,
    RtcpFb, RtpMap, SessionDescription, SsrcAttribute,
};
use rand::Rng;

const NULL_CONNECTION: &str = "IN IP4 0.0.0.0";
const NULL_RTCP: &str = "9 IN IP4 0.0.0.0";
const MAX_MESSAGE_SIZE: u32 = 262_144;

/// Build the SDP offer for a freshly allocated endpoint.
///
/// With a data block the `application` section comes first and audio second;
/// every section is in one BUNDLE group and the bridge candidates sit on the
/// first section.
///
/// # Errors
///
/// `IntercomError::Negotiation` if the endpoint has no audio block.
pub fn create_offer(description: &EndpointDescription) -> Result<String, IntercomError> {
    let audio = description
        .audio
        .as_ref()
        .ok_or_else(|| IntercomError::Negotiation("endpoint has no audio block".to_string()))?;
    let transport = &description.bundle_transport;

    let mut sections = Vec::new();

    if let Some(data) = &description.data {
        let mut section = MediaSection::new(MediaKind::Application, "UDP/DTLS/SCTP");
        section.formats = vec!["webrtc-datachannel".to_string()];
        section.sctp_port = Some(data.port);
        section.max_message_size = Some(MAX_MESSAGE_SIZE);
        sections.push(section);
    }

    let mut section = MediaSection::new(MediaKind::Audio, "UDP/TLS/RTP/SAVPF");
    section.formats = vec![audio.payload_type.id.to_string()];
    section.rtcp = Some(NULL_RTCP.to_string());
    section.direction = Some(Direction::SendRecv);
    section.rtcp_mux = true;
    section.extmaps = audio
        .rtp_hdrexts
        .iter()
        .map(|ext| ExtMap {
            id: ext.id,
            direction: None,
            uri: ext.uri.clone(),
            attributes: None,
        })
        .collect();
    push_payload(&mut section, &audio.payload_type);
    for info in MediaStreamInfo::generate(&audio.ssrcs) {
        push_ssrc_lines(&mut section, &info);
    }
    sections.push(section);

    for (index, section) in sections.iter_mut().enumerate() {
        section.mid = Some(index.to_string());
        section.connection = Some(NULL_CONNECTION.to_string());
        section.ice_ufrag = Some(transport.ice.ufrag.clone());
        section.ice_pwd = Some(transport.ice.pwd.clone());
        section.fingerprint = Some(Fingerprint {
            hash_type: transport.dtls.hash_type.clone(),
            hash: transport.dtls.hash.clone(),
        });
        section.setup = Some("actpass".to_string());
    }
    if let Some(first) = sections.first_mut() {
        first.candidates = transport.ice.candidates.iter().map(to_sdp_candidate).collect();
    }

    let session = SessionDescription {
        origin: Origin {
            session_id: rand::thread_rng().gen::<u32>().to_string(),
            ..Origin::default()
        },
        groups: vec![Group::bundle(
            sections.iter().filter_map(|s| s.mid.clone()).collect(),
        )],
        msid_semantic: Some(MsidSemantic {
            semantic: "WMS".to_string(),
            identifiers: vec!["*".to_string()],
        }),
        media: sections,
        ..SessionDescription::default()
    };

    Ok(session.to_sdp())
}

fn push_payload(section: &mut MediaSection, payload: &PayloadType) {
    let name = if payload.name.is_empty() {
        OPUS
    } else {
        payload.name.as_str()
    };
    section.rtpmaps.push(RtpMap {
        payload: payload.id,
        encoding: name.to_string(),
        clock_rate: Some(payload.clockrate),
        channels: payload.channels,
    });
    for fb in &payload.rtcp_fbs {
        section.rtcp_fbs.push(RtcpFb {
            payload: payload.id.to_string(),
            kind: fb.kind.clone(),
            subtype: fb.subtype.clone(),
        });
    }
    if !payload.parameters.is_empty() {
        let config = payload
            .parameters
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";");
        section.fmtps.push(Fmtp {
            payload: payload.id,
            config,
        });
    }
}

fn push_ssrc_lines(section: &mut MediaSection, info: &MediaStreamInfo) {
    let attrs = [
        ("cname", info.cname.clone()),
        ("msid", format!("{} {}", info.mslabel, info.label)),
        ("mslabel", info.mslabel.clone()),
        ("label", info.label.clone()),
    ];
    for (attribute, value) in attrs {
        section.ssrcs.push(SsrcAttribute {
            id: info.ssrc,
            attribute: attribute.to_string(),
            value: Some(value),
        });
    }
}

/// Fold the client's answer into `description`.
///
/// The audio SSRCs are replaced with exactly those of the answer's audio
/// section. The DTLS fingerprint is read from the session level first, ICE
/// credentials from the audio section first.
///
/// # Errors
///
/// `IntercomError::Negotiation` if the answer does not parse or lacks an
/// audio section, a fingerprint, ICE credentials, or SSRCs.
pub fn apply_answer(
    description: &EndpointDescription,
    answer: &str,
) -> Result<EndpointDescription, IntercomError> {
    let sdp: SessionDescription = answer.parse()?;
    let negotiation = |reason: &str| IntercomError::Negotiation(reason.to_string());

    let section = sdp
        .first_media(&MediaKind::Audio)
        .ok_or_else(|| negotiation("answer has no audio section"))?;

    let fingerprint = sdp
        .fingerprint
        .as_ref()
        .or(section.fingerprint.as_ref())
        .ok_or_else(|| negotiation("answer has no DTLS fingerprint"))?;

    let ufrag = section
        .ice_ufrag
        .as_ref()
        .or(sdp.ice_ufrag.as_ref())
        .ok_or_else(|| negotiation("answer has no ICE ufrag"))?;
    let pwd = section
        .ice_pwd
        .as_ref()
        .or(sdp.ice_pwd.as_ref())
        .ok_or_else(|| negotiation("answer has no ICE pwd"))?;

    let ssrcs = section.ssrc_ids();
    if ssrcs.is_empty() {
        return Err(negotiation("answer audio section has no SSRC"));
    }

    let candidates = if section.candidates.is_empty() {
        sdp.media
            .iter()
            .find(|m| !m.candidates.is_empty())
            .map(|m| m.candidates.as_slice())
            .unwrap_or_default()
    } else {
        section.candidates.as_slice()
    };

    let setup = section
        .setup
        .as_deref()
        .or(sdp.setup.as_deref())
        .unwrap_or("active");

    let mut updated = description.clone();
    updated.bundle_transport.ice = IceTransport {
        ufrag: ufrag.clone(),
        pwd: pwd.clone(),
        candidates: candidates.iter().map(to_bridge_candidate).collect(),
    };
    updated.bundle_transport.dtls = DtlsTransport {
        setup: setup.to_string(),
        hash_type: fingerprint.hash_type.clone(),
        hash: fingerprint.hash.clone(),
    };
    if let Some(audio) = updated.audio.as_mut() {
        audio.ssrcs = ssrcs;
    }

    Ok(updated)
}
