//! SDP ⇄ endpoint-description negotiation.
//!
//! Pure functions, no I/O. Two flows share only the helpers in this module:
//!
//! - `server_offer` - the broker builds the offer from a freshly allocated
//!   endpoint and later folds the client's answer back into it.
//! - `client_offer` - WHIP/WHEP: the client offers, the broker rewrites the
//!   endpoint from that offer and produces the answer.

mod client_offer;
mod server_offer;

pub use client_offer::{configure_from_offer, create_answer};
pub use server_offer::{apply_answer, create_offer};

use crate::bridge::types::{IceCandidate, RtpHeaderExtension};
use crate::sdp::{Candidate, ExtMap, MediaSection};
use rand::distributions::Alphanumeric;
use rand::Rng;

pub(crate) const OPUS: &str = "opus";
pub(crate) const RTX: &str = "rtx";

/// Video codecs the bridge forwards.
pub(crate) const SUPPORTED_VIDEO_CODECS: [&str; 3] = ["VP8", "H264", "VP9"];

pub(crate) const SSRC_AUDIO_LEVEL_URI: &str = "urn:ietf:params:rtp-hdrext:ssrc-audio-level";
pub(crate) const ABS_SEND_TIME_URI: &str =
    "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time";
pub(crate) const RTP_STREAM_ID_URI: &str = "urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id";

const AUDIO_EXTENSIONS: [&str; 2] = [SSRC_AUDIO_LEVEL_URI, ABS_SEND_TIME_URI];
const VIDEO_EXTENSIONS: [&str; 2] = [ABS_SEND_TIME_URI, RTP_STREAM_ID_URI];

/// Extension ids used when an offer carries no usable audio extensions.
const DEFAULT_AUDIO_EXTENSION_IDS: [(u8, &str); 2] =
    [(1, SSRC_AUDIO_LEVEL_URI), (3, ABS_SEND_TIME_URI)];

/// Throwaway per-SSRC identifiers that make a generated offer well formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStreamInfo {
    pub ssrc: u32,
    pub cname: String,
    pub mslabel: String,
    pub label: String,
}

impl MediaStreamInfo {
    /// One fresh set of identifiers per SSRC.
    pub fn generate(ssrcs: &[u32]) -> Vec<Self> {
        ssrcs
            .iter()
            .map(|&ssrc| Self {
                ssrc,
                cname: random_token(16),
                mslabel: random_token(36),
                label: random_token(36),
            })
            .collect()
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// SDP candidate → bridge candidate. Generation defaults to 0, network to 1.
pub(crate) fn to_bridge_candidate(candidate: &Candidate) -> IceCandidate {
    IceCandidate {
        generation: candidate.generation.unwrap_or(0),
        component: candidate.component,
        protocol: candidate.protocol.to_lowercase(),
        port: candidate.port,
        ip: candidate.ip.clone(),
        rel_port: candidate.rel_port,
        rel_addr: candidate.rel_addr.clone(),
        foundation: candidate.foundation.clone(),
        priority: candidate.priority,
        kind: candidate.kind.clone(),
        network: candidate.network_id.unwrap_or(1),
    }
}

/// Bridge candidate → SDP candidate.
pub(crate) fn to_sdp_candidate(candidate: &IceCandidate) -> Candidate {
    Candidate {
        foundation: candidate.foundation.clone(),
        component: candidate.component,
        protocol: candidate.protocol.clone(),
        priority: candidate.priority,
        ip: candidate.ip.clone(),
        port: candidate.port,
        kind: candidate.kind.clone(),
        rel_addr: candidate.rel_addr.clone(),
        rel_port: candidate.rel_port,
        generation: Some(candidate.generation),
        network_id: None,
        extensions: Vec::new(),
    }
}

/// The answerer's DTLS role for an offered `setup` value.
pub(crate) fn flip_setup(offered: &str) -> &'static str {
    match offered.trim() {
        "active" => "passive",
        _ => "active",
    }
}

/// Audio header extensions for the answer: the offered ones on the
/// allow-list, or the default pair when none are.
pub(crate) fn audio_extensions(section: &MediaSection) -> Vec<ExtMap> {
    let offered = filter_extensions(section, &AUDIO_EXTENSIONS);
    if !offered.is_empty() {
        return offered;
    }
    default_audio_extensions()
}

/// Audio header extensions for the configure call: every offered one with
/// its offered id, or the default pair when the section offers none.
pub(crate) fn offered_audio_extensions(section: &MediaSection) -> Vec<ExtMap> {
    if section.extmaps.is_empty() {
        return default_audio_extensions();
    }
    section.extmaps.clone()
}

fn default_audio_extensions() -> Vec<ExtMap> {
    DEFAULT_AUDIO_EXTENSION_IDS
        .iter()
        .map(|(id, uri)| ExtMap {
            id: *id,
            direction: None,
            uri: (*uri).to_string(),
            attributes: None,
        })
        .collect()
}

/// Offered video header extensions on the allow-list.
pub(crate) fn video_extensions(section: &MediaSection) -> Vec<ExtMap> {
    filter_extensions(section, &VIDEO_EXTENSIONS)
}

fn filter_extensions(section: &MediaSection, allowed: &[&str]) -> Vec<ExtMap> {
    section
        .extmaps
        .iter()
        .filter(|ext| allowed.contains(&ext.uri.as_str()))
        .cloned()
        .collect()
}

pub(crate) fn to_bridge_extensions(extmaps: &[ExtMap]) -> Vec<RtpHeaderExtension> {
    extmaps
        .iter()
        .map(|ext| RtpHeaderExtension {
            id: ext.id,
            uri: ext.uri.clone(),
        })
        .collect()
}

/// Payload id of the first `rtpmap` in `section` whose encoding is `name`,
/// in `m=` line order.
pub(crate) fn payload_for_codec(section: &MediaSection, name: &str) -> Option<u8> {
    section.payload_ids().into_iter().find(|&pt| {
        section
            .rtpmap(pt)
            .is_some_and(|map| map.encoding.eq_ignore_ascii_case(name))
    })
}

/// The RTX payload whose `apt` points at `primary`.
pub(crate) fn rtx_for(section: &MediaSection, primary: u8) -> Option<u8> {
    section.payload_ids().into_iter().find(|&pt| {
        section
            .rtpmap(pt)
            .is_some_and(|map| map.encoding.eq_ignore_ascii_case(RTX))
            && section
                .fmtp(pt)
                .and_then(|fmtp| fmtp.parameter("apt"))
                .and_then(|apt| apt.parse::<u8>().ok())
                == Some(primary)
    })
}

/// The video codec the bridge will be configured with: the first offered
/// payload, in `m=` line order, whose codec the bridge forwards.
pub(crate) fn select_video_codec(section: &MediaSection) -> Option<u8> {
    section.payload_ids().into_iter().find(|&pt| {
        section.rtpmap(pt).is_some_and(|map| {
            SUPPORTED_VIDEO_CODECS
                .iter()
                .any(|codec| map.encoding.eq_ignore_ascii_case(codec))
        })
    })
}
