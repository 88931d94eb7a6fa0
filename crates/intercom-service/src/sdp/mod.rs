//! SDP model for the subset of RFC 4566 / RFC 8866 that WebRTC endpoints emit.
//!
//! Known attributes are parsed into typed fields. Anything else is kept as an
//! [`Attribute`] and written back unchanged, so an offer can be rewritten
//! without losing lines this module does not understand.
//!
//! - `parse` - text to [`SessionDescription`]
//! - `serialize` - [`SessionDescription`] back to CRLF-terminated text

mod parse;
mod serialize;

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::errors::IntercomError;

/// SDP parse failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SdpError {
    #[error("SDP is empty")]
    Empty,

    #[error("SDP must start with a v= line")]
    MissingVersion,

    #[error("invalid {kind}= line: {reason}")]
    InvalidLine { kind: char, reason: String },

    #[error("invalid a={name} attribute: {reason}")]
    InvalidAttribute { name: String, reason: String },
}

impl From<SdpError> for IntercomError {
    fn from(e: SdpError) -> Self {
        IntercomError::Negotiation(e.to_string())
    }
}

/// A full session description.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDescription {
    pub version: u32,
    pub origin: Origin,
    pub session_name: String,
    pub connection: Option<String>,
    pub bandwidths: Vec<String>,
    pub timing: String,
    /// Session-level lines with types this model does not name (`i=`, `u=`, ...).
    pub other_lines: Vec<(char, String)>,
    pub groups: Vec<Group>,
    pub msid_semantic: Option<MsidSemantic>,
    pub ice_ufrag: Option<String>,
    pub ice_pwd: Option<String>,
    pub ice_options: Option<String>,
    pub fingerprint: Option<Fingerprint>,
    pub setup: Option<String>,
    pub attributes: Vec<Attribute>,
    pub media: Vec<MediaSection>,
}

impl Default for SessionDescription {
    fn default() -> Self {
        Self {
            version: 0,
            origin: Origin::default(),
            session_name: "-".to_string(),
            connection: None,
            bandwidths: Vec::new(),
            timing: "0 0".to_string(),
            other_lines: Vec::new(),
            groups: Vec::new(),
            msid_semantic: None,
            ice_ufrag: None,
            ice_pwd: None,
            ice_options: None,
            fingerprint: None,
            setup: None,
            attributes: Vec::new(),
            media: Vec::new(),
        }
    }
}

impl SessionDescription {
    /// The first media section of `kind`.
    pub fn first_media(&self, kind: &MediaKind) -> Option<&MediaSection> {
        self.media.iter().find(|m| &m.kind == kind)
    }

    /// Mids of all media sections, in order. Sections without a mid are skipped.
    pub fn mids(&self) -> Vec<String> {
        self.media.iter().filter_map(|m| m.mid.clone()).collect()
    }
}

impl FromStr for SessionDescription {
    type Err = SdpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse::parse(s)
    }
}

/// `o=<username> <sess-id> <sess-version> <nettype> <addrtype> <address>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub username: String,
    /// Kept as text: browsers emit ids wider than `u64`.
    pub session_id: String,
    pub session_version: u64,
    pub net_type: String,
    pub addr_type: String,
    pub address: String,
}

impl Default for Origin {
    fn default() -> Self {
        Self {
            username: "-".to_string(),
            session_id: "0".to_string(),
            session_version: 1,
            net_type: "IN".to_string(),
            addr_type: "IP4".to_string(),
            address: "127.0.0.1".to_string(),
        }
    }
}

/// `a=group:<semantics> <mid>...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub semantics: String,
    pub mids: Vec<String>,
}

impl Group {
    pub fn bundle(mids: Vec<String>) -> Self {
        Self {
            semantics: "BUNDLE".to_string(),
            mids,
        }
    }
}

/// `a=msid-semantic: <semantic> <identifier>...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsidSemantic {
    pub semantic: String,
    pub identifiers: Vec<String>,
}

/// `a=fingerprint:<hash-function> <hash>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub hash_type: String,
    pub hash: String,
}

/// An attribute this model does not interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
}

impl Attribute {
    pub fn flag(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    Application,
    Other(String),
}

impl MediaKind {
    pub fn as_str(&self) -> &str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Application => "application",
            MediaKind::Other(other) => other,
        }
    }
}

impl From<&str> for MediaKind {
    fn from(value: &str) -> Self {
        match value {
            "audio" => MediaKind::Audio,
            "video" => MediaKind::Video,
            "application" => MediaKind::Application,
            other => MediaKind::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::SendRecv => "sendrecv",
            Direction::SendOnly => "sendonly",
            Direction::RecvOnly => "recvonly",
            Direction::Inactive => "inactive",
        }
    }

    fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "sendrecv" => Some(Direction::SendRecv),
            "sendonly" => Some(Direction::SendOnly),
            "recvonly" => Some(Direction::RecvOnly),
            "inactive" => Some(Direction::Inactive),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `a=candidate:<foundation> <component> <transport> <priority> <ip> <port> typ <type> [...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub foundation: String,
    pub component: u32,
    pub protocol: String,
    pub priority: u32,
    pub ip: String,
    pub port: u16,
    pub kind: String,
    pub rel_addr: Option<String>,
    pub rel_port: Option<u16>,
    pub generation: Option<u32>,
    pub network_id: Option<u32>,
    /// Remaining key/value extensions (`tcptype`, `ufrag`, `network-cost`, ...).
    pub extensions: Vec<(String, String)>,
}

/// `a=rtpmap:<payload> <encoding>/<clock rate>[/<channels>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpMap {
    pub payload: u8,
    pub encoding: String,
    pub clock_rate: Option<u32>,
    pub channels: Option<u8>,
}

/// `a=fmtp:<payload> <parameters>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fmtp {
    pub payload: u8,
    pub config: String,
}

impl Fmtp {
    /// `key=value` pairs of the config string. Bare tokens get an empty value.
    pub fn parameters(&self) -> Vec<(String, String)> {
        self.config
            .split(';')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| match p.split_once('=') {
                Some((k, v)) => (k.trim().to_string(), v.trim().to_string()),
                None => (p.to_string(), String::new()),
            })
            .collect()
    }

    /// Value of one parameter.
    pub fn parameter(&self, name: &str) -> Option<String> {
        self.parameters()
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

/// `a=rtcp-fb:<payload|*> <type> [<subtype>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpFb {
    pub payload: String,
    pub kind: String,
    pub subtype: Option<String>,
}

impl RtcpFb {
    /// Numeric payload, `None` for the `*` wildcard.
    pub fn payload_id(&self) -> Option<u8> {
        self.payload.parse().ok()
    }
}

/// `a=extmap:<id>[/<direction>] <uri> [<attributes>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtMap {
    pub id: u8,
    pub direction: Option<String>,
    pub uri: String,
    pub attributes: Option<String>,
}

/// `a=ssrc:<ssrc> <attribute>[:<value>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsrcAttribute {
    pub id: u32,
    pub attribute: String,
    pub value: Option<String>,
}

/// `a=ssrc-group:<semantics> <ssrc>...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsrcGroup {
    pub semantics: String,
    pub ssrcs: Vec<u32>,
}

/// One `m=` section and its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSection {
    pub kind: MediaKind,
    pub port: u16,
    pub protocol: String,
    /// Payload numbers for RTP media, format tokens otherwise.
    pub formats: Vec<String>,
    pub connection: Option<String>,
    pub bandwidths: Vec<String>,
    pub other_lines: Vec<(char, String)>,
    pub mid: Option<String>,
    pub direction: Option<Direction>,
    pub ice_ufrag: Option<String>,
    pub ice_pwd: Option<String>,
    pub ice_options: Option<String>,
    pub fingerprint: Option<Fingerprint>,
    pub setup: Option<String>,
    pub candidates: Vec<Candidate>,
    pub rtcp: Option<String>,
    pub rtcp_mux: bool,
    pub rtcp_rsize: bool,
    pub rtpmaps: Vec<RtpMap>,
    pub fmtps: Vec<Fmtp>,
    pub rtcp_fbs: Vec<RtcpFb>,
    pub extmaps: Vec<ExtMap>,
    pub ssrcs: Vec<SsrcAttribute>,
    pub ssrc_groups: Vec<SsrcGroup>,
    pub msid: Option<String>,
    pub sctp_port: Option<u16>,
    pub max_message_size: Option<u32>,
    pub attributes: Vec<Attribute>,
}

impl MediaSection {
    pub fn new(kind: MediaKind, protocol: &str) -> Self {
        Self {
            kind,
            port: 9,
            protocol: protocol.to_string(),
            formats: Vec::new(),
            connection: None,
            bandwidths: Vec::new(),
            other_lines: Vec::new(),
            mid: None,
            direction: None,
            ice_ufrag: None,
            ice_pwd: None,
            ice_options: None,
            fingerprint: None,
            setup: None,
            candidates: Vec::new(),
            rtcp: None,
            rtcp_mux: false,
            rtcp_rsize: false,
            rtpmaps: Vec::new(),
            fmtps: Vec::new(),
            rtcp_fbs: Vec::new(),
            extmaps: Vec::new(),
            ssrcs: Vec::new(),
            ssrc_groups: Vec::new(),
            msid: None,
            sctp_port: None,
            max_message_size: None,
            attributes: Vec::new(),
        }
    }

    /// Numeric payload types from the `m=` line, in order, without repeats.
    pub fn payload_ids(&self) -> Vec<u8> {
        let mut ids = Vec::new();
        for id in self.formats.iter().filter_map(|f| f.parse::<u8>().ok()) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    pub fn rtpmap(&self, payload: u8) -> Option<&RtpMap> {
        self.rtpmaps.iter().find(|r| r.payload == payload)
    }

    pub fn fmtp(&self, payload: u8) -> Option<&Fmtp> {
        self.fmtps.iter().find(|f| f.payload == payload)
    }

    /// Distinct SSRCs in order of first appearance.
    pub fn ssrc_ids(&self) -> Vec<u32> {
        let mut ids = Vec::new();
        for attr in &self.ssrcs {
            if !ids.contains(&attr.id) {
                ids.push(attr.id);
            }
        }
        ids
    }

    /// Distinct SSRCs that carry an `msid` attribute, in order.
    pub fn msid_ssrc_ids(&self) -> Vec<u32> {
        let mut ids = Vec::new();
        for attr in self.ssrcs.iter().filter(|a| a.attribute == "msid") {
            if !ids.contains(&attr.id) {
                ids.push(attr.id);
            }
        }
        ids
    }

    /// Value of attribute `name` on SSRC `id`.
    pub fn ssrc_attribute(&self, id: u32, name: &str) -> Option<&str> {
        self.ssrcs
            .iter()
            .find(|a| a.id == id && a.attribute == name)
            .and_then(|a| a.value.as_deref())
    }

    /// Keep only `keep` payloads, in the given order, along with their
    /// `rtpmap`, `fmtp` and `rtcp-fb` lines. Wildcard `rtcp-fb` lines stay.
    pub fn retain_payloads(&mut self, keep: &[u8]) {
        let mut order: Vec<u8> = Vec::with_capacity(keep.len());
        for id in keep {
            if !order.contains(id) {
                order.push(*id);
            }
        }

        self.formats = order.iter().map(u8::to_string).collect();
        self.rtpmaps.retain(|r| order.contains(&r.payload));
        self.fmtps.retain(|f| order.contains(&f.payload));
        self.rtcp_fbs
            .retain(|fb| fb.payload == "*" || fb.payload_id().is_some_and(|id| order.contains(&id)));
    }

    /// Drop every `a=ssrc`, `a=ssrc-group` and `a=msid` line.
    pub fn strip_ssrcs(&mut self) {
        self.ssrcs.clear();
        self.ssrc_groups.clear();
        self.msid = None;
    }

    pub fn is_rtp(&self) -> bool {
        matches!(self.kind, MediaKind::Audio | MediaKind::Video)
    }
}
