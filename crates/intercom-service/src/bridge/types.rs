//! Wire types of the media bridge conference/endpoint protocol.
//!
//! Field names are part of the bridge contract and are preserved exactly via
//! `#[serde(rename)]`. Numeric fields that some bridge builds emit as strings
//! (SSRCs, ports, priorities, payload ids) are coerced here, at the JSON
//! boundary, so the negotiation code only ever handles integers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Allocation requests
// ============================================================================

/// How the bridge relays audio between endpoints of a conference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelayType {
    SsrcRewrite,
    Forwarder,
    Mixed,
}

impl RelayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayType::SsrcRewrite => "ssrc-rewrite",
            RelayType::Forwarder => "forwarder",
            RelayType::Mixed => "mixed",
        }
    }
}

/// Parameters of an endpoint allocation.
///
/// `audio` and `video` name the media the session negotiates. The request
/// itself always carries both placeholder blocks; blocks the session did not
/// ask for are dropped from the bridge's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointAllocation {
    pub audio: bool,
    pub video: bool,
    pub data: bool,
    pub ice_controlling: bool,
    pub relay_type: RelayType,
    pub idle_timeout_seconds: Option<u64>,
}

impl EndpointAllocation {
    /// Audio + data channel, bridge controls ICE. Used for server-offer sessions.
    pub fn audio_with_data(idle_timeout_seconds: u64) -> Self {
        Self {
            audio: true,
            video: false,
            data: true,
            ice_controlling: true,
            relay_type: RelayType::SsrcRewrite,
            idle_timeout_seconds: Some(idle_timeout_seconds),
        }
    }

    /// Audio + video, client controls ICE. Used for WHIP/WHEP sessions.
    pub fn ingest(idle_timeout_seconds: u64) -> Self {
        Self {
            audio: true,
            video: true,
            data: false,
            ice_controlling: false,
            relay_type: RelayType::SsrcRewrite,
            idle_timeout_seconds: Some(idle_timeout_seconds),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AllocateEndpointRequest {
    pub action: &'static str,
    #[serde(rename = "bundle-transport")]
    pub bundle_transport: AllocateBundleTransport,
    pub audio: AllocateMedia,
    pub video: AllocateMedia,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<AllocateData>,
    #[serde(rename = "idleTimeout", skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<u64>,
}

impl From<&EndpointAllocation> for AllocateEndpointRequest {
    fn from(allocation: &EndpointAllocation) -> Self {
        let media = || AllocateMedia {
            relay_type: allocation.relay_type,
            ssrcs: Vec::new(),
        };
        Self {
            action: "allocate",
            bundle_transport: AllocateBundleTransport {
                ice_controlling: allocation.ice_controlling,
                ice: true,
                dtls: true,
                sdes: false,
            },
            audio: media(),
            video: media(),
            data: allocation.data.then_some(AllocateData {}),
            idle_timeout: allocation.idle_timeout_seconds,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AllocateBundleTransport {
    #[serde(rename = "ice-controlling")]
    pub ice_controlling: bool,
    pub ice: bool,
    pub dtls: bool,
    pub sdes: bool,
}

/// Placeholder media block; the bridge fills in the SSRCs it owns.
#[derive(Debug, Serialize)]
pub(crate) struct AllocateMedia {
    #[serde(rename = "relay-type")]
    pub relay_type: RelayType,
    pub ssrcs: Vec<u32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AllocateData {}

#[derive(Debug, Deserialize)]
pub(crate) struct AllocateConferenceResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ConfigureEndpointRequest<'a> {
    pub action: &'static str,
    #[serde(flatten)]
    pub description: &'a EndpointDescription,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExpireEndpointRequest {
    pub action: &'static str,
}

// ============================================================================
// Endpoint description
// ============================================================================

/// The bridge's description of one endpoint's transport and codecs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescription {
    #[serde(rename = "bundle-transport")]
    pub bundle_transport: BundleTransport,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioDescription>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoDescription>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DataDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleTransport {
    #[serde(
        rename = "ice-controlling",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ice_controlling: Option<bool>,

    pub ice: IceTransport,

    pub dtls: DtlsTransport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceTransport {
    pub ufrag: String,
    pub pwd: String,
    #[serde(default)]
    pub candidates: Vec<IceCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidate {
    #[serde(default, deserialize_with = "lenient::u32")]
    pub generation: u32,

    #[serde(deserialize_with = "lenient::u32")]
    pub component: u32,

    pub protocol: String,

    #[serde(deserialize_with = "lenient::u16")]
    pub port: u16,

    pub ip: String,

    #[serde(
        rename = "rel-port",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_u16"
    )]
    pub rel_port: Option<u16>,

    #[serde(rename = "rel-addr", default, skip_serializing_if = "Option::is_none")]
    pub rel_addr: Option<String>,

    pub foundation: String,

    #[serde(deserialize_with = "lenient::u32")]
    pub priority: u32,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default = "default_network", deserialize_with = "lenient::u32")]
    pub network: u32,
}

fn default_network() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtlsTransport {
    pub setup: String,
    /// Fingerprint hash function, e.g. `sha-256`.
    #[serde(rename = "type")]
    pub hash_type: String,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDescription {
    #[serde(default, deserialize_with = "lenient::u32_vec")]
    pub ssrcs: Vec<u32>,

    #[serde(rename = "payload-type")]
    pub payload_type: PayloadType,

    #[serde(rename = "rtp-hdrexts", default)]
    pub rtp_hdrexts: Vec<RtpHeaderExtension>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDescription {
    #[serde(default)]
    pub streams: Vec<VideoStream>,

    #[serde(rename = "payload-types", default)]
    pub payload_types: Vec<PayloadType>,

    #[serde(rename = "rtp-hdrexts", default)]
    pub rtp_hdrexts: Vec<RtpHeaderExtension>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStream {
    pub sources: Vec<VideoSource>,
    pub id: String,
    pub content: String,
}

/// A main SSRC and, when the sender uses retransmission, its RTX SSRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSource {
    #[serde(deserialize_with = "lenient::u32")]
    pub main: u32,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_u32"
    )]
    pub feedback: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDescription {
    #[serde(deserialize_with = "lenient::u16")]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadType {
    #[serde(deserialize_with = "lenient::u8")]
    pub id: u8,

    pub name: String,

    #[serde(default, deserialize_with = "lenient::u32")]
    pub clockrate: u32,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_u8"
    )]
    pub channels: Option<u8>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParamValue>,

    #[serde(rename = "rtcp-fbs", default, skip_serializing_if = "Vec::is_empty")]
    pub rtcp_fbs: Vec<RtcpFeedback>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcpFeedback {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpHeaderExtension {
    #[serde(deserialize_with = "lenient::u8")]
    pub id: u8,
    pub uri: String,
}

/// A codec parameter value. Bridges send these as strings or bare numbers;
/// both are held as text and always sent back as strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ParamValue(pub String);

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => Ok(ParamValue(s)),
            serde_json::Value::Number(n) => Ok(ParamValue(n.to_string())),
            serde_json::Value::Bool(b) => Ok(ParamValue(b.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "unsupported codec parameter value: {other}"
            ))),
        }
    }
}

// ============================================================================
// Conference detail
// ============================================================================

/// Per-endpoint state reported by the bridge for one conference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStatus {
    pub id: String,
    #[serde(default)]
    pub is_dominant_speaker: bool,
    #[serde(default)]
    pub is_active_talker: bool,
    #[serde(default)]
    pub ice_state: String,
    #[serde(default)]
    pub dtls_state: String,
}

impl EndpointStatus {
    /// True when either transport layer reports a terminal failure.
    pub fn is_failed(&self) -> bool {
        self.ice_state.eq_ignore_ascii_case("FAILED") || self.dtls_state.eq_ignore_ascii_case("FAILED")
    }
}

mod lenient {
    //! Integer deserializers that also accept numeric strings.

    use serde::{de::Error, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(u64),
        Str(String),
    }

    impl NumOrStr {
        fn into_u64<E: Error>(self) -> Result<u64, E> {
            match self {
                NumOrStr::Num(n) => Ok(n),
                NumOrStr::Str(s) => s
                    .trim()
                    .parse()
                    .map_err(|_| E::custom(format!("expected an integer, got '{s}'"))),
            }
        }
    }

    fn narrow<T: TryFrom<u64>, E: Error>(value: u64) -> Result<T, E> {
        T::try_from(value).map_err(|_| E::custom(format!("integer {value} out of range")))
    }

    pub fn u8<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
        narrow(NumOrStr::deserialize(d)?.into_u64()?)
    }

    pub fn u16<'de, D: Deserializer<'de>>(d: D) -> Result<u16, D::Error> {
        narrow(NumOrStr::deserialize(d)?.into_u64()?)
    }

    pub fn u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        narrow(NumOrStr::deserialize(d)?.into_u64()?)
    }

    pub fn opt_u8<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u8>, D::Error> {
        Option::<NumOrStr>::deserialize(d)?
            .map(|v| v.into_u64().and_then(narrow))
            .transpose()
    }

    pub fn opt_u16<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u16>, D::Error> {
        Option::<NumOrStr>::deserialize(d)?
            .map(|v| v.into_u64().and_then(narrow))
            .transpose()
    }

    pub fn opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        Option::<NumOrStr>::deserialize(d)?
            .map(|v| v.into_u64().and_then(narrow))
            .transpose()
    }

    pub fn u32_vec<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u32>, D::Error> {
        Vec::<NumOrStr>::deserialize(d)?
            .into_iter()
            .map(|v| v.into_u64().and_then(narrow))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn allocated_json() -> serde_json::Value {
        json!({
            "bundle-transport": {
                "ice": {
                    "ufrag": "bridgeUfrag",
                    "pwd": "bridgePwd",
                    "candidates": [{
                        "generation": 0,
                        "component": 1,
                        "protocol": "udp",
                        "port": 10000,
                        "ip": "192.0.2.10",
                        "foundation": "716437133",
                        "priority": 2_130_706_431u32,
                        "type": "host",
                        "network": 1
                    }]
                },
                "dtls": { "setup": "actpass", "type": "sha-256", "hash": "AB:CD" }
            },
            "audio": {
                "ssrcs": [1111, "2222"],
                "payload-type": {
                    "id": 111,
                    "name": "opus",
                    "clockrate": 48000,
                    "channels": 2,
                    "parameters": { "minptime": "10", "useinbandfec": 1 },
                    "rtcp-fbs": []
                },
                "rtp-hdrexts": [{ "id": 1, "uri": "urn:ietf:params:rtp-hdrext:ssrc-audio-level" }]
            },
            "data": { "port": 5000 }
        })
    }

    #[test]
    fn test_endpoint_description_deserializes_with_coercion() {
        let description: EndpointDescription = serde_json::from_value(allocated_json()).unwrap();

        let audio = description.audio.as_ref().unwrap();
        assert_eq!(audio.ssrcs, vec![1111, 2222]);
        assert_eq!(audio.payload_type.id, 111);
        assert_eq!(
            audio.payload_type.parameters.get("useinbandfec"),
            Some(&ParamValue::from("1"))
        );
        assert_eq!(description.bundle_transport.ice.candidates.len(), 1);
        assert_eq!(description.data.as_ref().unwrap().port, 5000);
        assert!(description.video.is_none());
    }

    #[test]
    fn test_endpoint_description_requires_transport() {
        let result: Result<EndpointDescription, _> =
            serde_json::from_value(json!({ "audio": allocated_json()["audio"] }));
        assert!(result.is_err());
    }

    #[test]
    fn test_video_source_without_feedback_omits_key() {
        let source = VideoSource {
            main: 200,
            feedback: None,
        };
        let json = serde_json::to_value(source).unwrap();
        assert_eq!(json, json!({ "main": 200 }));
    }

    #[test]
    fn test_allocate_request_shape() {
        let request = AllocateEndpointRequest::from(&EndpointAllocation::audio_with_data(60));
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["action"], "allocate");
        assert_eq!(json["bundle-transport"]["ice-controlling"], true);
        assert_eq!(json["bundle-transport"]["sdes"], false);
        assert_eq!(json["audio"]["relay-type"], "ssrc-rewrite");
        assert_eq!(json["audio"]["ssrcs"], json!([]));
        assert_eq!(json["video"]["ssrcs"], json!([]));
        assert_eq!(json["data"], json!({}));
        assert_eq!(json["idleTimeout"], 60);
    }

    #[test]
    fn test_configure_request_injects_action() {
        let description: EndpointDescription = serde_json::from_value(allocated_json()).unwrap();
        let request = ConfigureEndpointRequest {
            action: "configure",
            description: &description,
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["action"], "configure");
        assert_eq!(json["audio"]["ssrcs"], json!([1111, 2222]));
        assert_eq!(json["bundle-transport"]["ice"]["ufrag"], "bridgeUfrag");
    }

    #[test]
    fn test_relay_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&RelayType::SsrcRewrite).unwrap(),
            "\"ssrc-rewrite\""
        );
        assert_eq!(RelayType::Forwarder.as_str(), "forwarder");
        assert_eq!(RelayType::Mixed.as_str(), "mixed");
    }

    #[test]
    fn test_endpoint_status_failure_detection() {
        let status: EndpointStatus = serde_json::from_value(json!({
            "id": "ep-1",
            "iceState": "FAILED",
            "dtlsState": "CONNECTED"
        }))
        .unwrap();
        assert!(status.is_failed());
        assert!(!status.is_dominant_speaker);
    }
}
