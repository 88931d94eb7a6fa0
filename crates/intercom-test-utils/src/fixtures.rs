//! Pre-built SDP and bridge payloads.

use serde_json::{json, Value};

/// Audio-only WHIP offer: one Opus sender with SSRC 555, ICE ufrag `abc`,
/// fingerprint `sha-256 AA:BB` and a single host candidate.
pub const WHIP_AUDIO_OFFER: &str = "v=0\r\n\
o=- 7000 1 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 0\r\n\
a=msid-semantic: WMS s1\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
c=IN IP4 0.0.0.0\r\n\
a=ice-ufrag:abc\r\n\
a=ice-pwd:abcdefghijklmnopqrstuv\r\n\
a=fingerprint:sha-256 AA:BB\r\n\
a=setup:actpass\r\n\
a=mid:0\r\n\
a=extmap:1 urn:ietf:params:rtp-hdrext:ssrc-audio-level\r\n\
a=sendonly\r\n\
a=rtcp-mux\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=fmtp:111 minptime=10;useinbandfec=1\r\n\
a=ssrc:555 cname:client\r\n\
a=ssrc:555 msid:s1 a1\r\n\
a=candidate:1 1 udp 2122260223 192.168.1.5 54321 typ host generation 0\r\n";

/// Answer to a broker-issued offer (data section `0`, audio section `1`),
/// announcing client SSRC 3 and ufrag `client`.
pub const LEGACY_ANSWER: &str = "v=0\r\n\
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

/// Bridge response to an endpoint allocation with audio, video and data.
///
/// Several integers are sent as strings, the way some bridge builds do.
pub fn bridge_endpoint_json() -> Value {
    json!({
        "bundle-transport": {
            "ice-controlling": true,
            "ice": {
                "ufrag": "bridgeufrag",
                "pwd": "bridgepasswordbridgepassword",
                "candidates": [{
                    "generation": "0",
                    "component": 1,
                    "protocol": "udp",
                    "port": "10000",
                    "ip": "203.0.113.10",
                    "foundation": "1",
                    "priority": "2130706431",
                    "type": "host",
                    "network": 1
                }]
            },
            "dtls": {
                "setup": "actpass",
                "type": "sha-256",
                "hash": "11:22:33:44"
            }
        },
        "audio": {
            "ssrcs": ["1111"],
            "payload-type": {
                "id": 111,
                "name": "opus",
                "clockrate": 48000,
                "channels": 2,
                "parameters": { "minptime": 10, "useinbandfec": "1" }
            },
            "rtp-hdrexts": [
                { "id": 1, "uri": "urn:ietf:params:rtp-hdrext:ssrc-audio-level" }
            ]
        },
        "video": {
            "streams": [{
                "sources": [{ "main": 2222, "feedback": "3333" }],
                "id": "bridge-video",
                "content": "video"
            }],
            "payload-types": [
                {
                    "id": 100,
                    "name": "VP8",
                    "clockrate": 90000,
                    "rtcp-fbs": [{ "type": "nack" }, { "type": "nack", "subtype": "pli" }]
                },
                {
                    "id": 96,
                    "name": "rtx",
                    "clockrate": 90000,
                    "parameters": { "apt": 100 }
                }
            ],
            "rtp-hdrexts": []
        },
        "data": { "port": 5000 }
    })
}

/// One entry of a conference detail listing.
pub fn endpoint_status_json(id: &str, ice_state: &str, dtls_state: &str) -> Value {
    json!({
        "id": id,
        "isDominantSpeaker": false,
        "isActiveTalker": false,
        "iceState": ice_state,
        "dtlsState": dtls_state
    })
}
