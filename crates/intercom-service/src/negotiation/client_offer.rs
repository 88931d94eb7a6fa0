//! Client-offer flow (WHIP ingest / WHEP egress).
//!
//! `configure_from_offer` rewrites the allocated endpoint from the client's
//! offer; `create_answer` answers that offer with the bridge's transport.
//! The answer must be built from the *allocated* description, since the
//! configured one carries the client's ICE/DTLS parameters.

use super::{
    audio_extensions, flip_setup, offered_audio_extensions, payload_for_codec, rtx_for, select_video_codec,
    to_bridge_candidate, to_bridge_extensions, to_sdp_candidate, video_extensions, OPUS, RTX,
};
use crate::bridge::types::{
    DtlsTransport, EndpointDescription, IceTransport, ParamValue, PayloadType, RtcpFeedback,
    VideoDescription, VideoSource, VideoStream,
};
use crate::errors::IntercomError;
use crate::sdp::{
    Attribute, Direction, Fingerprint, Group, MediaKind, MediaSection, MsidSemantic,
    SessionDescription,
};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

const NULL_CONNECTION: &str = "IN IP4 0.0.0.0";
const NULL_RTCP: &str = "9 IN IP4 0.0.0.0";
const END_OF_CANDIDATES: &str = "end-of-candidates";

fn negotiation(reason: impl Into<String>) -> IntercomError {
    IntercomError::Negotiation(reason.into())
}

/// Rewrite the allocated endpoint from the client's offer.
///
/// Audio and video SSRCs are replaced with the offered ones, audio header
/// extensions are copied, video codecs and extensions are narrowed to what
/// the bridge forwards. The transport block takes the client's ICE
/// credentials, candidates and DTLS fingerprint.
///
/// # Errors
///
/// `IntercomError::Negotiation` if the offer does not parse, lacks ICE
/// credentials, a fingerprint or candidates, or if the selected video codec
/// has no clock rate.
pub fn configure_from_offer(
    allocated: &EndpointDescription,
    offer: &str,
) -> Result<EndpointDescription, IntercomError> {
    let sdp: SessionDescription = offer.parse()?;
    let mut updated = allocated.clone();

    if let Some(audio) = updated.audio.as_mut() {
        match sdp.first_media(&MediaKind::Audio) {
            Some(section) => {
                audio.ssrcs = tagged_ssrcs(section);
                if let Some(&id) = section.payload_ids().first() {
                    audio.payload_type.id = id;
                }
                audio.rtp_hdrexts = to_bridge_extensions(&offered_audio_extensions(section));
            }
            None => audio.ssrcs.clear(),
        }
    }

    updated.video = match allocated.video {
        Some(_) => video_from_offer(&sdp)?,
        None => None,
    };

    updated.bundle_transport.ice = IceTransport {
        ufrag: session_or_media(&sdp, sdp.ice_ufrag.as_ref(), |m| m.ice_ufrag.as_ref())
            .ok_or_else(|| negotiation("offer has no ICE ufrag"))?,
        pwd: session_or_media(&sdp, sdp.ice_pwd.as_ref(), |m| m.ice_pwd.as_ref())
            .ok_or_else(|| negotiation("offer has no ICE pwd"))?,
        candidates: sdp
            .media
            .iter()
            .find(|m| !m.candidates.is_empty())
            .map(|m| m.candidates.iter().map(to_bridge_candidate).collect())
            .ok_or_else(|| negotiation("offer has no ICE candidates"))?,
    };

    let fingerprint = session_or_media(&sdp, sdp.fingerprint.as_ref(), |m| m.fingerprint.as_ref())
        .ok_or_else(|| negotiation("offer has no DTLS fingerprint"))?;
    let setup = session_or_media(&sdp, sdp.setup.as_ref(), |m| m.setup.as_ref())
        .unwrap_or_else(|| "actpass".to_string());
    updated.bundle_transport.dtls = DtlsTransport {
        setup,
        hash_type: fingerprint.hash_type,
        hash: fingerprint.hash,
    };

    Ok(updated)
}

/// Session-level value, else the first media section that has one.
fn session_or_media<T: Clone>(
    sdp: &SessionDescription,
    session: Option<&T>,
    media: impl Fn(&MediaSection) -> Option<&T>,
) -> Option<T> {
    session
        .or_else(|| sdp.media.iter().find_map(&media))
        .cloned()
}

/// SSRCs carrying `msid`. Sections that only declare a media-level `a=msid`
/// contribute all of their SSRCs.
fn tagged_ssrcs(section: &MediaSection) -> Vec<u32> {
    let tagged = section.msid_ssrc_ids();
    if tagged.is_empty() && section.msid.is_some() {
        section.ssrc_ids()
    } else {
        tagged
    }
}

fn stream_id(section: &MediaSection, ssrc: u32) -> String {
    section
        .ssrc_attribute(ssrc, "msid")
        .or(section.msid.as_deref())
        .and_then(|msid| msid.split_whitespace().next())
        .unwrap_or("-")
        .to_string()
}

/// Group a video section's SSRCs into streams keyed by msid stream id.
/// FID pairs become `{main, feedback}`; feedback SSRCs never stand alone.
fn video_streams(section: &MediaSection) -> Vec<VideoStream> {
    let fid_groups: Vec<&[u32]> = section
        .ssrc_groups
        .iter()
        .filter(|g| g.semantics == "FID")
        .map(|g| g.ssrcs.as_slice())
        .collect();
    let feedback: HashSet<u32> = fid_groups.iter().filter_map(|g| g.get(1)).copied().collect();

    let mut streams: Vec<VideoStream> = Vec::new();
    for ssrc in tagged_ssrcs(section) {
        if feedback.contains(&ssrc) {
            continue;
        }
        let source = VideoSource {
            main: ssrc,
            feedback: fid_groups
                .iter()
                .find(|g| g.first() == Some(&ssrc))
                .and_then(|g| g.get(1).copied()),
        };

        let id = stream_id(section, ssrc);
        match streams.iter_mut().find(|s| s.id == id) {
            Some(stream) => stream.sources.push(source),
            None => streams.push(VideoStream {
                sources: vec![source],
                id,
                content: "video".to_string(),
            }),
        }
    }
    streams
}

fn video_from_offer(sdp: &SessionDescription) -> Result<Option<VideoDescription>, IntercomError> {
    let Some(first) = sdp.first_media(&MediaKind::Video) else {
        return Ok(None);
    };
    let Some(selected) = select_video_codec(first) else {
        debug!(target: "intercom.negotiation", "Offer has no forwardable video codec, dropping video");
        return Ok(None);
    };
    let map = first
        .rtpmap(selected)
        .ok_or_else(|| negotiation(format!("video payload {selected} has no rtpmap")))?;
    let clockrate = map
        .clock_rate
        .filter(|rate| *rate > 0)
        .ok_or_else(|| negotiation(format!("video codec {} has no clock rate", map.encoding)))?;

    let mut payload_types = vec![PayloadType {
        id: selected,
        name: map.encoding.clone(),
        clockrate,
        channels: None,
        parameters: first
            .fmtp(selected)
            .map(|fmtp| {
                fmtp.parameters()
                    .into_iter()
                    .map(|(k, v)| (k, ParamValue(v)))
                    .collect()
            })
            .unwrap_or_default(),
        rtcp_fbs: first
            .rtcp_fbs
            .iter()
            .filter(|fb| fb.payload_id() == Some(selected))
            .map(|fb| RtcpFeedback {
                kind: fb.kind.clone(),
                subtype: fb.subtype.clone(),
            })
            .collect(),
    }];
    if let Some(rtx) = rtx_for(first, selected) {
        payload_types.push(PayloadType {
            id: rtx,
            name: RTX.to_string(),
            clockrate: first
                .rtpmap(rtx)
                .and_then(|m| m.clock_rate)
                .unwrap_or(clockrate),
            channels: None,
            parameters: BTreeMap::from([("apt".to_string(), ParamValue(selected.to_string()))]),
            rtcp_fbs: Vec::new(),
        });
    }

    let streams = sdp
        .media
        .iter()
        .filter(|m| m.kind == MediaKind::Video)
        .flat_map(video_streams)
        .collect();

    Ok(Some(VideoDescription {
        streams,
        payload_types,
        rtp_hdrexts: to_bridge_extensions(&video_extensions(first)),
    }))
}

/// Answer the client's offer with the bridge's transport.
///
/// Every RTP section becomes `recvonly` with its SSRC, MSID and candidate
/// lines removed. The bridge candidates go on the first section only and a
/// single BUNDLE group lists every mid in order.
///
/// # Errors
///
/// `IntercomError::Negotiation` if the offer does not parse or has no media.
pub fn create_answer(offer: &str, bridge: &EndpointDescription) -> Result<String, IntercomError> {
    let mut sdp: SessionDescription = offer.parse()?;
    if sdp.media.is_empty() {
        return Err(negotiation("offer has no media sections"));
    }

    let transport = &bridge.bundle_transport;
    let session_setup = sdp.setup.take();

    sdp.origin.session_version = sdp.origin.session_version.saturating_add(1);
    sdp.msid_semantic = Some(MsidSemantic {
        semantic: sdp
            .msid_semantic
            .take()
            .map_or_else(|| "WMS".to_string(), |m| m.semantic),
        identifiers: vec!["*".to_string()],
    });
    sdp.ice_ufrag = None;
    sdp.ice_pwd = None;
    sdp.fingerprint = None;

    let mut used_mids: HashSet<String> = sdp.media.iter().filter_map(|m| m.mid.clone()).collect();

    for section in sdp.media.iter_mut() {
        let offered_setup = section
            .setup
            .clone()
            .or_else(|| session_setup.clone())
            .unwrap_or_else(|| "actpass".to_string());
        let mut setup = flip_setup(&offered_setup);

        match section.kind {
            MediaKind::Audio => answer_audio(section),
            MediaKind::Video => {
                if !answer_video(section) {
                    setup = "active";
                }
            }
            _ => {}
        }

        if section.is_rtp() {
            section.direction = Some(Direction::RecvOnly);
            receive_side_attributes(section);
            section.strip_ssrcs();
            section.rtcp = Some(NULL_RTCP.to_string());
        }
        section.port = 9;
        section.connection = Some(NULL_CONNECTION.to_string());
        section.candidates.clear();
        section.attributes.retain(|a| a.name != END_OF_CANDIDATES);
        section.ice_ufrag = Some(transport.ice.ufrag.clone());
        section.ice_pwd = Some(transport.ice.pwd.clone());
        section.fingerprint = Some(Fingerprint {
            hash_type: transport.dtls.hash_type.clone(),
            hash: transport.dtls.hash.clone(),
        });
        section.setup = Some(setup.to_string());
        if section.mid.is_none() {
            section.mid = Some(unused_mid(&mut used_mids));
        }
    }

    if let Some(first) = sdp.media.first_mut() {
        first.candidates = transport.ice.candidates.iter().map(to_sdp_candidate).collect();
        first.attributes.push(Attribute::flag(END_OF_CANDIDATES));
    }

    sdp.groups.retain(|g| g.semantics != "BUNDLE");
    sdp.groups.insert(0, Group::bundle(sdp.mids()));

    Ok(sdp.to_sdp())
}

/// Turn the offer's send-side attributes into their receive-side answers.
/// `simulcast` and `rid` keep only what the client sends, as `recv`; extmap
/// directions are mirrored. Anything the client expected to receive is
/// dropped since the answer is `recvonly`.
fn receive_side_attributes(section: &mut MediaSection) {
    section.attributes.retain_mut(|attribute| {
        let rewrite: fn(&str) -> Option<String> = match attribute.name.as_str() {
            "simulcast" => simulcast_answer,
            "rid" => rid_answer,
            _ => return true,
        };
        let answered = attribute.value.as_deref().and_then(rewrite);
        let keep = answered.is_some();
        attribute.value = answered;
        keep
    });

    for ext in &mut section.extmaps {
        ext.direction = match ext.direction.as_deref() {
            None => None,
            Some("sendonly" | "sendrecv") => Some("recvonly".to_string()),
            Some(_) => Some("inactive".to_string()),
        };
    }
}

/// `send <streams> [recv <streams>]` → `recv <streams>`.
fn simulcast_answer(value: &str) -> Option<String> {
    let mut tokens = value.split_whitespace();
    while let Some(direction) = tokens.next() {
        let streams = tokens.next()?;
        if direction == "send" {
            return Some(format!("recv {streams}"));
        }
    }
    None
}

/// `<id> send [params]` → `<id> recv [params]`.
fn rid_answer(value: &str) -> Option<String> {
    let mut tokens = value.split_whitespace();
    let id = tokens.next()?;
    if tokens.next()? != "send" {
        return None;
    }
    let rest: Vec<&str> = tokens.collect();
    if rest.is_empty() {
        Some(format!("{id} recv"))
    } else {
        Some(format!("{id} recv {}", rest.join(" ")))
    }
}

/// Lowest non-negative integer not yet taken as a mid. Claims it.
fn unused_mid(used: &mut HashSet<String>) -> String {
    let mid = (0u32..)
        .map(|n| n.to_string())
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_default();
    used.insert(mid.clone());
    mid
}

/// Opus only when offered; extensions narrowed to the audio allow-list.
fn answer_audio(section: &mut MediaSection) {
    if let Some(opus) = payload_for_codec(section, OPUS) {
        section.retain_payloads(&[opus]);
    }
    section.extmaps = audio_extensions(section);
}

/// VP8 plus its RTX when offered. Returns `false` when the section has no
/// VP8 and is left unfiltered.
fn answer_video(section: &mut MediaSection) -> bool {
    let Some(vp8) = payload_for_codec(section, "VP8") else {
        return false;
    };
    let mut keep = vec![vp8];
    keep.extend(rtx_for(section, vp8));
    section.retain_payloads(&keep);
    section.extmaps = video_extensions(section);
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::bridge::mock::sample_description;
    use crate::bridge::types::EndpointAllocation;

    const AUDIO_ONLY_OFFER: &str = "v=0\r\n\
o=- 7000 1 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 0\r\n\
a=msid-semantic: WMS s1\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111 9\r\n\
c=IN IP4 0.0.0.0\r\n\
a=ice-ufrag:abc\r\n\
a=ice-pwd:abcdefghijklmnopqrstuv\r\n\
a=fingerprint:sha-256 AA:BB\r\n\
a=setup:actpass\r\n\
a=mid:0\r\n\
a=extmap:1 urn:ietf:params:rtp-hdrext:ssrc-audio-level\r\n\
a=extmap:2 urn:ietf:params:rtp-hdrext:sdes:mid\r\n\
a=sendonly\r\n\
a=msid:s1 a1\r\n\
a=rtcp-mux\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=fmtp:111 minptime=10;useinbandfec=1\r\n\
a=rtpmap:9 G722/8000\r\n\
a=ssrc:555 cname:client\r\n\
a=ssrc:555 msid:s1 a1\r\n\
a=candidate:1 1 udp 2122260223 192.168.1.5 54321 typ host generation 0\r\n";

    const AV_OFFER: &str = "v=0\r\n\
o=- 8000 4 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE a v d\r\n\
a=ice-ufrag:sessufrag\r\n\
a=ice-pwd:sesspwd\r\n\
a=fingerprint:sha-256 SE:SS\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
a=setup:active\r\n\
a=mid:a\r\n\
a=sendonly\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=ssrc:300 msid:cam mic\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 102 96 97 96\r\n\
a=setup:active\r\n\
a=mid:v\r\n\
a=extmap:3 http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time\r\n\
a=extmap:4 urn:3gpp:video-orientation\r\n\
a=extmap:10 urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id\r\n\
a=sendonly\r\n\
a=rtpmap:102 H264/90000\r\n\
a=fmtp:102 packetization-mode=1\r\n\
a=rtpmap:96 VP8/90000\r\n\
a=rtcp-fb:96 nack\r\n\
a=rtcp-fb:96 nack pli\r\n\
a=rtcp-fb:102 goog-remb\r\n\
a=rtpmap:97 rtx/90000\r\n\
a=fmtp:97 apt=96\r\n\
a=ssrc-group:FID 100 101\r\n\
a=ssrc:100 cname:c\r\n\
a=ssrc:100 msid:cam vid\r\n\
a=ssrc:101 cname:c\r\n\
a=ssrc:101 msid:cam vid\r\n\
a=ssrc:200 msid:screen vid2\r\n\
a=candidate:9 1 udp 2122260223 10.0.0.9 40000 typ host\r\n\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
a=setup:active\r\n\
a=mid:d\r\n\
a=sctp-port:5000\r\n";

    fn ingest() -> EndpointDescription {
        sample_description(&EndpointAllocation::ingest(60))
    }

    #[test]
    fn test_whip_scenario_configure() {
        let configured = configure_from_offer(&ingest(), AUDIO_ONLY_OFFER).unwrap();
        let audio = configured.audio.as_ref().unwrap();

        assert_eq!(audio.ssrcs, vec![555]);
        assert_eq!(audio.payload_type.id, 111);
        assert_eq!(configured.bundle_transport.ice.ufrag, "abc");
        assert_eq!(configured.bundle_transport.dtls.hash_type, "sha-256");
        assert_eq!(configured.bundle_transport.dtls.hash, "AA:BB");
        assert_eq!(configured.bundle_transport.dtls.setup, "actpass");
        assert_eq!(configured.bundle_transport.ice.candidates.len(), 1);
        // No video section offered.
        assert!(configured.video.is_none());
        // Offered audio extensions pass through with their ids.
        let exts: Vec<_> = audio
            .rtp_hdrexts
            .iter()
            .map(|e| (e.id, e.uri.as_str()))
            .collect();
        assert_eq!(
            exts,
            vec![
                (1, "urn:ietf:params:rtp-hdrext:ssrc-audio-level"),
                (2, "urn:ietf:params:rtp-hdrext:sdes:mid")
            ]
        );
    }

    #[test]
    fn test_whip_scenario_answer() {
        let answer_text = create_answer(AUDIO_ONLY_OFFER, &ingest()).unwrap();
        let answer: SessionDescription = answer_text.parse().unwrap();

        assert_eq!(answer_text.matches("m=audio").count(), 1);
        assert_eq!(answer.groups.len(), 1);
        assert_eq!(answer.groups[0], Group::bundle(vec!["0".to_string()]));

        let audio = &answer.media[0];
        assert_eq!(audio.direction, Some(Direction::RecvOnly));
        assert_eq!(audio.setup.as_deref(), Some("active"));
        assert_eq!(audio.payload_ids(), vec![111]);
        assert!(audio.fmtp(111).is_some());
        assert!(audio.ssrcs.is_empty());
        assert!(audio.msid.is_none());
        assert_eq!(audio.rtcp.as_deref(), Some("9 IN IP4 0.0.0.0"));
        assert_eq!(audio.ice_ufrag.as_deref(), Some("bridgeufrag"));
        assert_eq!(audio.fingerprint.as_ref().unwrap().hash, "11:22:33:44");
        assert_eq!(audio.candidates.len(), 1);
        assert_eq!(audio.candidates[0].ip, "192.0.2.10");
    }

    #[test]
    fn test_answer_session_rewrites() {
        let answer: SessionDescription = create_answer(AUDIO_ONLY_OFFER, &ingest())
            .unwrap()
            .parse()
            .unwrap();

        assert_eq!(answer.origin.session_id, "7000");
        assert_eq!(answer.origin.session_version, 2);
        let semantic = answer.msid_semantic.unwrap();
        assert_eq!(semantic.identifiers, vec!["*"]);
    }

    #[test]
    fn test_answer_bundle_lists_every_mid_in_order() {
        let answer: SessionDescription = create_answer(AV_OFFER, &ingest()).unwrap().parse().unwrap();

        assert_eq!(answer.media.len(), 3);
        assert_eq!(
            answer.groups,
            vec![Group::bundle(vec!["a".into(), "v".into(), "d".into()])]
        );
        // Candidates only on the first bundled section.
        assert!(!answer.media[0].candidates.is_empty());
        assert!(answer.media[1].candidates.is_empty());
        assert!(answer.media[2].candidates.is_empty());
    }

    #[test]
    fn test_answer_mid_synthesis_avoids_offered_mids() {
        let offer = AV_OFFER
            .replace("a=group:BUNDLE a v d\r\n", "a=group:BUNDLE 0 1\r\n")
            .replace("a=mid:a\r\n", "")
            .replace("a=mid:v\r\n", "a=mid:0\r\n")
            .replace("a=mid:d\r\n", "a=mid:1\r\n");
        let answer: SessionDescription = create_answer(&offer, &ingest()).unwrap().parse().unwrap();

        let mids: Vec<_> = answer.media.iter().map(|m| m.mid.clone().unwrap()).collect();
        assert_eq!(mids, vec!["2", "0", "1"]);
        assert_eq!(
            answer.groups,
            vec![Group::bundle(vec!["2".into(), "0".into(), "1".into()])]
        );
    }

    #[test]
    fn test_answer_mirrors_send_side_attributes() {
        let offer = AV_OFFER
            .replace(
                "a=extmap:4 urn:3gpp:video-orientation\r\n",
                "a=extmap:4/sendonly urn:3gpp:video-orientation\r\n",
            )
            .replace(
                "a=ssrc-group:FID 100 101\r\n",
                "a=rid:h send pt=96\r\na=rid:l send\r\na=rid:x recv\r\na=simulcast:send h;l recv x\r\na=ssrc-group:FID 100 101\r\n",
            )
            .replace("a=rtpmap:96 VP8/90000\r\n", "a=rtpmap:96 VP9/90000\r\n");
        let answer_text = create_answer(&offer, &ingest()).unwrap();
        let answer: SessionDescription = answer_text.parse().unwrap();
        let video = &answer.media[1];

        let attribute = |name: &str| -> Vec<String> {
            video
                .attributes
                .iter()
                .filter(|a| a.name == name)
                .filter_map(|a| a.value.clone())
                .collect()
        };
        assert_eq!(attribute("simulcast"), vec!["recv h;l"]);
        assert_eq!(attribute("rid"), vec!["h recv pt=96", "l recv"]);
        let orientation = video.extmaps.iter().find(|e| e.id == 4).unwrap();
        assert_eq!(orientation.direction.as_deref(), Some("recvonly"));
        assert!(!answer_text.contains("sendonly"));
        assert!(!answer_text.contains(" send"));
    }

    #[test]
    fn test_simulcast_without_send_streams_is_dropped() {
        assert_eq!(simulcast_answer("recv a;b"), None);
        assert_eq!(simulcast_answer("send a;b"), Some("recv a;b".to_string()));
        assert_eq!(rid_answer("q recv"), None);
    }

    #[test]
    fn test_answer_setup_from_active_is_passive() {
        let answer: SessionDescription = create_answer(AV_OFFER, &ingest()).unwrap().parse().unwrap();
        for section in &answer.media {
            assert_eq!(section.setup.as_deref(), Some("passive"));
            assert_ne!(section.setup.as_deref(), Some("actpass"));
        }
    }

    #[test]
    fn test_answer_video_keeps_vp8_and_rtx() {
        let answer: SessionDescription = create_answer(AV_OFFER, &ingest()).unwrap().parse().unwrap();
        let video = &answer.media[1];

        assert_eq!(video.payload_ids(), vec![96, 97]);
        assert!(video.fmtp(102).is_none());
        assert!(video.rtcp_fbs.iter().all(|fb| fb.payload == "96"));
        assert_eq!(video.direction, Some(Direction::RecvOnly));
        let uris: Vec<_> = video.extmaps.iter().map(|e| e.uri.as_str()).collect();
        assert_eq!(
            uris,
            vec![
                "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time",
                "urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id"
            ]
        );
    }

    #[test]
    fn test_answer_application_gets_transport_only() {
        let answer: SessionDescription = create_answer(AV_OFFER, &ingest()).unwrap().parse().unwrap();
        let data = &answer.media[2];

        assert_eq!(data.formats, vec!["webrtc-datachannel"]);
        assert_eq!(data.sctp_port, Some(5000));
        assert!(data.direction.is_none());
        assert_eq!(data.ice_pwd.as_deref(), Some("bridgepassword0123456789"));
    }

    #[test]
    fn test_answer_without_vp8_is_unfiltered_active() {
        let offer = AV_OFFER
            .replace("a=rtpmap:96 VP8/90000\r\n", "a=rtpmap:96 VP9/90000\r\n");
        let answer: SessionDescription = create_answer(&offer, &ingest()).unwrap().parse().unwrap();
        let video = &answer.media[1];

        assert_eq!(video.direction, Some(Direction::RecvOnly));
        assert_eq!(video.setup.as_deref(), Some("active"));
        assert_eq!(video.payload_ids(), vec![102, 96, 97]);
        assert_eq!(video.extmaps.len(), 3);
    }

    #[test]
    fn test_configure_video_streams_pair_fid() {
        let configured = configure_from_offer(&ingest(), AV_OFFER).unwrap();
        let video = configured.video.unwrap();

        assert_eq!(video.streams.len(), 2);
        assert_eq!(video.streams[0].id, "cam");
        assert_eq!(
            video.streams[0].sources,
            vec![VideoSource {
                main: 100,
                feedback: Some(101)
            }]
        );
        assert_eq!(video.streams[1].id, "screen");
        assert_eq!(
            video.streams[1].sources,
            vec![VideoSource {
                main: 200,
                feedback: None
            }]
        );

        let json = serde_json::to_value(&video.streams[1]).unwrap();
        assert_eq!(json["sources"][0], serde_json::json!({ "main": 200 }));
    }

    #[test]
    fn test_configure_selects_first_offered_video_codec() {
        // H264 is listed ahead of VP8.
        let configured = configure_from_offer(&ingest(), AV_OFFER).unwrap();
        let video = configured.video.unwrap();

        let ids: Vec<u8> = video.payload_types.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![102]);
        assert_eq!(video.payload_types[0].name, "H264");
        assert_eq!(
            video.payload_types[0].parameters.get("packetization-mode"),
            Some(&ParamValue::from("1"))
        );
        assert_eq!(video.payload_types[0].rtcp_fbs.len(), 1);
        assert_eq!(video.payload_types[0].rtcp_fbs[0].kind, "goog-remb");
    }

    #[test]
    fn test_configure_video_codecs_and_extensions() {
        let offer = AV_OFFER.replace(
            "m=video 9 UDP/TLS/RTP/SAVPF 102 96 97 96",
            "m=video 9 UDP/TLS/RTP/SAVPF 96 97 102 96",
        );
        let configured = configure_from_offer(&ingest(), &offer).unwrap();
        let video = configured.video.unwrap();

        let ids: Vec<u8> = video.payload_types.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![96, 97]);
        assert_eq!(video.payload_types[0].name, "VP8");
        assert_eq!(video.payload_types[0].clockrate, 90000);
        assert_eq!(video.payload_types[0].rtcp_fbs.len(), 2);
        assert_eq!(
            video.payload_types[1].parameters.get("apt"),
            Some(&ParamValue::from("96"))
        );
        assert_eq!(video.rtp_hdrexts.len(), 2);
    }

    #[test]
    fn test_configure_transport_falls_back_to_session_level() {
        let configured = configure_from_offer(&ingest(), AV_OFFER).unwrap();
        let transport = configured.bundle_transport;

        assert_eq!(transport.ice.ufrag, "sessufrag");
        assert_eq!(transport.dtls.hash, "SE:SS");
        assert_eq!(transport.dtls.setup, "active");
        assert_eq!(transport.ice.candidates[0].ip, "10.0.0.9");
        assert_eq!(configured.audio.unwrap().ssrcs, vec![300]);
    }

    #[test]
    fn test_configure_rejects_codec_without_clock_rate() {
        let offer = AV_OFFER.replace("a=rtpmap:102 H264/90000\r\n", "a=rtpmap:102 H264\r\n");
        let result = configure_from_offer(&ingest(), &offer);
        assert!(matches!(result, Err(IntercomError::Negotiation(m)) if m.contains("clock rate")));
    }

    #[test]
    fn test_configure_rejects_offer_without_candidates() {
        let offer = AUDIO_ONLY_OFFER.replace(
            "a=candidate:1 1 udp 2122260223 192.168.1.5 54321 typ host generation 0\r\n",
            "",
        );
        let result = configure_from_offer(&ingest(), &offer);
        assert!(matches!(result, Err(IntercomError::Negotiation(m)) if m.contains("candidates")));
    }

    #[test]
    fn test_configure_never_keeps_stale_ssrcs() {
        let mut allocated = ingest();
        allocated.audio.as_mut().unwrap().ssrcs = vec![1, 2];
        let recv_only = AUDIO_ONLY_OFFER
            .replace("a=ssrc:555 cname:client\r\n", "")
            .replace("a=ssrc:555 msid:s1 a1\r\n", "")
            .replace("a=msid:s1 a1\r\n", "");

        let configured = configure_from_offer(&allocated, &recv_only).unwrap();
        assert!(configured.audio.unwrap().ssrcs.is_empty());
    }

    #[test]
    fn test_create_answer_rejects_empty_offer() {
        let result = create_answer("v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\n", &ingest());
        assert!(matches!(result, Err(IntercomError::Negotiation(_))));
    }
}
