use super::{Attribute, Candidate, MediaSection, SessionDescription};
use std::fmt::{self, Write};

const CRLF: &str = "\r\n";

impl SessionDescription {
    /// Render as CRLF-terminated SDP text.
    pub fn to_sdp(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.origin;
        write!(f, "v={}{CRLF}", self.version)?;
        write!(
            f,
            "o={} {} {} {} {} {}{CRLF}",
            o.username, o.session_id, o.session_version, o.net_type, o.addr_type, o.address
        )?;
        write!(f, "s={}{CRLF}", self.session_name)?;
        for (kind, value) in &self.other_lines {
            write!(f, "{kind}={value}{CRLF}")?;
        }
        if let Some(c) = &self.connection {
            write!(f, "c={c}{CRLF}")?;
        }
        for b in &self.bandwidths {
            write!(f, "b={b}{CRLF}")?;
        }
        write!(f, "t={}{CRLF}", self.timing)?;

        for group in &self.groups {
            write!(f, "a=group:{}", group.semantics)?;
            for mid in &group.mids {
                write!(f, " {mid}")?;
            }
            f.write_str(CRLF)?;
        }
        write_opt(f, "ice-ufrag", self.ice_ufrag.as_deref())?;
        write_opt(f, "ice-pwd", self.ice_pwd.as_deref())?;
        write_opt(f, "ice-options", self.ice_options.as_deref())?;
        if let Some(fp) = &self.fingerprint {
            write!(f, "a=fingerprint:{} {}{CRLF}", fp.hash_type, fp.hash)?;
        }
        write_opt(f, "setup", self.setup.as_deref())?;
        write_attributes(f, &self.attributes)?;
        if let Some(semantic) = &self.msid_semantic {
            write!(f, "a=msid-semantic: {}", semantic.semantic)?;
            for id in &semantic.identifiers {
                write!(f, " {id}")?;
            }
            f.write_str(CRLF)?;
        }

        for media in &self.media {
            write_media(f, media)?;
        }
        Ok(())
    }
}

fn write_opt(f: &mut fmt::Formatter<'_>, name: &str, value: Option<&str>) -> fmt::Result {
    match value {
        Some(v) => write!(f, "a={name}:{v}{CRLF}"),
        None => Ok(()),
    }
}

fn write_attributes(f: &mut fmt::Formatter<'_>, attributes: &[Attribute]) -> fmt::Result {
    for attr in attributes {
        match &attr.value {
            Some(v) => write!(f, "a={}:{v}{CRLF}", attr.name)?,
            None => write!(f, "a={}{CRLF}", attr.name)?,
        }
    }
    Ok(())
}

fn write_media(f: &mut fmt::Formatter<'_>, m: &MediaSection) -> fmt::Result {
    write!(f, "m={} {} {}", m.kind.as_str(), m.port, m.protocol)?;
    for format in &m.formats {
        write!(f, " {format}")?;
    }
    f.write_str(CRLF)?;

    for (kind, value) in &m.other_lines {
        write!(f, "{kind}={value}{CRLF}")?;
    }
    if let Some(c) = &m.connection {
        write!(f, "c={c}{CRLF}")?;
    }
    for b in &m.bandwidths {
        write!(f, "b={b}{CRLF}")?;
    }
    write_opt(f, "rtcp", m.rtcp.as_deref())?;
    write_opt(f, "ice-ufrag", m.ice_ufrag.as_deref())?;
    write_opt(f, "ice-pwd", m.ice_pwd.as_deref())?;
    write_opt(f, "ice-options", m.ice_options.as_deref())?;
    if let Some(fp) = &m.fingerprint {
        write!(f, "a=fingerprint:{} {}{CRLF}", fp.hash_type, fp.hash)?;
    }
    write_opt(f, "setup", m.setup.as_deref())?;
    write_opt(f, "mid", m.mid.as_deref())?;

    for ext in &m.extmaps {
        write!(f, "a=extmap:{}", ext.id)?;
        if let Some(direction) = &ext.direction {
            write!(f, "/{direction}")?;
        }
        write!(f, " {}", ext.uri)?;
        if let Some(attrs) = &ext.attributes {
            write!(f, " {attrs}")?;
        }
        f.write_str(CRLF)?;
    }

    if let Some(direction) = m.direction {
        write!(f, "a={direction}{CRLF}")?;
    }
    write_opt(f, "msid", m.msid.as_deref())?;
    if m.rtcp_mux {
        write!(f, "a=rtcp-mux{CRLF}")?;
    }
    if m.rtcp_rsize {
        write!(f, "a=rtcp-rsize{CRLF}")?;
    }

    // rtpmap / rtcp-fb / fmtp grouped per payload, in m= line order, then any
    // lines for payloads the m= line does not list.
    let listed = m.payload_ids();
    let unlisted = m
        .rtpmaps
        .iter()
        .map(|r| r.payload)
        .chain(m.fmtps.iter().map(|p| p.payload))
        .filter(|p| !listed.contains(p));
    let mut order = listed.clone();
    for payload in unlisted {
        if !order.contains(&payload) {
            order.push(payload);
        }
    }

    for payload in order {
        if let Some(map) = m.rtpmap(payload) {
            write!(f, "a=rtpmap:{} {}", map.payload, map.encoding)?;
            if let Some(rate) = map.clock_rate {
                write!(f, "/{rate}")?;
                if let Some(channels) = map.channels {
                    write!(f, "/{channels}")?;
                }
            }
            f.write_str(CRLF)?;
        }
        for fb in m.rtcp_fbs.iter().filter(|fb| fb.payload_id() == Some(payload)) {
            write_rtcp_fb(f, &fb.payload, &fb.kind, fb.subtype.as_deref())?;
        }
        for fmtp in m.fmtps.iter().filter(|p| p.payload == payload) {
            write!(f, "a=fmtp:{} {}{CRLF}", fmtp.payload, fmtp.config)?;
        }
    }
    for fb in m.rtcp_fbs.iter().filter(|fb| fb.payload_id().is_none()) {
        write_rtcp_fb(f, &fb.payload, &fb.kind, fb.subtype.as_deref())?;
    }

    for group in &m.ssrc_groups {
        write!(f, "a=ssrc-group:{}", group.semantics)?;
        for ssrc in &group.ssrcs {
            write!(f, " {ssrc}")?;
        }
        f.write_str(CRLF)?;
    }
    for ssrc in &m.ssrcs {
        write!(f, "a=ssrc:{} {}", ssrc.id, ssrc.attribute)?;
        if let Some(value) = &ssrc.value {
            write!(f, ":{value}")?;
        }
        f.write_str(CRLF)?;
    }

    if let Some(port) = m.sctp_port {
        write!(f, "a=sctp-port:{port}{CRLF}")?;
    }
    if let Some(size) = m.max_message_size {
        write!(f, "a=max-message-size:{size}{CRLF}")?;
    }

    for candidate in &m.candidates {
        write!(f, "a=candidate:{}{CRLF}", candidate_value(candidate))?;
    }
    write_attributes(f, &m.attributes)
}

fn write_rtcp_fb(
    f: &mut fmt::Formatter<'_>,
    payload: &str,
    kind: &str,
    subtype: Option<&str>,
) -> fmt::Result {
    match subtype {
        Some(sub) => write!(f, "a=rtcp-fb:{payload} {kind} {sub}{CRLF}"),
        None => write!(f, "a=rtcp-fb:{payload} {kind}{CRLF}"),
    }
}

/// The value part of an `a=candidate:` line.
pub(crate) fn candidate_value(c: &Candidate) -> String {
    let mut out = format!(
        "{} {} {} {} {} {} typ {}",
        c.foundation, c.component, c.protocol, c.priority, c.ip, c.port, c.kind
    );
    if let Some(addr) = &c.rel_addr {
        let _ = write!(out, " raddr {addr}");
    }
    if let Some(port) = c.rel_port {
        let _ = write!(out, " rport {port}");
    }
    for (key, value) in &c.extensions {
        let _ = write!(out, " {key} {value}");
    }
    if let Some(generation) = c.generation {
        let _ = write!(out, " generation {generation}");
    }
    if let Some(network_id) = c.network_id {
        let _ = write!(out, " network-id {network_id}");
    }
    out
}
