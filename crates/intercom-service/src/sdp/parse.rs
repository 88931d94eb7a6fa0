use super::{
    Attribute, Candidate, Direction, ExtMap, Fingerprint, Fmtp, Group, MediaKind, MediaSection,
    MsidSemantic, Origin, RtcpFb, RtpMap, SdpError, SessionDescription, SsrcAttribute, SsrcGroup,
};

pub(super) fn parse(sdp: &str) -> Result<SessionDescription, SdpError> {
    let mut lines = sdp
        .split('\n')
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .peekable();

    if lines.peek().is_none() {
        return Err(SdpError::Empty);
    }

    let mut session = SessionDescription::default();
    let mut saw_version = false;
    let mut current: Option<MediaSection> = None;

    for line in lines {
        let (kind, value) = split_line(line)?;

        if !saw_version {
            if kind != 'v' {
                return Err(SdpError::MissingVersion);
            }
            session.version = value.trim().parse().map_err(|_| SdpError::InvalidLine {
                kind,
                reason: format!("'{value}' is not a version number"),
            })?;
            saw_version = true;
            continue;
        }

        if kind == 'm' {
            if let Some(done) = current.take() {
                session.media.push(done);
            }
            current = Some(parse_media_line(value)?);
            continue;
        }

        match current.as_mut() {
            Some(media) => match kind {
                'c' => media.connection = Some(value.to_string()),
                'b' => media.bandwidths.push(value.to_string()),
                'a' => parse_media_attribute(media, value)?,
                other => media.other_lines.push((other, value.to_string())),
            },
            None => match kind {
                'o' => session.origin = parse_origin(value)?,
                's' => session.session_name = value.to_string(),
                'c' => session.connection = Some(value.to_string()),
                'b' => session.bandwidths.push(value.to_string()),
                't' => session.timing = value.to_string(),
                'a' => parse_session_attribute(&mut session, value)?,
                other => session.other_lines.push((other, value.to_string())),
            },
        }
    }

    if let Some(done) = current {
        session.media.push(done);
    }

    Ok(session)
}

fn split_line(line: &str) -> Result<(char, &str), SdpError> {
    let mut chars = line.chars();
    match (chars.next(), chars.next()) {
        (Some(kind), Some('=')) => Ok((kind, chars.as_str())),
        _ => Err(SdpError::InvalidLine {
            kind: line.chars().next().unwrap_or('?'),
            reason: format!("'{line}' is not <type>=<value>"),
        }),
    }
}

fn invalid_attr(name: &str, reason: impl Into<String>) -> SdpError {
    SdpError::InvalidAttribute {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn parse_num<T: std::str::FromStr>(name: &str, token: Option<&str>) -> Result<T, SdpError> {
    let token = token.ok_or_else(|| invalid_attr(name, "missing field"))?;
    token
        .parse()
        .map_err(|_| invalid_attr(name, format!("'{token}' is not a number")))
}

fn parse_origin(value: &str) -> Result<Origin, SdpError> {
    let mut parts = value.split_whitespace();
    let invalid = |reason: &str| SdpError::InvalidLine {
        kind: 'o',
        reason: reason.to_string(),
    };

    let username = parts.next().ok_or_else(|| invalid("missing username"))?;
    let session_id = parts.next().ok_or_else(|| invalid("missing session id"))?;
    let session_version = parts
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| invalid("missing or non-numeric session version"))?;
    let net_type = parts.next().ok_or_else(|| invalid("missing network type"))?;
    let addr_type = parts.next().ok_or_else(|| invalid("missing address type"))?;
    let address = parts.next().ok_or_else(|| invalid("missing address"))?;

    Ok(Origin {
        username: username.to_string(),
        session_id: session_id.to_string(),
        session_version,
        net_type: net_type.to_string(),
        addr_type: addr_type.to_string(),
        address: address.to_string(),
    })
}

fn parse_media_line(value: &str) -> Result<MediaSection, SdpError> {
    let mut parts = value.split_whitespace();
    let invalid = |reason: String| SdpError::InvalidLine { kind: 'm', reason };

    let kind = parts
        .next()
        .ok_or_else(|| invalid("missing media type".to_string()))?;
    let port = parts
        .next()
        .ok_or_else(|| invalid("missing port".to_string()))?;
    // Port may carry a `/<count>` suffix.
    let port = port
        .split('/')
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| invalid(format!("'{port}' is not a port")))?;
    let protocol = parts
        .next()
        .ok_or_else(|| invalid("missing protocol".to_string()))?;

    let mut media = MediaSection::new(MediaKind::from(kind), protocol);
    media.port = port;
    media.formats = parts.map(str::to_string).collect();
    Ok(media)
}

fn split_attribute(value: &str) -> (&str, Option<&str>) {
    match value.split_once(':') {
        Some((name, rest)) => (name, Some(rest)),
        None => (value, None),
    }
}

fn parse_session_attribute(session: &mut SessionDescription, value: &str) -> Result<(), SdpError> {
    let (name, rest) = split_attribute(value);
    match (name, rest) {
        ("group", Some(rest)) => session.groups.push(parse_group(rest)?),
        ("msid-semantic", Some(rest)) => {
            let mut tokens = rest.split_whitespace();
            let semantic = tokens
                .next()
                .ok_or_else(|| invalid_attr(name, "missing semantic"))?;
            session.msid_semantic = Some(MsidSemantic {
                semantic: semantic.to_string(),
                identifiers: tokens.map(str::to_string).collect(),
            });
        }
        ("ice-ufrag", Some(rest)) => session.ice_ufrag = Some(rest.trim().to_string()),
        ("ice-pwd", Some(rest)) => session.ice_pwd = Some(rest.trim().to_string()),
        ("ice-options", Some(rest)) => session.ice_options = Some(rest.trim().to_string()),
        ("fingerprint", Some(rest)) => session.fingerprint = Some(parse_fingerprint(rest)?),
        ("setup", Some(rest)) => session.setup = Some(rest.trim().to_string()),
        _ => session.attributes.push(Attribute {
            name: name.to_string(),
            value: rest.map(str::to_string),
        }),
    }
    Ok(())
}

fn parse_media_attribute(media: &mut MediaSection, value: &str) -> Result<(), SdpError> {
    let (name, rest) = split_attribute(value);

    if rest.is_none() {
        if let Some(direction) = Direction::from_flag(name) {
            media.direction = Some(direction);
            return Ok(());
        }
        match name {
            "rtcp-mux" => media.rtcp_mux = true,
            "rtcp-rsize" => media.rtcp_rsize = true,
            _ => media.attributes.push(Attribute::flag(name)),
        }
        return Ok(());
    }

    let rest = rest.unwrap_or_default();
    match name {
        "mid" => media.mid = Some(rest.trim().to_string()),
        "ice-ufrag" => media.ice_ufrag = Some(rest.trim().to_string()),
        "ice-pwd" => media.ice_pwd = Some(rest.trim().to_string()),
        "ice-options" => media.ice_options = Some(rest.trim().to_string()),
        "fingerprint" => media.fingerprint = Some(parse_fingerprint(rest)?),
        "setup" => media.setup = Some(rest.trim().to_string()),
        "candidate" => media.candidates.push(parse_candidate(rest)?),
        "rtcp" => media.rtcp = Some(rest.trim().to_string()),
        "rtpmap" => media.rtpmaps.push(parse_rtpmap(rest)?),
        "fmtp" => media.fmtps.push(parse_fmtp(rest)?),
        "rtcp-fb" => media.rtcp_fbs.push(parse_rtcp_fb(rest)?),
        "extmap" => media.extmaps.push(parse_extmap(rest)?),
        "ssrc" => media.ssrcs.push(parse_ssrc(rest)?),
        "ssrc-group" => media.ssrc_groups.push(parse_ssrc_group(rest)?),
        "msid" => media.msid = Some(rest.trim().to_string()),
        "sctp-port" => media.sctp_port = Some(parse_num(name, Some(rest.trim()))?),
        "max-message-size" => media.max_message_size = Some(parse_num(name, Some(rest.trim()))?),
        _ => media.attributes.push(Attribute {
            name: name.to_string(),
            value: Some(rest.to_string()),
        }),
    }
    Ok(())
}

fn parse_group(rest: &str) -> Result<Group, SdpError> {
    let mut tokens = rest.split_whitespace();
    let semantics = tokens
        .next()
        .ok_or_else(|| invalid_attr("group", "missing semantics"))?;
    Ok(Group {
        semantics: semantics.to_string(),
        mids: tokens.map(str::to_string).collect(),
    })
}

fn parse_fingerprint(rest: &str) -> Result<Fingerprint, SdpError> {
    let mut tokens = rest.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(hash_type), Some(hash)) => Ok(Fingerprint {
            hash_type: hash_type.to_string(),
            hash: hash.to_string(),
        }),
        _ => Err(invalid_attr("fingerprint", "expected '<hash-function> <hash>'")),
    }
}

/// RFC 8839 candidate grammar plus the `generation`/`network-id` extensions
/// browsers append.
pub(super) fn parse_candidate(rest: &str) -> Result<Candidate, SdpError> {
    const NAME: &str = "candidate";
    let mut tokens = rest.split_whitespace();

    let foundation = tokens
        .next()
        .ok_or_else(|| invalid_attr(NAME, "missing foundation"))?
        .to_string();
    let component = parse_num(NAME, tokens.next())?;
    let protocol = tokens
        .next()
        .ok_or_else(|| invalid_attr(NAME, "missing transport"))?
        .to_lowercase();
    // Some stacks emit priorities above u32::MAX; clamp rather than reject.
    let priority: u64 = parse_num(NAME, tokens.next())?;
    let priority = u32::try_from(priority).unwrap_or(u32::MAX);
    let ip = tokens
        .next()
        .ok_or_else(|| invalid_attr(NAME, "missing address"))?
        .to_string();
    let port = parse_num(NAME, tokens.next())?;

    if tokens.next() != Some("typ") {
        return Err(invalid_attr(NAME, "missing 'typ'"));
    }
    let kind = tokens
        .next()
        .ok_or_else(|| invalid_attr(NAME, "missing candidate type"))?
        .to_string();

    let mut candidate = Candidate {
        foundation,
        component,
        protocol,
        priority,
        ip,
        port,
        kind,
        rel_addr: None,
        rel_port: None,
        generation: None,
        network_id: None,
        extensions: Vec::new(),
    };

    while let Some(key) = tokens.next() {
        let value = tokens
            .next()
            .ok_or_else(|| invalid_attr(NAME, format!("'{key}' has no value")))?;
        match key {
            "raddr" => candidate.rel_addr = Some(value.to_string()),
            "rport" => candidate.rel_port = Some(parse_num(NAME, Some(value))?),
            "generation" => candidate.generation = Some(parse_num(NAME, Some(value))?),
            "network-id" => candidate.network_id = Some(parse_num(NAME, Some(value))?),
            _ => candidate
                .extensions
                .push((key.to_string(), value.to_string())),
        }
    }

    Ok(candidate)
}

fn parse_rtpmap(rest: &str) -> Result<RtpMap, SdpError> {
    const NAME: &str = "rtpmap";
    let (payload, encoding) = rest
        .trim()
        .split_once(' ')
        .ok_or_else(|| invalid_attr(NAME, "expected '<payload> <encoding>'"))?;

    let mut parts = encoding.trim().split('/');
    let name = parts
        .next()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| invalid_attr(NAME, "missing encoding name"))?;

    Ok(RtpMap {
        payload: parse_num(NAME, Some(payload))?,
        encoding: name.to_string(),
        clock_rate: parts.next().and_then(|r| r.parse().ok()),
        channels: parts.next().and_then(|c| c.parse().ok()),
    })
}

fn parse_fmtp(rest: &str) -> Result<Fmtp, SdpError> {
    let (payload, config) = rest
        .trim()
        .split_once(' ')
        .ok_or_else(|| invalid_attr("fmtp", "expected '<payload> <parameters>'"))?;
    Ok(Fmtp {
        payload: parse_num("fmtp", Some(payload))?,
        config: config.trim().to_string(),
    })
}

fn parse_rtcp_fb(rest: &str) -> Result<RtcpFb, SdpError> {
    let mut tokens = rest.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(payload), Some(kind)) => {
            let subtype = tokens.collect::<Vec<_>>().join(" ");
            Ok(RtcpFb {
                payload: payload.to_string(),
                kind: kind.to_string(),
                subtype: (!subtype.is_empty()).then_some(subtype),
            })
        }
        _ => Err(invalid_attr("rtcp-fb", "expected '<payload> <type>'")),
    }
}

fn parse_extmap(rest: &str) -> Result<ExtMap, SdpError> {
    const NAME: &str = "extmap";
    let mut tokens = rest.split_whitespace();
    let id_part = tokens
        .next()
        .ok_or_else(|| invalid_attr(NAME, "missing id"))?;
    let uri = tokens
        .next()
        .ok_or_else(|| invalid_attr(NAME, "missing uri"))?;
    let attributes = tokens.collect::<Vec<_>>().join(" ");

    let (id, direction) = match id_part.split_once('/') {
        Some((id, direction)) => (id, Some(direction.to_string())),
        None => (id_part, None),
    };

    Ok(ExtMap {
        id: parse_num(NAME, Some(id))?,
        direction,
        uri: uri.to_string(),
        attributes: (!attributes.is_empty()).then_some(attributes),
    })
}

fn parse_ssrc(rest: &str) -> Result<SsrcAttribute, SdpError> {
    let (id, attr) = match rest.trim().split_once(' ') {
        Some((id, attr)) => (id, attr.trim()),
        None => (rest.trim(), ""),
    };
    let (attribute, value) = match attr.split_once(':') {
        Some((name, value)) => (name, Some(value.to_string())),
        None => (attr, None),
    };
    Ok(SsrcAttribute {
        id: parse_num("ssrc", Some(id))?,
        attribute: attribute.to_string(),
        value,
    })
}

fn parse_ssrc_group(rest: &str) -> Result<SsrcGroup, SdpError> {
    let mut tokens = rest.split_whitespace();
    let semantics = tokens
        .next()
        .ok_or_else(|| invalid_attr("ssrc-group", "missing semantics"))?;
    let ssrcs = tokens
        .map(|t| parse_num("ssrc-group", Some(t)))
        .collect::<Result<Vec<u32>, _>>()?;
    Ok(SsrcGroup {
        semantics: semantics.to_string(),
        ssrcs,
    })
}
