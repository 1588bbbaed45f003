//! Parser for asynchronous `wpa_supplicant` event lines.
//!
//! Event datagrams look like `<3>P2P-DEVICE-FOUND 02:11:22:33:44:55
//! name='Some Device' ...`: an optional priority prefix, an event name
//! from a closed catalog, and a free-form trailing payload. The name is
//! resolved via binary search over an alphabetically sorted table; the
//! payload is tokenized with the supplicant's single-quote rules and
//! extracted into a typed variant per event.

use crate::error::{Result, WfdError};
use crate::util::parse_dec;

/// Priority prefix of an event line (`<0>`..`<4>`).
///
/// Anything malformed — out-of-range value, signs, junk before the closing
/// `>` — falls back to [`Priority::MsgDump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    #[default]
    MsgDump,
    Debug,
    Info,
    Warning,
    Error,
}

impl Priority {
    pub const COUNT: usize = 5;

    fn from_index(n: u64) -> Option<Priority> {
        match n {
            0 => Some(Priority::MsgDump),
            1 => Some(Priority::Debug),
            2 => Some(Priority::Info),
            3 => Some(Priority::Warning),
            4 => Some(Priority::Error),
            _ => None,
        }
    }
}

/// P2P group role announced by the supplicant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Go,
    Client,
}

impl Role {
    /// Exact-match parse of a `role` token (`GO` or `client`).
    fn from_token(token: &str) -> Option<Role> {
        match token {
            "GO" => Some(Role::Go),
            "client" => Some(Role::Client),
            _ => None,
        }
    }
}

/// The recognised event catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventType {
    #[default]
    Unknown,
    ApStaConnected,
    ApStaDisconnected,
    CtrlEventScanStarted,
    CtrlEventTerminating,
    P2pDeviceFound,
    P2pDeviceLost,
    P2pFindStopped,
    P2pGoNegFailure,
    P2pGoNegRequest,
    P2pGoNegSuccess,
    P2pGroupFormationFailure,
    P2pGroupFormationSuccess,
    P2pGroupRemoved,
    P2pGroupStarted,
    P2pInvitationReceived,
    P2pInvitationResult,
    P2pProvDiscEnterPin,
    P2pProvDiscPbcReq,
    P2pProvDiscPbcResp,
    P2pProvDiscShowPin,
    P2pServDiscReq,
    P2pServDiscResp,
}

/// Sorted name table backing the binary search. MUST stay in strict
/// ASCII order.
const EVENT_TABLE: [(&str, EventType); 22] = [
    ("AP-STA-CONNECTED", EventType::ApStaConnected),
    ("AP-STA-DISCONNECTED", EventType::ApStaDisconnected),
    ("CTRL-EVENT-SCAN-STARTED", EventType::CtrlEventScanStarted),
    ("CTRL-EVENT-TERMINATING", EventType::CtrlEventTerminating),
    ("P2P-DEVICE-FOUND", EventType::P2pDeviceFound),
    ("P2P-DEVICE-LOST", EventType::P2pDeviceLost),
    ("P2P-FIND-STOPPED", EventType::P2pFindStopped),
    ("P2P-GO-NEG-FAILURE", EventType::P2pGoNegFailure),
    ("P2P-GO-NEG-REQUEST", EventType::P2pGoNegRequest),
    ("P2P-GO-NEG-SUCCESS", EventType::P2pGoNegSuccess),
    ("P2P-GROUP-FORMATION-FAILURE", EventType::P2pGroupFormationFailure),
    ("P2P-GROUP-FORMATION-SUCCESS", EventType::P2pGroupFormationSuccess),
    ("P2P-GROUP-REMOVED", EventType::P2pGroupRemoved),
    ("P2P-GROUP-STARTED", EventType::P2pGroupStarted),
    ("P2P-INVITATION-RECEIVED", EventType::P2pInvitationReceived),
    ("P2P-INVITATION-RESULT", EventType::P2pInvitationResult),
    ("P2P-PROV-DISC-ENTER-PIN", EventType::P2pProvDiscEnterPin),
    ("P2P-PROV-DISC-PBC-REQ", EventType::P2pProvDiscPbcReq),
    ("P2P-PROV-DISC-PBC-RESP", EventType::P2pProvDiscPbcResp),
    ("P2P-PROV-DISC-SHOW-PIN", EventType::P2pProvDiscShowPin),
    ("P2P-SERV-DISC-REQ", EventType::P2pServDiscReq),
    ("P2P-SERV-DISC-RESP", EventType::P2pServDiscResp),
];

impl EventType {
    /// Wire name of the event, `"UNKNOWN"` for [`EventType::Unknown`].
    pub fn name(self) -> &'static str {
        EVENT_TABLE
            .iter()
            .find(|(_, ty)| *ty == self)
            .map_or("UNKNOWN", |(name, _)| *name)
    }
}

/// Typed payload extracted from the trailing text of an event line.
///
/// MAC addresses are kept in their string form, verbatim as sent by the
/// supplicant (at most 17 characters, six `:`-separated hex groups).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Payload {
    /// Events that carry no structured payload.
    #[default]
    None,
    ApStaConnected {
        mac: String,
    },
    ApStaDisconnected {
        mac: String,
    },
    P2pDeviceFound {
        peer_mac: String,
        name: String,
    },
    P2pDeviceLost {
        /// Empty when the supplicant omitted `p2p_dev_addr`.
        peer_mac: String,
    },
    P2pGoNegSuccess {
        role: Role,
        peer_mac: String,
        peer_iface: String,
    },
    P2pGroupStarted {
        ifname: String,
        role: Role,
        go_mac: String,
    },
    P2pGroupRemoved {
        ifname: String,
        role: Role,
    },
    P2pProvDiscShowPin {
        peer_mac: String,
        pin: String,
    },
    P2pProvDiscEnterPin {
        peer_mac: String,
    },
    P2pProvDiscPbcReq {
        peer_mac: String,
    },
    P2pProvDiscPbcResp {
        peer_mac: String,
    },
}

/// One parsed supplicant event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WpaEvent {
    pub ty: EventType,
    pub priority: Priority,
    /// The trailing text after the event name, verbatim.
    pub raw: String,
    pub payload: Payload,
}

impl WpaEvent {
    /// Classify and extract one event line.
    ///
    /// A line that matches no catalog entry parses successfully as
    /// [`EventType::Unknown`]; a catalog event whose payload is
    /// structurally broken is an error, and no partial event is returned.
    pub fn parse(line: &str) -> Result<WpaEvent> {
        let mut ev = WpaEvent::default();

        let rest = if let Some(tail) = line.strip_prefix('<') {
            let Some((inner, after)) = tail.split_once('>') else {
                // no closing '>': nothing sensible to match
                return Ok(ev);
            };
            ev.priority = parse_priority(inner);
            after
        } else {
            line
        };

        let Ok(idx) =
            EVENT_TABLE.binary_search_by(|(name, _)| compare_name(rest, name).reverse())
        else {
            return Ok(ev);
        };
        let (name, ty) = EVENT_TABLE[idx];
        ev.ty = ty;

        let raw = rest[name.len()..].trim_start_matches(' ');
        ev.raw = raw.to_string();

        let tokens = tokenize_payload(raw);
        ev.payload = extract_payload(ty, &tokens)?;
        Ok(ev)
    }
}

/// Decimal priority between `<` and `>`; anything else is `MsgDump`.
fn parse_priority(inner: &str) -> Priority {
    parse_dec(inner)
        .and_then(Priority::from_index)
        .unwrap_or(Priority::MsgDump)
}

/// Order `candidate` against a table `name`: equal when `name` is a
/// prefix of `candidate` ending at a space or the end of the line.
fn compare_name(candidate: &str, name: &str) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    match candidate.as_bytes().split_at_checked(name.len()) {
        Some((head, tail)) => match head.cmp(name.as_bytes()) {
            Ordering::Equal => match tail.first() {
                None | Some(&b' ') => Ordering::Equal,
                Some(_) => Ordering::Greater,
            },
            other => other,
        },
        // candidate is a strict prefix of name
        None => candidate.as_bytes().cmp(name.as_bytes()),
    }
}

/// Split the trailing text on whitespace, honouring the supplicant's
/// single-quote syntax: `'...'` groups a token, `\\` and `\'` escape
/// inside quotes.
fn tokenize_payload(src: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut cur = String::new();
    let mut open = false;
    let mut quoted = false;
    let mut escaped = false;

    for c in src.chars() {
        if quoted {
            if escaped {
                escaped = false;
                cur.push(c);
            } else if c == '\'' {
                quoted = false;
            } else if c == '\\' {
                escaped = true;
            } else {
                cur.push(c);
            }
        } else {
            match c {
                ' ' | '\t' | '\n' | '\r' => {
                    if open {
                        tokens.push(std::mem::take(&mut cur));
                        open = false;
                    }
                }
                '\'' => {
                    quoted = true;
                    escaped = false;
                    open = true;
                }
                _ => {
                    cur.push(c);
                    open = true;
                }
            }
        }
    }
    if open || quoted {
        tokens.push(cur);
    }
    tokens
}

/// Validate and copy a MAC token: at most 17 characters, six
/// `:`-separated groups of one or two hex digits.
fn parse_mac(token: &str) -> Result<String> {
    let valid = token.len() <= 17
        && token.split(':').count() == 6
        && token
            .split(':')
            .all(|g| !g.is_empty() && g.len() <= 2 && g.bytes().all(|b| b.is_ascii_hexdigit()));

    if valid {
        Ok(token.to_string())
    } else {
        Err(WfdError::ProtocolMalformed("invalid MAC address"))
    }
}

fn require_mac(token: Option<&String>) -> Result<String> {
    let token = token.ok_or(WfdError::ProtocolMalformed("missing MAC token"))?;
    parse_mac(token)
}

/// Find `key=value` among `tokens` and return the value.
fn scan_key<'a>(tokens: &'a [String], key: &str) -> Option<&'a str> {
    tokens.iter().find_map(|t| t.strip_prefix(key))
}

fn extract_payload(ty: EventType, tokens: &[String]) -> Result<Payload> {
    let payload = match ty {
        EventType::ApStaConnected => Payload::ApStaConnected {
            mac: require_mac(tokens.first())?,
        },
        EventType::ApStaDisconnected => Payload::ApStaDisconnected {
            mac: require_mac(tokens.first())?,
        },
        EventType::P2pDeviceFound => {
            if tokens.len() < 2 {
                return Err(WfdError::ProtocolMalformed("truncated P2P-DEVICE-FOUND"));
            }
            Payload::P2pDeviceFound {
                peer_mac: require_mac(tokens.first())?,
                name: scan_key(tokens, "name=")
                    .ok_or(WfdError::ProtocolMalformed("P2P-DEVICE-FOUND without name"))?
                    .to_string(),
            }
        }
        EventType::P2pDeviceLost => {
            if tokens.is_empty() {
                return Err(WfdError::ProtocolMalformed("truncated P2P-DEVICE-LOST"));
            }
            // tolerate a missing p2p_dev_addr; some supplicants omit it
            let peer_mac = match scan_key(tokens, "p2p_dev_addr=") {
                Some(mac) => parse_mac(mac)?,
                None => String::new(),
            };
            Payload::P2pDeviceLost { peer_mac }
        }
        EventType::P2pGoNegSuccess => {
            if tokens.len() < 3 {
                return Err(WfdError::ProtocolMalformed("truncated P2P-GO-NEG-SUCCESS"));
            }
            let role = scan_key(tokens, "role=")
                .and_then(Role::from_token)
                .ok_or(WfdError::ProtocolMalformed("P2P-GO-NEG-SUCCESS without role"))?;
            let peer_mac = scan_key(tokens, "peer_dev=")
                .ok_or(WfdError::ProtocolMalformed("P2P-GO-NEG-SUCCESS without peer_dev"))
                .and_then(parse_mac)?;
            let peer_iface = scan_key(tokens, "peer_iface=")
                .ok_or(WfdError::ProtocolMalformed("P2P-GO-NEG-SUCCESS without peer_iface"))
                .and_then(parse_mac)?;
            Payload::P2pGoNegSuccess {
                role,
                peer_mac,
                peer_iface,
            }
        }
        EventType::P2pGroupStarted => {
            if tokens.len() < 3 {
                return Err(WfdError::ProtocolMalformed("truncated P2P-GROUP-STARTED"));
            }
            let ifname = tokens[0].clone();
            let role = Role::from_token(&tokens[1])
                .ok_or(WfdError::ProtocolMalformed("P2P-GROUP-STARTED with bad role"))?;
            let go_mac = scan_key(&tokens[2..], "go_dev_addr=")
                .ok_or(WfdError::ProtocolMalformed("P2P-GROUP-STARTED without go_dev_addr"))
                .and_then(parse_mac)?;
            Payload::P2pGroupStarted {
                ifname,
                role,
                go_mac,
            }
        }
        EventType::P2pGroupRemoved => {
            if tokens.len() < 2 {
                return Err(WfdError::ProtocolMalformed("truncated P2P-GROUP-REMOVED"));
            }
            Payload::P2pGroupRemoved {
                ifname: tokens[0].clone(),
                role: Role::from_token(&tokens[1])
                    .ok_or(WfdError::ProtocolMalformed("P2P-GROUP-REMOVED with bad role"))?,
            }
        }
        EventType::P2pProvDiscShowPin => {
            if tokens.len() < 2 {
                return Err(WfdError::ProtocolMalformed("truncated P2P-PROV-DISC-SHOW-PIN"));
            }
            Payload::P2pProvDiscShowPin {
                peer_mac: require_mac(tokens.first())?,
                pin: tokens[1].clone(),
            }
        }
        EventType::P2pProvDiscEnterPin => Payload::P2pProvDiscEnterPin {
            peer_mac: require_mac(tokens.first())?,
        },
        EventType::P2pProvDiscPbcReq => Payload::P2pProvDiscPbcReq {
            peer_mac: require_mac(tokens.first())?,
        },
        EventType::P2pProvDiscPbcResp => Payload::P2pProvDiscPbcResp {
            peer_mac: require_mac(tokens.first())?,
        },
        _ => Payload::None,
    };
    Ok(payload)
}
