//! Typed representation of a decoded RTSP message.
//!
//! A [`Message`] keeps every raw header line it was built from, bucketed by
//! header kind, alongside the parsed fast-path fields (`Content-Length`,
//! `CSeq`). Lines the decoder could not parse structurally — even when the
//! header name is known — land in the [`HeaderKind::Unknown`] bucket, so
//! callers implementing extensions always have access to the original text.

/// RTSP method (RFC 2326 §10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// The method name did not match the RFC 2326 set.
    #[default]
    Unknown,
    Announce,
    Describe,
    GetParameter,
    Options,
    Pause,
    Play,
    Record,
    Redirect,
    Setup,
    SetParameter,
    Teardown,
}

const METHOD_NAMES: [(Method, &str); 11] = [
    (Method::Announce, "ANNOUNCE"),
    (Method::Describe, "DESCRIBE"),
    (Method::GetParameter, "GET_PARAMETER"),
    (Method::Options, "OPTIONS"),
    (Method::Pause, "PAUSE"),
    (Method::Play, "PLAY"),
    (Method::Record, "RECORD"),
    (Method::Redirect, "REDIRECT"),
    (Method::Setup, "SETUP"),
    (Method::SetParameter, "SET_PARAMETER"),
    (Method::Teardown, "TEARDOWN"),
];

impl Method {
    /// Canonical wire name, `None` for [`Method::Unknown`].
    pub fn name(self) -> Option<&'static str> {
        METHOD_NAMES
            .iter()
            .find(|(m, _)| *m == self)
            .map(|(_, name)| *name)
    }

    /// Case-insensitive lookup of a method name.
    pub fn from_name(name: &str) -> Method {
        METHOD_NAMES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map_or(Method::Unknown, |(m, _)| *m)
    }
}

/// RTSP header kind (RFC 2326 §12), used as the index into the per-message
/// header buckets. `Unknown` collects every line without a structural
/// parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum HeaderKind {
    Unknown = 0,
    Accept,
    AcceptEncoding,
    AcceptLanguage,
    Allow,
    Authorization,
    Bandwidth,
    Blocksize,
    CacheControl,
    Conference,
    Connection,
    ContentBase,
    ContentEncoding,
    ContentLanguage,
    ContentLength,
    ContentLocation,
    ContentType,
    CSeq,
    Date,
    Expires,
    From,
    Host,
    IfMatch,
    IfModifiedSince,
    LastModified,
    Location,
    ProxyAuthenticate,
    ProxyRequire,
    Public,
    Range,
    Referer,
    RetryAfter,
    Require,
    RtpInfo,
    Scale,
    Speed,
    Server,
    Session,
    Timestamp,
    Transport,
    Unsupported,
    UserAgent,
    Vary,
    Via,
    WwwAuthenticate,
}

const HEADER_NAMES: [(HeaderKind, &str); 44] = [
    (HeaderKind::Accept, "Accept"),
    (HeaderKind::AcceptEncoding, "Accept-Encoding"),
    (HeaderKind::AcceptLanguage, "Accept-Language"),
    (HeaderKind::Allow, "Allow"),
    (HeaderKind::Authorization, "Authorization"),
    (HeaderKind::Bandwidth, "Bandwidth"),
    (HeaderKind::Blocksize, "Blocksize"),
    (HeaderKind::CacheControl, "Cache-Control"),
    (HeaderKind::Conference, "Conference"),
    (HeaderKind::Connection, "Connection"),
    (HeaderKind::ContentBase, "Content-Base"),
    (HeaderKind::ContentEncoding, "Content-Encoding"),
    (HeaderKind::ContentLanguage, "Content-Language"),
    (HeaderKind::ContentLength, "Content-Length"),
    (HeaderKind::ContentLocation, "Content-Location"),
    (HeaderKind::ContentType, "Content-Type"),
    (HeaderKind::CSeq, "CSeq"),
    (HeaderKind::Date, "Date"),
    (HeaderKind::Expires, "Expires"),
    (HeaderKind::From, "From"),
    (HeaderKind::Host, "Host"),
    (HeaderKind::IfMatch, "If-Match"),
    (HeaderKind::IfModifiedSince, "If-Modified-Since"),
    (HeaderKind::LastModified, "Last-Modified"),
    (HeaderKind::Location, "Location"),
    (HeaderKind::ProxyAuthenticate, "Proxy-Authenticate"),
    (HeaderKind::ProxyRequire, "Proxy-Require"),
    (HeaderKind::Public, "Public"),
    (HeaderKind::Range, "Range"),
    (HeaderKind::Referer, "Referer"),
    (HeaderKind::RetryAfter, "Retry-After"),
    (HeaderKind::Require, "Require"),
    (HeaderKind::RtpInfo, "RTP-Info"),
    (HeaderKind::Scale, "Scale"),
    (HeaderKind::Speed, "Speed"),
    (HeaderKind::Server, "Server"),
    (HeaderKind::Session, "Session"),
    (HeaderKind::Timestamp, "Timestamp"),
    (HeaderKind::Transport, "Transport"),
    (HeaderKind::Unsupported, "Unsupported"),
    (HeaderKind::UserAgent, "User-Agent"),
    (HeaderKind::Vary, "Vary"),
    (HeaderKind::Via, "Via"),
    (HeaderKind::WwwAuthenticate, "WWW-Authenticate"),
];

impl HeaderKind {
    /// Number of header buckets, including [`HeaderKind::Unknown`].
    pub const COUNT: usize = 45;

    /// Canonical wire name, `None` for [`HeaderKind::Unknown`].
    pub fn name(self) -> Option<&'static str> {
        HEADER_NAMES
            .iter()
            .find(|(k, _)| *k == self)
            .map(|(_, name)| *name)
    }

    /// Case-insensitive whole-token lookup of a header name.
    pub fn from_token(token: &[u8]) -> HeaderKind {
        HEADER_NAMES
            .iter()
            .find(|(_, n)| n.as_bytes().eq_ignore_ascii_case(token))
            .map_or(HeaderKind::Unknown, |(k, _)| *k)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Whether `status` is inside the RTSP status-code range.
pub fn status_is_valid(status: u32) -> bool {
    (100..600).contains(&status)
}

/// The class (`100`, `200`, ...) of a status code, `600` for out-of-range
/// values.
pub fn status_base(status: u32) -> u32 {
    match status {
        100..600 => status / 100 * 100,
        _ => 600,
    }
}

/// Default reason phrase for an RTSP status code (RFC 2326 §7.1.1).
pub fn status_description(status: u32) -> Option<&'static str> {
    let desc = match status {
        100 => "Continue",
        200 => "OK",
        201 => "Created",
        250 => "Low on Storage Space",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Moved Temporarily",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Time-out",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Request Entity Too Large",
        414 => "Request-URI too Large",
        415 => "Unsupported Media Type",
        451 => "Parameter not Understood",
        452 => "Conference not Found",
        453 => "Not Enough Bandwidth",
        454 => "Session not Found",
        455 => "Method not Valid in this State",
        456 => "Header Field not Valid for Resource",
        457 => "Invalid Range",
        458 => "Parameter is Read-only",
        459 => "Aggregate Operation not Allowed",
        460 => "Only Aggregate Operation Allowed",
        461 => "Unsupported Transport",
        462 => "Destination Unreachable",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Time-out",
        505 => "RTSP Version not Supported",
        551 => "Option not Supported",
        _ => return None,
    };
    Some(desc)
}

/// The parsed id-line of a message.
///
/// Anything that fails the request/response grammar is carried as
/// [`MsgKind::Unknown`] with the raw line preserved in
/// [`Message::id_line`]; the decoder never escalates a broken id-line into
/// an error, to avoid answering a peer's bug with a disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MsgKind {
    #[default]
    Unknown,
    Request {
        /// Method name as received (non-empty).
        method: String,
        /// Method table lookup of `method`.
        code: Method,
        uri: String,
        major: u32,
        minor: u32,
    },
    Response {
        major: u32,
        minor: u32,
        status: u32,
        /// Reason phrase; empty when the peer sent none.
        phrase: String,
    },
}

/// Parsed fast-path value carried by a header bucket.
///
/// Repeated headers overwrite the value (last wins); every raw line is
/// still kept in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFastPath {
    ContentLength(usize),
    CSeq(u64),
}

/// One per-kind collection of raw header lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBucket {
    /// Sanitised raw lines, in arrival order.
    pub lines: Vec<String>,
    /// Parsed value for `Content-Length`/`CSeq` buckets.
    pub value: Option<HeaderFastPath>,
}

/// A decoded RTSP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MsgKind,
    /// The sanitised first line, verbatim.
    pub id_line: String,
    /// Raw header lines bucketed by [`HeaderKind`].
    pub headers: [HeaderBucket; HeaderKind::COUNT],
    /// Entity body; present iff a parsed `Content-Length` announced one.
    /// Its length always equals the announced content length.
    pub entity: Option<Vec<u8>>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            kind: MsgKind::default(),
            id_line: String::new(),
            headers: std::array::from_fn(|_| HeaderBucket::default()),
            entity: None,
        }
    }
}

impl Message {
    /// The bucket for `kind`.
    pub fn header(&self, kind: HeaderKind) -> &HeaderBucket {
        &self.headers[kind.index()]
    }

    pub(crate) fn header_mut(&mut self, kind: HeaderKind) -> &mut HeaderBucket {
        &mut self.headers[kind.index()]
    }

    /// Parsed `Content-Length`, if one was decoded.
    pub fn content_length(&self) -> Option<usize> {
        match self.header(HeaderKind::ContentLength).value {
            Some(HeaderFastPath::ContentLength(n)) => Some(n),
            _ => None,
        }
    }

    /// Parsed `CSeq`, if one was decoded.
    pub fn cseq(&self) -> Option<u64> {
        match self.header(HeaderKind::CSeq).value {
            Some(HeaderFastPath::CSeq(n)) => Some(n),
            _ => None,
        }
    }
}
