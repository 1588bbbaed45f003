//! Streaming RTSP message decoder.
//!
//! The decoder takes input buffers of arbitrary length and feeds them byte
//! by byte through a small state machine. All it does at that level is
//! split the endless input stream into header lines; the lines themselves
//! are sanitised and handed to the id-line/header parsers. If a message
//! announces an entity payload, the body is collected; interleaved `$`
//! data frames are delimited and passed through untouched.
//!
//! Parsing RTSP is troublesome not because of the grammar but because of
//! the corner cases broken peers produce: bare `\r` line endings, leading
//! whitespace, continuation lines, stray characters between messages. The
//! state machine exists to stay byte-exact through all of them — feeding a
//! stream in arbitrary splits yields the same events as feeding it at
//! once.

use crate::error::{Result, WfdError};
use crate::ring::RingBuffer;
use crate::rtsp::message::{HeaderFastPath, HeaderKind, Message, Method, MsgKind};
use crate::rtsp::tokenizer::tokenize;
use crate::util::{parse_dec, parse_dec_prefix};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    New,
    Header,
    HeaderQuote,
    HeaderNewline,
    Body,
    DataHead,
    DataBody,
}

/// One decoded unit, delivered through the event callback.
#[derive(Debug)]
pub enum DecoderEvent<'a> {
    /// A complete message. The borrow ends when the callback returns; the
    /// decoder's internal message storage is back in its zero state
    /// afterwards.
    Message(&'a Message),
    /// One interleaved data frame (`$`-framing, RFC 2326 §10.12).
    /// `payload.len() == size`. Wire framing of the RTP/RTCP content is
    /// the caller's business.
    Data {
        channel: u8,
        size: u16,
        payload: &'a [u8],
    },
    /// Reserved for fatal input reporting. The decoder currently reports
    /// fatal conditions through [`Decoder::feed`]'s return value; the
    /// variant keeps the event vocabulary closed for callers that route
    /// events onward.
    Error { bytes: &'a [u8] },
}

type EventFn = Box<dyn FnMut(DecoderEvent<'_>) -> Result<()>>;

/// Streaming RTSP/1.0 decoder with Wi-Fi-Display interleaved-data support.
///
/// Feed raw connection bytes with [`feed`](Self::feed); complete messages
/// and data frames are emitted through the event callback, strictly
/// ordered by input-byte position. The decoder never blocks.
///
/// The first fatal error (unrecoverable `Content-Length`, callback
/// failure, internal inconsistency) marks the decoder dead; every
/// subsequent `feed` fails until [`reset`](Self::reset).
pub struct Decoder {
    event_fn: EventFn,

    msg: Message,
    seen_id: bool,

    ring: RingBuffer,
    /// Bytes examined but not yet pulled from the ring.
    buflen: usize,
    state: State,
    last: u8,
    remaining_body: usize,

    data_channel: u8,
    data_size: usize,

    /// Inside a `\`-escape within a quoted header segment.
    quoted: bool,
    dead: bool,
}

impl Decoder {
    pub fn new<F>(event_fn: F) -> Decoder
    where
        F: FnMut(DecoderEvent<'_>) -> Result<()> + 'static,
    {
        Decoder {
            event_fn: Box::new(event_fn),
            msg: Message::default(),
            seen_id: false,
            ring: RingBuffer::new(),
            buflen: 0,
            state: State::New,
            last: 0,
            remaining_body: 0,
            data_channel: 0,
            data_size: 0,
            quoted: false,
            dead: false,
        }
    }

    /// Whether a fatal error has been hit since the last reset.
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Drop all buffered input, the message in progress and the dead flag.
    pub fn reset(&mut self) {
        self.msg = Message::default();
        self.seen_id = false;
        self.ring.clear();
        self.buflen = 0;
        self.state = State::New;
        self.last = 0;
        self.remaining_body = 0;
        self.data_channel = 0;
        self.data_size = 0;
        self.quoted = false;
        self.dead = false;
    }

    /// Feed a slice of input. An empty slice is a no-op.
    ///
    /// Events for every message/data frame completed by these bytes are
    /// delivered before `feed` returns.
    pub fn feed(&mut self, buf: &[u8]) -> Result<()> {
        if self.dead {
            return Err(WfdError::InvalidArgument("decoder is dead until reset"));
        }
        if buf.is_empty() {
            return Ok(());
        }

        // `buflen` caches how much of the ring has been examined. Push the
        // whole input, then walk it one byte at a time; afterwards the
        // examined length must equal the ring length again.
        self.buflen = self.ring.len();
        self.ring.push(buf);

        let mut result = Ok(());
        for &ch in buf {
            if let Err(e) = self.feed_byte(ch) {
                result = Err(e);
                break;
            }
            self.last = ch;
        }

        if result.is_ok() && self.buflen != self.ring.len() {
            tracing::error!(
                buflen = self.buflen,
                ring = self.ring.len(),
                "internal RTSP parser inconsistency"
            );
            result = Err(WfdError::Internal);
        }

        if result.is_err() {
            self.dead = true;
        }
        result
    }

    fn feed_byte(&mut self, ch: u8) -> Result<()> {
        match self.state {
            State::New => self.feed_byte_new(ch),
            State::Header => self.feed_byte_header(ch),
            State::HeaderQuote => self.feed_byte_header_quote(ch),
            State::HeaderNewline => self.feed_byte_header_newline(ch),
            State::Body => self.feed_byte_body(ch),
            State::DataHead => self.feed_byte_data_head(ch),
            State::DataBody => self.feed_byte_data_body(ch),
        }
    }

    fn feed_byte_new(&mut self, ch: u8) -> Result<()> {
        match ch {
            b'\r' | b'\n' | b'\t' | b' ' => {
                // Leading LWS before a message is not allowed by the
                // grammar but must be ignored for compatibility.
                self.buflen += 1;
            }
            b'$' => {
                // Interleaved data: 1 byte channel, 2 byte length follow.
                self.state = State::DataHead;
                self.data_channel = 0;
                self.data_size = 0;

                // discard the skipped whitespace and the '$' itself
                self.ring.pull(self.buflen + 1);
                self.buflen = 0;
            }
            _ => {
                self.state = State::Header;
                self.remaining_body = 0;

                self.ring.pull(self.buflen);
                self.buflen = 1;
            }
        }
        Ok(())
    }

    fn feed_byte_header(&mut self, ch: u8) -> Result<()> {
        match ch {
            b'\r' => {
                if self.last == b'\r' || self.last == b'\n' {
                    // \r\r or \n\r is an empty line; it may still be
                    // completed to \r\r\n / \n\r\n, so move to
                    // HeaderNewline for the optional \n. If no body is
                    // expected the message must be finished now, since
                    // the trailing \n may never arrive.
                    self.state = State::HeaderNewline;

                    // The current \r already belongs to the empty line.
                    self.finish_header_line()?;
                    self.ring.pull(self.buflen + 1);
                    self.buflen = 0;

                    if self.remaining_body == 0 {
                        self.submit()?;
                    }
                } else {
                    // newline after a header line; maybe a continuation
                    // line follows, so nothing can be committed yet
                    self.buflen += 1;
                }
            }
            b'\n' => {
                if self.last == b'\n' {
                    // \n\n finishes the current header line and the
                    // message head.
                    self.finish_header_line()?;
                    self.ring.pull(self.buflen + 1);
                    self.buflen = 0;

                    if self.remaining_body > 0 {
                        self.state = State::Body;
                    } else {
                        self.state = State::New;
                        self.submit()?;
                    }
                } else {
                    // After \r this completes a \r\n; after any other byte
                    // it ends a line. Either way the next byte decides
                    // whether a continuation line follows.
                    self.buflen += 1;
                }
            }
            b'\t' | b' ' => {
                // whitespace, including continuation-line leads
                self.buflen += 1;
            }
            _ => {
                if self.last == b'\r' || self.last == b'\n' {
                    // not whitespace, so the buffered line is complete
                    // (current byte excluded)
                    self.finish_header_line()?;
                    self.ring.pull(self.buflen);
                    self.buflen = 0;
                }

                self.buflen += 1;
                if ch == b'"' {
                    self.state = State::HeaderQuote;
                    self.quoted = false;
                }
            }
        }
        Ok(())
    }

    fn feed_byte_header_quote(&mut self, ch: u8) -> Result<()> {
        if self.last == b'\\' && !self.quoted {
            // Escaped character, consume unparsed. The flag keeps a
            // double-backslash from escaping what follows it.
            self.buflen += 1;
            self.quoted = true;
        } else {
            self.quoted = false;
            self.buflen += 1;
            if ch == b'"' {
                self.state = State::Header;
            }
        }
        Ok(())
    }

    fn feed_byte_header_newline(&mut self, ch: u8) -> Result<()> {
        // An empty line ended with a bare \r. The standard requires a
        // following \n but asks implementations to accept \r alone, so a
        // \n here is consumed as part of the terminator and anything else
        // already belongs to the body.
        if ch == b'\n' {
            self.ring.pull(self.buflen + 1);
            self.buflen = 0;

            self.state = if self.remaining_body > 0 {
                State::Body
            } else {
                State::New
            };
            Ok(())
        } else {
            self.ring.pull(self.buflen);
            self.buflen = 0;

            self.state = State::Body;
            self.feed_byte_body(ch)
        }
    }

    fn feed_byte_body(&mut self, ch: u8) -> Result<()> {
        // A message without a body was already finished early; hand the
        // byte over to the next message.
        if self.remaining_body == 0 {
            self.state = State::New;
            return self.feed_byte_new(ch);
        }

        // any byte is allowed as body
        self.buflen += 1;
        self.remaining_body -= 1;

        if self.remaining_body == 0 {
            self.msg.entity = Some(self.ring.peek(self.buflen));
            let r = self.submit();

            self.state = State::New;
            self.ring.pull(self.buflen);
            self.buflen = 0;

            r?;
        }
        Ok(())
    }

    fn feed_byte_data_head(&mut self, _ch: u8) -> Result<()> {
        // 1 byte channel id, 2 byte big-endian payload length
        self.buflen += 1;
        if self.buflen >= 3 {
            let head = self.ring.peek(3);
            self.ring.pull(self.buflen);
            self.buflen = 0;

            self.data_channel = head[0];
            self.data_size = usize::from(u16::from_be_bytes([head[1], head[2]]));

            if self.data_size == 0 {
                // an empty frame is complete with its head
                let r = self.submit_data(Vec::new());
                self.state = State::New;
                r?;
            } else {
                self.state = State::DataBody;
            }
        }
        Ok(())
    }

    fn feed_byte_data_body(&mut self, _ch: u8) -> Result<()> {
        self.buflen += 1;
        if self.buflen >= self.data_size {
            let payload = self.ring.peek(self.data_size);
            let r = self.submit_data(payload);

            self.state = State::New;
            self.ring.pull(self.buflen);
            self.buflen = 0;

            r?;
        }
        Ok(())
    }

    /// Deliver the finished message and leave a zeroed one behind.
    fn submit(&mut self) -> Result<()> {
        let msg = std::mem::take(&mut self.msg);
        self.seen_id = false;
        (self.event_fn)(DecoderEvent::Message(&msg))
    }

    fn submit_data(&mut self, payload: Vec<u8>) -> Result<()> {
        (self.event_fn)(DecoderEvent::Data {
            channel: self.data_channel,
            size: self.data_size as u16,
            payload: &payload,
        })
    }

    /// Copy the buffered line out of the ring, sanitise it and run the id
    /// or header parser, depending on whether an id-line was seen.
    fn finish_header_line(&mut self) -> Result<()> {
        let mut raw = self.ring.peek(self.buflen);
        sanitize_line(&mut raw);
        let line = String::from_utf8_lossy(&raw).into_owned();

        if self.seen_id {
            self.parse_header_line(line)
        } else {
            self.seen_id = true;
            self.parse_id_line(line);
            Ok(())
        }
    }

    /// Parse the id-line. Both grammars are tried; anything else becomes
    /// an `Unknown` message with the raw line kept, never an error — a
    /// reply to a malformed line could trigger another error and loop.
    fn parse_id_line(&mut self, line: String) {
        let kind = if line.len() >= 5 && line.as_bytes()[..5].eq_ignore_ascii_case(b"RTSP/") {
            parse_response_line(&line)
        } else {
            parse_request_line(&line)
        };

        self.msg.kind = kind.unwrap_or_else(|| {
            tracing::debug!(line, "unparsable id-line, passing through as unknown");
            MsgKind::Unknown
        });
        self.msg.id_line = line;
    }

    /// Parse one header line: `<name> : <value...>`.
    fn parse_header_line(&mut self, line: String) -> Result<()> {
        let tokens = tokenize(line.as_bytes());
        if tokens.count() < 2 {
            return self.push_unknown_line(line);
        }

        let mut iter = tokens.iter();
        let (Some(name), Some(sep)) = (iter.next(), iter.next()) else {
            return self.push_unknown_line(line);
        };
        if sep != b":" {
            return self.push_unknown_line(line);
        }
        let kind = HeaderKind::from_token(name);
        let value = iter.next().unwrap_or(b"");

        match kind {
            HeaderKind::ContentLength => {
                // A broken Content-Length cannot be recovered from: the
                // length of the attached entity is unknown. Abort.
                let Some(clen) = parse_token_dec(value).and_then(|n| usize::try_from(n).ok())
                else {
                    tracing::warn!(line, "unrecoverable Content-Length");
                    return Err(WfdError::ProtocolMalformed("unparsable Content-Length"));
                };

                let bucket = self.msg.header_mut(HeaderKind::ContentLength);
                bucket.lines.push(line);
                bucket.value = Some(HeaderFastPath::ContentLength(clen));
                self.remaining_body = clen;
                Ok(())
            }
            HeaderKind::CSeq => match parse_token_dec(value) {
                Some(cseq) => {
                    let bucket = self.msg.header_mut(HeaderKind::CSeq);
                    bucket.lines.push(line);
                    bucket.value = Some(HeaderFastPath::CSeq(cseq));
                    Ok(())
                }
                // a broken CSeq is the caller's problem
                None => self.push_unknown_line(line),
            },
            _ => {
                self.msg.header_mut(kind).lines.push(line);
                Ok(())
            }
        }
    }

    /// Keep a line no structural parser accepted; the caller deals with
    /// it.
    fn push_unknown_line(&mut self, line: String) -> Result<()> {
        self.msg.header_mut(HeaderKind::Unknown).lines.push(line);
        Ok(())
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("state", &self.state)
            .field("buflen", &self.buflen)
            .field("remaining_body", &self.remaining_body)
            .field("dead", &self.dead)
            .finish_non_exhaustive()
    }
}

/// Parse the first decimal token of a header value; the whole token must
/// be digits.
fn parse_token_dec(token: &[u8]) -> Option<u64> {
    parse_dec(std::str::from_utf8(token).ok()?)
}

/// Collapse whitespace runs, strip binary zero and guarantee a trimmed
/// line, leaving double-quoted regions untouched (with `\`-escape
/// tracking so an escaped quote does not close the region). Leading
/// whitespace was already absorbed by the state machine.
fn sanitize_line(buf: &mut Vec<u8>) {
    let mut dst = 0;
    let mut last = 0u8;
    let mut quoted = false;
    let mut escaped = false;

    for i in 0..buf.len() {
        let mut c = buf[i];
        let prev = last;
        last = c;

        if quoted {
            if prev == b'\\' && !escaped {
                escaped = true;
                // escaped binary zero becomes "\0"
                if c == 0 {
                    c = b'0';
                }
            } else {
                escaped = false;
                if c == b'"' {
                    quoted = false;
                } else if c == 0 {
                    continue;
                }
            }
        } else {
            if c == 0 {
                continue;
            }

            if c == b'\r' || c == b'\n' || c == b'\t' {
                c = b' ';
                last = b' ';
            }

            if c == b' ' && prev == b' ' {
                continue;
            }

            if c == b'"' {
                quoted = true;
                escaped = false;
            }
        }

        buf[dst] = c;
        dst += 1;
    }

    while dst > 0 && buf[dst - 1] == b' ' {
        dst -= 1;
    }
    buf.truncate(dst);
}

/// `<method> <uri> RTSP/<major>.<minor>`, nothing trailing.
///
/// The method is matched against the method table but unknown methods are
/// accepted as-is; the URI is never interpreted.
fn parse_request_line(line: &str) -> Option<MsgKind> {
    let (method, rest) = line.split_once(' ')?;
    if method.is_empty() {
        return None;
    }

    let (uri, vers) = rest.split_once(' ')?;
    if uri.is_empty() {
        return None;
    }

    let vers = strip_prefix_ci(vers, "RTSP/")?;
    let (major, vers) = parse_dec_prefix(vers)?;
    let vers = vers.strip_prefix('.')?;
    let (minor, trailing) = parse_dec_prefix(vers)?;
    if !trailing.is_empty() {
        return None;
    }

    Some(MsgKind::Request {
        code: Method::from_name(method),
        method: method.to_string(),
        uri: uri.to_string(),
        major: u32::try_from(major).ok()?,
        minor: u32::try_from(minor).ok()?,
    })
}

/// `RTSP/<major>.<minor> <status> [<phrase...>]`.
///
/// Everything after the status code is the optional reason phrase; unlike
/// the request grammar, arbitrary trailing text is tolerated there.
fn parse_response_line(line: &str) -> Option<MsgKind> {
    // "RTSP/" was matched by the caller
    let rest = &line[5..];

    let (major, rest) = parse_dec_prefix(rest)?;
    let rest = rest.strip_prefix('.')?;
    let (minor, rest) = parse_dec_prefix(rest)?;
    let rest = rest.strip_prefix(' ')?;
    let (status, rest) = parse_dec_prefix(rest)?;

    let phrase = if rest.is_empty() {
        ""
    } else {
        rest.strip_prefix(' ')?
    };

    Some(MsgKind::Response {
        major: u32::try_from(major).ok()?,
        minor: u32::try_from(minor).ok()?,
        status: u32::try_from(status).ok()?,
        phrase: phrase.to_string(),
    })
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let (head, tail) = s.split_at_checked(prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then_some(tail)
}
