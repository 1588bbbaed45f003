//! RTSP line tokenizer.
//!
//! The RTSP grammar is word-based and allows linear whitespace between any
//! two tokens or special characters. [`tokenize`] splits a single logical
//! line into a list of tokens, discarding whitespace and control bytes and
//! decoding escape sequences inside double-quoted strings.
//!
//! The tokenizer can run before or after the decoder's line sanitiser. Note
//! that some RTSP lines embed URIs or other payloads that do not follow the
//! token grammar; those should be consumed from the raw line instead.

/// A tokenized RTSP line.
///
/// Tokens are stored in a single NUL-separated buffer, which is safe
/// because binary zero is not a legal RTSP line byte (the tokenizer strips
/// it). Escaped binary zero inside quotes is decoded to the two bytes
/// `\0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens {
    buf: Vec<u8>,
    count: usize,
}

impl Tokens {
    /// Number of tokens in the line.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Iterate over the tokens in order.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.buf.split(|&b| b == 0).take(self.count)
    }

    /// The `n`-th token, if present.
    pub fn get(&self, n: usize) -> Option<&[u8]> {
        self.iter().nth(n)
    }
}

/// Split one RTSP line into tokens.
///
/// Two modes, switched by double quotes:
///
/// - Outside quotes, whitespace closes the current token; each of the RTSP
///   separators `( ) [ ] { } < > @ , ; : \ / ? =` closes the current token
///   and is emitted as a one-byte token of its own; control bytes and
///   binary zero are discarded but close the current token.
/// - Inside quotes, content is copied literally with `\`-escapes decoded
///   (`\\ \" \n \r \t \a \f \v \b \e`); an escaped binary zero becomes the
///   literal two bytes `\0`; unknown escapes are kept as-is.
pub fn tokenize(line: &[u8]) -> Tokens {
    // Worst case one emitted byte plus one terminator per input byte.
    let mut buf = Vec::with_capacity(2 * line.len() + 2);
    let mut count = 0usize;
    let mut quoted = false;
    let mut escaped = false;
    let mut last = 0u8;

    for &c in line {
        let prev = last;
        last = 0;

        if quoted {
            if escaped {
                last = c;
                match c {
                    b'\\' => buf.push(b'\\'),
                    b'"' => buf.push(b'"'),
                    b'n' => buf.push(b'\n'),
                    b'r' => buf.push(b'\r'),
                    b't' => buf.push(b'\t'),
                    b'a' => buf.push(0x07),
                    b'f' => buf.push(0x0c),
                    b'v' => buf.push(0x0b),
                    b'b' => buf.push(0x08),
                    b'e' => buf.push(0x1b),
                    0 => {
                        // escaped binary zero becomes literal "\0"
                        buf.push(b'\\');
                        buf.push(b'0');
                        last = b'0';
                    }
                    _ => {
                        // keep unknown escape sequences
                        buf.push(b'\\');
                        buf.push(c);
                    }
                }
                escaped = false;
            } else if c == b'"' {
                buf.push(0);
                count += 1;
                quoted = false;
            } else if c == b'\\' {
                escaped = true;
                last = prev;
            } else if c == 0 {
                // discard
                last = prev;
            } else {
                buf.push(c);
                last = c;
            }
        } else {
            match c {
                b'"' => {
                    if prev != 0 {
                        buf.push(0);
                        count += 1;
                    }
                    quoted = true;
                }
                0 => {
                    // discard
                    last = prev;
                }
                b' ' | b'\t' | b'\n' | b'\r' => {
                    if prev != 0 {
                        buf.push(0);
                        count += 1;
                    }
                }
                b'(' | b')' | b'[' | b']' | b'{' | b'}' | b'<' | b'>' | b'@' | b','
                | b';' | b':' | b'\\' | b'/' | b'?' | b'=' => {
                    if prev != 0 {
                        buf.push(0);
                        count += 1;
                    }
                    buf.push(c);
                    buf.push(0);
                    count += 1;
                }
                0x01..=0x1f | 0x7f => {
                    // ignore CTLs
                    if prev != 0 {
                        buf.push(0);
                        count += 1;
                    }
                }
                _ => {
                    buf.push(c);
                    last = c;
                }
            }
        }
    }

    if last != 0 || quoted {
        if escaped {
            buf.push(b'\\');
        }
        buf.push(0);
        count += 1;
    }

    Tokens { buf, count }
}
