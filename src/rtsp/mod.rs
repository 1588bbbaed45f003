//! RTSP protocol machinery (RFC 2326) for Wi-Fi Display.
//!
//! Wi-Fi Display runs its control plane over RTSP/1.0 and multiplexes RTP
//! data onto the same connection using interleaved `$` frames. This
//! module decodes that stream; composing and sending messages is left to
//! the caller.
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! ```text
//! OPTIONS * RTSP/1.0\r\n
//! CSeq: 1\r\n
//! Require: org.wfa.wfd1.0\r\n
//! \r\n
//! ```
//!
//! An interleaved data frame instead starts with `$`, one channel byte
//! and a big-endian 16-bit length, followed by that many payload bytes
//! (RFC 2326 §10.12).
//!
//! ## Decoding model
//!
//! [`Decoder`] is a push parser: feed it whatever byte slices the
//! transport produces, in any split, and it emits [`DecoderEvent`]s in
//! input order. Messages are parsed leniently — broken id-lines, unknown
//! methods and unknown headers are carried through as
//! [`MsgKind::Unknown`] / [`HeaderKind::Unknown`] data instead of
//! failing, so a conformant peer implementation can be written on top
//! while protocol extensions stay reachable. The only unrecoverable
//! header is a `Content-Length` that does not parse, because the entity
//! boundary would be lost.
//!
//! [`tokenize`] exposes the line tokenizer used for header parsing, for
//! callers that need to take header values apart the same way.

pub mod decoder;
pub mod message;
pub mod tokenizer;

pub use decoder::{Decoder, DecoderEvent};
pub use message::{
    HeaderBucket, HeaderFastPath, HeaderKind, Message, Method, MsgKind, status_base,
    status_description, status_is_valid,
};
pub use tokenizer::{Tokens, tokenize};
