//! # wfd — Wi-Fi Display (Miracast) protocol library
//!
//! Miracast devices establish a Wi-Fi P2P link through a `wpa_supplicant`
//! daemon and then negotiate the session over RTSP, with RTP data
//! interleaved on the same connection. This crate provides the protocol
//! machinery both halves need: a streaming RTSP decoder and a supplicant
//! control-channel client with typed event parsing.
//!
//! ## Protocol references
//!
//! | Reference | Topic | How this crate uses it |
//! |-----------|-------|------------------------|
//! | [RFC 2326](https://tools.ietf.org/html/rfc2326) | RTSP 1.0 | Message decoding, header grammar, interleaved `$` framing |
//! | Wi-Fi Display v1.x | Miracast | RTSP usage profile, P2P session establishment |
//! | wpa_supplicant ctrl_iface | supplicant | Command/reply protocol, `ATTACH`ed event stream, event vocabulary |
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │  Caller     — owns sockets + event loop   │
//! ├───────────────────────────────────────────┤
//! │  rtsp       — Decoder, Message, tokenizer │
//! │  wpa        — WpaCtrl client, WpaEvent    │
//! ├───────────────────────────────────────────┤
//! │  ring, util — byte FIFO, ASCII parsing    │
//! └───────────────────────────────────────────┘
//! ```
//!
//! Everything runs single-threaded and cooperative. The RTSP decoder
//! never blocks; the supplicant client blocks only inside its readiness
//! waits, bounded by caller timeouts and an internal 10 s ceiling.
//!
//! ## Quick start
//!
//! ```no_run
//! use wfd::rtsp::{Decoder, DecoderEvent};
//!
//! let mut decoder = Decoder::new(|event| {
//!     match event {
//!         DecoderEvent::Message(msg) => println!("message: {:?}", msg.kind),
//!         DecoderEvent::Data { channel, size, .. } => {
//!             println!("rtp frame: channel {channel}, {size} bytes");
//!         }
//!         DecoderEvent::Error { .. } => {}
//!     }
//!     Ok(())
//! });
//!
//! // Feed connection bytes in whatever chunks the transport produces.
//! decoder.feed(b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n").unwrap();
//! ```
//!
//! ## Crate layout
//!
//! - [`rtsp`] — streaming [`Decoder`], [`Message`] model, line tokenizer.
//! - [`wpa`] — [`WpaCtrl`] supplicant client, [`WpaEvent`] event parser.
//! - [`ring`] — byte FIFO backing the decoder.
//! - [`error`] — [`WfdError`] enum and [`Result`] alias.

pub mod error;
pub mod ring;
pub mod rtsp;
pub mod wpa;

mod util;

pub use error::{Result, WfdError};
pub use rtsp::{Decoder, DecoderEvent, HeaderKind, Message, Method, MsgKind};
pub use wpa::{EventAction, Priority, Role, WpaCtrl, WpaEvent};
