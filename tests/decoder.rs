//! End-to-end decode of a hostile RTSP byte stream.
//!
//! The stream below mixes every line-ending convention, leading noise,
//! continuation lines, interleaved data frames (also split across feeds)
//! and entity bodies. The decoder must produce the same event sequence no
//! matter how the stream is split into feed() calls.

use std::cell::RefCell;
use std::rc::Rc;

use wfd::rtsp::{Decoder, DecoderEvent, HeaderKind, Message, Method, MsgKind};

#[derive(Debug, Clone, PartialEq)]
enum Ev {
    Msg(Message),
    Data(u8, u16, Vec<u8>),
}

fn collect(chunks: &[&[u8]]) -> Vec<Ev> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let mut decoder = Decoder::new(move |event| {
        match event {
            DecoderEvent::Message(msg) => sink.borrow_mut().push(Ev::Msg(msg.clone())),
            DecoderEvent::Data {
                channel,
                size,
                payload,
            } => sink
                .borrow_mut()
                .push(Ev::Data(channel, size, payload.to_vec())),
            DecoderEvent::Error { .. } => {}
        }
        Ok(())
    });

    for chunk in chunks {
        decoder.feed(chunk).expect("feed");
    }

    let events = seen.borrow().clone();
    events
}

/// The torture stream, with the splits it arrives in.
const STREAM: &[&[u8]] = &[
    b"SOMETHING\r\n\r\n",
    b"SOMETHING",
    b"\r",
    b"\n",
    b"\n",
    b"SOME",
    b"THING",
    b"\r",
    b"\r",
    b"\n",
    b"SOME",
    b"THING\n",
    b"\r",
    b"SOMETHING\n\n",
    b"SOMETHING\r\r",
    b"SOMETHING\r\r\n",
    b"SOMETHING\n\r\n",
    b"OPTIONS * RTSP/1.0\n\r\n",
    b"OPTIONS    *    RTSP/1.0\n\r\n",
    b"OPTIONS *\r RTSP/1.0\n\r\n",
    b"OPTIONS *\r\n RTSP/1.0\n\r\n",
    b"OPTIONS\r *\n RTSP/1.0\n\r\n",
    b"  \r\n   OPTIONS * RTSP/1.0\n\r\n",
    b"\rOPTIONS * RTSP/1.0\n\r\n",
    b"\nOPTIONS * RTSP/1.0\n\r\n",
    b" OPTIONS *\n\t \r\tRTSP/1.0\n\r\n",
    b"OPTIONS * RTSP/1.0   \n\r\n",
    b"RTSP/1.0 200 OK Something\n\n",
    b"$\x01\x00\x06RAWSTH",
    b"$\x01\x00\x06RAWSTH",
    b"SOMETHING\r\nsome-header:value\r\n\r\n",
    b"OPTIONS * RTSP/2.1\n",
    b"some-header:value\n",
    b"some-other-header:buhu\n",
    b"\n",
    b"OPTIONS * RTSP/2.1\n",
    b"some-header:value \n",
    b"some-other-header:buhu \r \n \n",
    b"\n",
    b"  \n   $\x01\x00\x06RAWSTH",
    b"  \n   \r\n$\x01\x00",
    b"\x06RAWSTH",
    b"OPTIONS * RTSP/2.1\n",
    b"some-header :value \n",
    b"some-other-header: buhu \r \n \n",
    b"some-header : value \n",
    b"\n",
    b"OPTIONS * RTSP/2.1\n",
    b"some-header  \r   \n :value \n",
    b"some-other-header: \r\n buhu \r \n \n",
    b"some-header        \t\t\t:\r\n value    \n",
    b"\n",
    b"STH\r\ncontent-length:5\r\n\r\n12345",
    b"STH\r\ncontent-length:5/suffix\r\n\r\n12345",
    b"OPTIONS * RTSP/1.0\n",
    b"cseq: 100\n",
    b"\n",
    // leave this at the end: the trailing \n never arrives
    b"SOMETHING\n\r",
];

fn expect_msg(ev: &Ev) -> &Message {
    match ev {
        Ev::Msg(msg) => msg,
        other => panic!("expected message, got {other:?}"),
    }
}

fn assert_unknown(msg: &Message, id: &str, unknown_lines: &[&str]) {
    assert_eq!(msg.kind, MsgKind::Unknown);
    assert_eq!(msg.id_line, id);
    assert_eq!(msg.header(HeaderKind::Unknown).lines, unknown_lines);
}

fn assert_options(msg: &Message, major: u32, minor: u32, unknown_lines: &[&str]) {
    assert_eq!(msg.id_line, format!("OPTIONS * RTSP/{major}.{minor}"));
    assert_eq!(
        msg.kind,
        MsgKind::Request {
            method: "OPTIONS".to_string(),
            code: Method::Options,
            uri: "*".to_string(),
            major,
            minor,
        }
    );
    assert_eq!(msg.header(HeaderKind::Unknown).lines, unknown_lines);
}

fn check_stream_events(events: &[Ev]) {
    assert_eq!(events.len(), 32, "events: {events:#?}");

    // 8 permutations of bare-id messages with mixed line endings
    for ev in &events[0..8] {
        assert_unknown(expect_msg(ev), "SOMETHING", &[]);
    }

    // 10 OPTIONS requests with whitespace noise
    for ev in &events[8..18] {
        assert_options(expect_msg(ev), 1, 0, &[]);
    }

    // response with a multi-word reason phrase
    assert_eq!(
        expect_msg(&events[18]).kind,
        MsgKind::Response {
            major: 1,
            minor: 0,
            status: 200,
            phrase: "OK Something".to_string(),
        }
    );

    // interleaved data, back to back
    assert_eq!(events[19], Ev::Data(1, 6, b"RAWSTH".to_vec()));
    assert_eq!(events[20], Ev::Data(1, 6, b"RAWSTH".to_vec()));

    assert_unknown(expect_msg(&events[21]), "SOMETHING", &["some-header:value"]);

    for ev in &events[22..24] {
        assert_options(
            expect_msg(ev),
            2,
            1,
            &["some-header:value", "some-other-header:buhu"],
        );
    }

    // interleaved data behind leading noise, one frame split mid-head
    assert_eq!(events[24], Ev::Data(1, 6, b"RAWSTH".to_vec()));
    assert_eq!(events[25], Ev::Data(1, 6, b"RAWSTH".to_vec()));

    // whitespace around the colon keeps lines out of the known buckets
    for ev in &events[26..28] {
        assert_options(
            expect_msg(ev),
            2,
            1,
            &[
                "some-header :value",
                "some-other-header: buhu",
                "some-header : value",
            ],
        );
    }

    // entity bodies
    let msg = expect_msg(&events[28]);
    assert_unknown(msg, "STH", &[]);
    assert_eq!(msg.content_length(), Some(5));
    assert_eq!(
        msg.header(HeaderKind::ContentLength).lines,
        &["content-length:5"]
    );
    assert_eq!(msg.entity.as_deref(), Some(&b"12345"[..]));

    let msg = expect_msg(&events[29]);
    assert_unknown(msg, "STH", &[]);
    assert_eq!(msg.content_length(), Some(5));
    assert_eq!(
        msg.header(HeaderKind::ContentLength).lines,
        &["content-length:5/suffix"]
    );
    assert_eq!(msg.entity.as_deref(), Some(&b"12345"[..]));

    // cseq fast path
    let msg = expect_msg(&events[30]);
    assert_options(msg, 1, 0, &[]);
    assert_eq!(msg.cseq(), Some(100));
    assert_eq!(msg.header(HeaderKind::CSeq).lines, &["cseq: 100"]);

    // final message is terminated by \n\r with no trailing \n
    assert_unknown(expect_msg(&events[31]), "SOMETHING", &[]);
}

#[test]
fn torture_stream_decodes_as_expected() {
    check_stream_events(&collect(STREAM));
}

#[test]
fn event_sequence_is_split_invariant() {
    let whole: Vec<u8> = STREAM.concat();

    let as_chunks = collect(STREAM);
    let at_once = collect(&[&whole]);
    let byte_wise: Vec<&[u8]> = whole.chunks(1).collect();
    let per_byte = collect(&byte_wise);
    let odd_split: Vec<&[u8]> = whole.chunks(7).collect();
    let per_seven = collect(&odd_split);

    assert_eq!(as_chunks, at_once);
    assert_eq!(as_chunks, per_byte);
    assert_eq!(as_chunks, per_seven);

    check_stream_events(&at_once);
}

#[test]
fn message_storage_is_reset_between_messages() {
    // headers, entity and id must not leak into the following message
    let events = collect(&[
        b"STH\r\ncontent-length:5\r\ncseq: 7\r\n\r\n12345",
        b"OPTIONS * RTSP/1.0\n\r\n",
    ]);
    assert_eq!(events.len(), 2);

    let first = expect_msg(&events[0]);
    assert_eq!(first.content_length(), Some(5));
    assert_eq!(first.cseq(), Some(7));
    assert!(first.entity.is_some());

    let second = expect_msg(&events[1]);
    assert_eq!(second.content_length(), None);
    assert_eq!(second.cseq(), None);
    assert!(second.entity.is_none());
    assert!(second.headers.iter().all(|b| b.lines.is_empty()));
}
