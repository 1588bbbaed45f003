//! Control-client round trips against a scripted fake supplicant.
//!
//! Each test binds a datagram socket under /tmp and plays the daemon
//! side of the protocol from a thread: `ATTACH`/`DETACH` handshakes,
//! command replies and pushed event datagrams.

use std::cell::RefCell;
use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use wfd::WfdError;
use wfd::wpa::{EventAction, EventType, Payload, Priority, WpaCtrl, WpaEvent};

fn scratch_path(tag: &str) -> PathBuf {
    PathBuf::from(format!(
        "/tmp/wfd-test-supplicant-{}-{}",
        std::process::id(),
        tag
    ))
}

fn bind_daemon(path: &PathBuf) -> UnixDatagram {
    let _ = std::fs::remove_file(path);
    let daemon = UnixDatagram::bind(path).expect("bind fake supplicant");
    daemon
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("read timeout");
    daemon
}

fn recv_expect(daemon: &UnixDatagram, expect: &[u8]) -> PathBuf {
    let mut buf = [0u8; 512];
    let (n, peer) = daemon.recv_from(&mut buf).expect("daemon recv");
    assert_eq!(&buf[..n], expect);
    peer.as_pathname().expect("client socket is bound").to_path_buf()
}

#[test]
fn attach_request_events_detach() {
    let path = scratch_path("roundtrip");
    let daemon = bind_daemon(&path);

    let fake = thread::spawn(move || {
        // the event socket subscribes first
        let ev_addr = recv_expect(&daemon, b"ATTACH");
        daemon.send_to(b"OK\n", &ev_addr).expect("ack ATTACH");

        // one command arrives on the request socket; slip an event
        // datagram in front of the reply, which the client must skip
        let req_addr = recv_expect(&daemon, b"P2P_FIND");
        daemon
            .send_to(b"<2>CTRL-EVENT-SCAN-STARTED", &req_addr)
            .expect("stray event");
        daemon.send_to(b"OK\n", &req_addr).expect("ack P2P_FIND");

        // push events at the subscribed socket
        daemon
            .send_to(
                b"<2>P2P-DEVICE-FOUND 00:11:22:33:44:55 name='Living Room TV'",
                &ev_addr,
            )
            .expect("event 1");
        daemon
            .send_to(b"<4>AP-STA-CONNECTED 00:11:22:33:44:55", &ev_addr)
            .expect("event 2");

        let detach_addr = recv_expect(&daemon, b"DETACH");
        assert_eq!(detach_addr, ev_addr, "DETACH must come from the event socket");
        let _ = daemon.send_to(b"OK\n", &ev_addr);
    });

    let seen = Rc::new(RefCell::new(Vec::<Vec<u8>>::new()));
    let sink = seen.clone();
    let mut ctrl = WpaCtrl::new(move |raw| {
        sink.borrow_mut().push(raw.to_vec());
        EventAction::Continue
    })
    .expect("client");

    ctrl.open(path.to_str().expect("utf-8 path")).expect("open");
    assert!(ctrl.is_open());
    assert!(matches!(
        ctrl.open(path.to_str().expect("utf-8 path")),
        Err(WfdError::AlreadyOpen)
    ));

    let mut reply = [0u8; 512];
    let len = ctrl
        .request(b"P2P_FIND", &mut reply, Some(Duration::from_secs(5)))
        .expect("request");
    assert_eq!(&reply[..len], b"OK\n");

    // drain the two pushed events; arrival order must be preserved
    let deadline = Instant::now() + Duration::from_secs(5);
    while seen.borrow().len() < 2 && Instant::now() < deadline {
        ctrl.dispatch(Some(Duration::from_millis(100))).expect("dispatch");
    }
    let raw_events = seen.borrow().clone();
    assert_eq!(raw_events.len(), 2);

    let found = WpaEvent::parse(std::str::from_utf8(&raw_events[0]).expect("ascii"))
        .expect("parse event 1");
    assert_eq!(found.ty, EventType::P2pDeviceFound);
    assert_eq!(found.priority, Priority::Info);
    assert_eq!(
        found.payload,
        Payload::P2pDeviceFound {
            peer_mac: "00:11:22:33:44:55".to_string(),
            name: "Living Room TV".to_string(),
        }
    );

    let sta = WpaEvent::parse(std::str::from_utf8(&raw_events[1]).expect("ascii"))
        .expect("parse event 2");
    assert_eq!(sta.ty, EventType::ApStaConnected);
    assert_eq!(sta.priority, Priority::Error);

    ctrl.close();
    assert!(!ctrl.is_open());

    fake.join().expect("fake supplicant");
    let _ = std::fs::remove_file(&path);
}

#[test]
fn request_times_out_on_a_mute_daemon() {
    let path = scratch_path("mute");
    let daemon = bind_daemon(&path);

    let fake = thread::spawn(move || {
        let ev_addr = recv_expect(&daemon, b"ATTACH");
        daemon.send_to(b"OK\n", &ev_addr).expect("ack ATTACH");

        // swallow one command without answering
        let mut buf = [0u8; 512];
        let _ = daemon.recv_from(&mut buf).expect("recv command");

        let _ = recv_expect(&daemon, b"DETACH");
        let _ = daemon.send_to(b"OK\n", &ev_addr);
    });

    let mut ctrl = WpaCtrl::new(|_| EventAction::Continue).expect("client");
    ctrl.open(path.to_str().expect("utf-8 path")).expect("open");

    let started = Instant::now();
    let mut reply = [0u8; 64];
    let err = ctrl
        .request(b"STATUS", &mut reply, Some(Duration::from_millis(150)))
        .unwrap_err();
    assert!(matches!(err, WfdError::Timeout), "got {err:?}");
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(ctrl.is_open(), "a timed-out request does not close the client");

    ctrl.close();
    fake.join().expect("fake supplicant");
    let _ = std::fs::remove_file(&path);
}

#[test]
fn callback_close_stops_the_event_drain() {
    let path = scratch_path("cbclose");
    let daemon = bind_daemon(&path);

    let fake = thread::spawn(move || {
        let ev_addr = recv_expect(&daemon, b"ATTACH");
        daemon.send_to(b"OK\n", &ev_addr).expect("ack ATTACH");

        // several queued events; the client closes on the first
        for _ in 0..3 {
            daemon
                .send_to(b"<3>CTRL-EVENT-TERMINATING", &ev_addr)
                .expect("event");
        }

        let _ = recv_expect(&daemon, b"DETACH");
        let _ = daemon.send_to(b"OK\n", &ev_addr);
    });

    let seen = Rc::new(RefCell::new(0usize));
    let count = seen.clone();
    let mut ctrl = WpaCtrl::new(move |_| {
        *count.borrow_mut() += 1;
        EventAction::Close
    })
    .expect("client");

    ctrl.open(path.to_str().expect("utf-8 path")).expect("open");

    let deadline = Instant::now() + Duration::from_secs(5);
    let err = loop {
        match ctrl.dispatch(Some(Duration::from_millis(100))) {
            Ok(()) => assert!(Instant::now() < deadline, "no event arrived"),
            Err(e) => break e,
        }
    };
    assert!(matches!(err, WfdError::NotOpen), "got {err:?}");
    assert!(!ctrl.is_open());
    assert_eq!(*seen.borrow(), 1, "drain must stop at the closing callback");

    fake.join().expect("fake supplicant");
    let _ = std::fs::remove_file(&path);
}

#[test]
fn client_reopens_after_close() {
    let path = scratch_path("reopen");
    let daemon = bind_daemon(&path);

    let fake = thread::spawn(move || {
        for _ in 0..2 {
            let ev_addr = recv_expect(&daemon, b"ATTACH");
            daemon.send_to(b"OK\n", &ev_addr).expect("ack ATTACH");
            let _ = recv_expect(&daemon, b"DETACH");
            let _ = daemon.send_to(b"OK\n", &ev_addr);
        }
    });

    let mut ctrl = WpaCtrl::new(|_| EventAction::Continue).expect("client");
    let path_str = path.to_str().expect("utf-8 path");

    ctrl.open(path_str).expect("first open");
    ctrl.close();
    assert!(!ctrl.is_open());

    ctrl.open(path_str).expect("second open");
    assert!(ctrl.is_open());
    ctrl.close();

    fake.join().expect("fake supplicant");
    let _ = std::fs::remove_file(&path);
}

#[test]
fn attach_failure_tears_the_client_down() {
    let path = scratch_path("noattach");
    let daemon = bind_daemon(&path);

    let fake = thread::spawn(move || {
        // refuse the subscription
        let ev_addr = recv_expect(&daemon, b"ATTACH");
        daemon.send_to(b"FAIL\n", &ev_addr).expect("nak ATTACH");
        // the client sends a best-effort DETACH afterwards
        let _ = recv_expect(&daemon, b"DETACH");
        let _ = daemon.send_to(b"OK\n", &ev_addr);
    });

    let mut ctrl = WpaCtrl::new(|_| EventAction::Continue).expect("client");
    let err = ctrl.open(path.to_str().expect("utf-8 path")).unwrap_err();
    assert!(matches!(err, WfdError::ProtocolMalformed(_)), "got {err:?}");
    assert!(!ctrl.is_open());

    fake.join().expect("fake supplicant");
    let _ = std::fs::remove_file(&path);
}
