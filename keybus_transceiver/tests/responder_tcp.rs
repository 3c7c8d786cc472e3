//! Responder integration tests over a real loopback socket.
//!
//! Verifies:
//! 1. A digit request queues one command per digit, left to right.
//! 2. The text response carries all five status lines.
//! 3. `tag` answers with the JSON zone timestamps.
//! 4. One request per connection; the server keeps accepting.
//! 5. A client that never finishes its line cannot hold the server.

use keybus_common::codec::{Key, ZoneGroup, ZoneReport, encode};
use keybus_common::link::{FrameConsumer, OverflowPolicy, channel};
use keybus_common::status::{StatusLine, StatusText, StatusWriter, status_store};
use keybus_common::zones::ZoneTracker;
use keybus_transceiver::responder::Responder;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

// ─── Helpers ────────────────────────────────────────────────────────

fn start() -> (SocketAddr, FrameConsumer, StatusWriter) {
    let (commands_tx, commands_rx) = channel(16, OverflowPolicy::Reject);
    let (writer, reader) = status_store();
    let responder = Responder::bind("127.0.0.1:0".parse().unwrap(), commands_tx, reader)
        .expect("bind")
        .with_read_timeout(Duration::from_millis(100));
    let addr = responder.local_addr().unwrap();
    thread::spawn(move || serve(responder));
    (addr, commands_rx, writer)
}

fn serve(mut responder: Responder) {
    responder.serve()
}

fn request(addr: SocketAddr, body: &str) -> String {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream.write_all(body.as_bytes()).unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

// ─── Tests ──────────────────────────────────────────────────────────

#[test]
fn test_digits_queue_in_order() {
    let (addr, mut commands, _writer) = start();
    let response = request(addr, "42\n");
    assert_eq!(response, ", , , , ,");
    assert_eq!(commands.pop(), Some(encode(Key::Four)));
    assert_eq!(commands.pop(), Some(encode(Key::Two)));
    assert_eq!(commands.pop(), None);
}

#[test]
fn test_text_response_has_status_lines() {
    let (addr, mut commands, mut writer) = start();
    let led = StatusText::try_from("LED Status Ready, ").unwrap();
    writer.set_line(StatusLine::Led, &led);
    let zone = StatusText::try_from("Zone2 Ready ").unwrap();
    writer.set_line(StatusLine::Zones(ZoneGroup::Second), &zone);

    let response = request(addr, "stay\n");
    assert_eq!(response, "LED Status Ready, , , Zone2 Ready , , ,");
    assert_eq!(commands.pop(), Some(encode(Key::Stay)));
}

#[test]
fn test_tag_returns_json() {
    let (addr, mut commands, mut writer) = start();
    let mut zones = ZoneTracker::new();
    zones.apply(
        &ZoneReport {
            group: ZoneGroup::First,
            bitmap: 0x04,
        },
        1234,
    );
    writer.set_zones(&zones);
    writer.set_obs_time(1240);

    let response = request(addr, "tag\n");
    assert!(response.ends_with('\n'));
    let value: serde_json::Value = serde_json::from_str(response.trim_end()).unwrap();
    assert_eq!(value["obsTime"], 1240);
    assert_eq!(value["zoneAct"][2], 1234);
    assert_eq!(value["zoneAct"][0], 0);
    assert_eq!(value["zoneDeAct"].as_array().unwrap().len(), 32);
    assert_eq!(commands.pop(), Some(encode(Key::Idle)));
}

#[test]
fn test_server_handles_successive_connections() {
    let (addr, mut commands, _writer) = start();
    for body in ["star\n", "bogus\n", "7\n"] {
        request(addr, body);
    }
    assert_eq!(commands.pop(), Some(encode(Key::Star)));
    assert_eq!(commands.pop(), Some(encode(Key::Idle)));
    assert_eq!(commands.pop(), Some(encode(Key::Seven)));
}

#[test]
fn test_stalled_client_times_out() {
    let (addr, mut commands, _writer) = start();

    // No newline and fewer than 15 bytes: only the timeout ends the read.
    let mut stalled = TcpStream::connect(addr).expect("connect");
    stalled.write_all(b"9").unwrap();

    let response = request(addr, "3\n");
    assert_eq!(response, ", , , , ,");

    let mut late = String::new();
    stalled.read_to_string(&mut late).unwrap();
    assert_eq!(late, ", , , , ,");

    assert_eq!(commands.pop(), Some(encode(Key::Nine)));
    assert_eq!(commands.pop(), Some(encode(Key::Three)));
}
