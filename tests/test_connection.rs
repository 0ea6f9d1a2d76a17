mod common;

use bytes::Bytes;
use common::Scripted;
use connslot::buffer::BufferError;
use connslot::http::connection::{
    BufferLimits, ConnError, Connection, ConnectionOptions, ConnectionState, ReadProgress,
    WriteProgress,
};
use connslot::http::response::{Body, Response, ResponseBuilder, StatusCode};

const HEADER: &[u8; 40] = b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n";

fn body() -> Bytes {
    Bytes::from((0..100u8).collect::<Vec<_>>())
}

fn options(keep_alive: bool) -> ConnectionOptions {
    ConnectionOptions {
        keep_alive,
        ..ConnectionOptions::default()
    }
}

/// A connection holding a 40 byte header and a 100 byte body, ready to send.
fn sending(keep_alive: bool, plan: &[usize]) -> Connection<Scripted> {
    let mut conn = Connection::new(&options(keep_alive));
    conn.attach(Scripted::new().writes(plan));
    conn.reply_header_mut().append_and_grow(HEADER).unwrap();
    conn.set_reply(Body::Shared(body()));
    conn
}

fn expected_wire() -> Vec<u8> {
    [&HEADER[..], &body()[..]].concat()
}

fn flush_with_plan(keep_alive: bool, plan: &[usize]) -> Connection<Scripted> {
    let mut conn = sending(keep_alive, plan);
    assert_eq!(conn.reply_total(), 140);

    let mut sent = 0;
    for &n in plan {
        let progress = conn.write_step().unwrap();
        sent += n;
        if sent < 140 {
            assert_eq!(progress, WriteProgress::Partial(n));
            assert_eq!(conn.send_pos(), sent);
            assert_eq!(conn.state(), ConnectionState::Sending);
            assert!(conn.is_writer());
        } else {
            assert_eq!(progress, WriteProgress::Flushed);
            break;
        }
    }

    assert_eq!(conn.stream().unwrap().written, expected_wire());
    conn
}

#[test]
fn test_flush_split_1_139() {
    let conn = flush_with_plan(true, &[1, 139]);
    assert_eq!(conn.state(), ConnectionState::Reading);
}

#[test]
fn test_flush_split_70_70() {
    let conn = flush_with_plan(true, &[70, 70]);
    assert_eq!(conn.state(), ConnectionState::Reading);
}

#[test]
fn test_flush_split_140_0() {
    let conn = flush_with_plan(true, &[140, 0]);
    assert_eq!(conn.state(), ConnectionState::Reading);
}

#[test]
fn test_flush_after_would_block() {
    let conn = flush_with_plan(true, &[0, 39, 1, 100]);
    assert_eq!(conn.state(), ConnectionState::Reading);
}

#[test]
fn test_keep_alive_resets_slot_for_next_request() {
    let conn = flush_with_plan(true, &[140]);
    assert!(conn.is_open());
    assert_eq!(conn.send_pos(), 0);
    assert!(conn.request().is_empty());
    assert!(conn.reply_header().is_empty());
    assert_eq!(conn.reply(), &Body::Empty);
}

#[test]
fn test_close_policy_ends_in_empty() {
    let mut conn = flush_with_plan(false, &[70, 70]);
    assert_eq!(conn.state(), ConnectionState::Empty);
    assert!(conn.close().is_some());
    assert!(!conn.is_open());
}

#[test]
fn test_header_and_body_go_out_in_one_write() {
    let mut conn = sending(true, &[50, 90]);
    conn.write_step().unwrap();
    conn.write_step().unwrap();
    assert_eq!(conn.stream().unwrap().slices_per_write, vec![2, 1]);
}

#[test]
fn test_echo_reply_aliases_request() {
    let request = b"POST /echo HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc";
    let mut conn = Connection::new(&options(true));
    conn.attach(Scripted::new().chunk(request).chunk(b"late"));

    assert_eq!(conn.read_step().unwrap(), ReadProgress::Ready);
    conn.prepare_reply(&Response::echo()).unwrap();

    // Bytes arriving after the reply was set are not part of it.
    assert_eq!(conn.read_step().unwrap(), ReadProgress::Pending);
    assert_eq!(conn.write_step().unwrap(), WriteProgress::Flushed);

    let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", request.len());
    let wire = [head.as_bytes(), &request[..]].concat();
    assert_eq!(conn.stream().unwrap().written, wire);
}

fn at_ceiling(script: Scripted) -> Connection<Scripted> {
    let mut conn = Connection::new(&ConnectionOptions {
        request: BufferLimits::new(48, 48),
        ..ConnectionOptions::default()
    });
    conn.attach(script);
    conn
}

const CEILING_REQUEST: &[u8; 48] = b"POST /echo HTTP/1.1\r\nContent-Length: 6\r\n\r\nabcdef";

#[test]
fn test_bytes_after_request_at_ceiling_do_not_fail_reply() {
    let mut conn = at_ceiling(
        Scripted::new()
            .chunk(CEILING_REQUEST)
            .chunk(b"x")
            .eof()
            .writes(&[10]),
    );

    assert_eq!(conn.read_step().unwrap(), ReadProgress::Ready);
    conn.prepare_reply(&Response::echo()).unwrap();
    assert!(matches!(conn.write_step().unwrap(), WriteProgress::Partial(_)));
    assert_eq!(conn.state(), ConnectionState::Sending);

    assert_eq!(conn.read_step().unwrap(), ReadProgress::Pending);
    assert_eq!(conn.state(), ConnectionState::Sending);
    assert_eq!(conn.write_step().unwrap(), WriteProgress::Flushed);

    let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", CEILING_REQUEST.len());
    let wire = [head.as_bytes(), &CEILING_REQUEST[..]].concat();
    assert_eq!(conn.stream().unwrap().written, wire);

    assert_eq!(conn.read_step().unwrap(), ReadProgress::Closed);
    assert_eq!(conn.state(), ConnectionState::Empty);
}

#[test]
fn test_hang_up_while_ready_at_ceiling() {
    let mut conn = at_ceiling(Scripted::new().chunk(CEILING_REQUEST).eof());

    assert_eq!(conn.read_step().unwrap(), ReadProgress::Ready);
    assert_eq!(conn.read_step().unwrap(), ReadProgress::Closed);
    assert_eq!(conn.state(), ConnectionState::Empty);
}

#[test]
fn test_empty_body_reply() {
    let mut conn = Connection::new(&options(true));
    conn.attach(Scripted::new().chunk(b"GET / HTTP/1.1\r\n\r\n"));
    conn.read_step().unwrap();
    conn.prepare_reply(&Response::not_found()).unwrap();

    assert_eq!(conn.write_step().unwrap(), WriteProgress::Flushed);
    assert_eq!(
        conn.stream().unwrap().written,
        b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n"
    );
}

#[test]
fn test_reply_header_overflow_leaves_reply_unset() {
    let mut conn: Connection<Scripted> = Connection::new(&ConnectionOptions {
        reply_header: BufferLimits::new(8, 16),
        ..ConnectionOptions::default()
    });
    conn.attach(Scripted::new());

    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("X-Padding", "x".repeat(64))
        .build();
    let err = conn.prepare_reply(&response).unwrap_err();
    assert!(matches!(err, BufferError::Overflow { .. }));
    assert!(conn.reply_header().is_empty());
    assert_eq!(conn.reply(), &Body::Empty);
}

#[test]
fn test_fallback_written_directly() {
    let mut conn = Connection::new(&options(true));
    conn.attach(Scripted::new());
    conn.send_fallback(StatusCode::InternalServerError);
    assert_eq!(conn.stream().unwrap().written, b"HTTP/1.0 500 \r\n\r\n");
}

#[test]
fn test_peer_close_empties_slot() {
    let mut conn = Connection::new(&options(true));
    conn.attach(Scripted::new().chunk(b"GET").eof());

    assert_eq!(conn.read_step().unwrap(), ReadProgress::Pending);
    assert_eq!(conn.read_step().unwrap(), ReadProgress::Closed);
    assert_eq!(conn.state(), ConnectionState::Empty);
}

#[test]
fn test_would_block_is_not_an_error() {
    let mut conn = Connection::new(&options(true));
    conn.attach(Scripted::new().fail_read(std::io::ErrorKind::Interrupted));

    assert_eq!(conn.read_step().unwrap(), ReadProgress::Pending);
    assert_eq!(conn.read_step().unwrap(), ReadProgress::Pending);
    assert_eq!(conn.state(), ConnectionState::Reading);
}

#[test]
fn test_read_error_is_reported() {
    let mut conn = Connection::new(&options(true));
    conn.attach(Scripted::new().fail_read(std::io::ErrorKind::ConnectionReset));

    let err = conn.read_step().unwrap_err();
    assert!(matches!(err, ConnError::Io(_)));
}

#[test]
fn test_detached_connection() {
    let mut conn: Connection<Scripted> = Connection::new(&options(true));
    assert_eq!(conn.state(), ConnectionState::Empty);
    assert!(matches!(conn.read_step(), Err(ConnError::Detached)));
    assert!(matches!(conn.write_step(), Err(ConnError::Detached)));
}

#[test]
fn test_attach_stamps_activity() {
    let mut conn = Connection::new(&options(true));
    let before = conn.last_activity();
    std::thread::sleep(std::time::Duration::from_millis(2));
    conn.attach(Scripted::new());
    assert!(conn.last_activity() > before);
    assert_eq!(conn.state(), ConnectionState::Reading);
}
