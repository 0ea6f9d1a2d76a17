use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use connslot::config::Config;
use connslot::handler::{Echo, Handler, Router, SlotInfo};
use connslot::http::connection::{BufferLimits, ConnectionOptions};
use connslot::http::request::{Method, Request};
use connslot::http::response::Response;
use connslot::server::{Server, Slots};

fn server<H: Handler>(keep_alive: bool, handler: H) -> (Server<H>, SocketAddr) {
    let options = ConnectionOptions {
        keep_alive,
        ..ConnectionOptions::default()
    };
    server_with(&options, handler)
}

fn server_with<H: Handler>(options: &ConnectionOptions, handler: H) -> (Server<H>, SocketAddr) {
    let mut slots = Slots::new(2, options);
    let addr = slots
        .listen_tcp_addr("127.0.0.1:0".parse().unwrap())
        .unwrap();
    let server = Server::new(slots, handler).with_poll_interval(Duration::from_millis(10));
    (server, addr)
}

fn serve_until<H: Handler, T>(server: &mut Server<H>, client: JoinHandle<T>) -> T {
    for _ in 0..1000 {
        if client.is_finished() {
            break;
        }
        server.tick().unwrap();
    }
    client.join().unwrap()
}

fn client(addr: SocketAddr, request: &'static [u8]) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream.write_all(request).unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).unwrap();
        reply
    })
}

#[test]
fn test_static_reply_then_close() {
    let (mut server, addr) = server(false, Router::builtin(&Config::default()));
    let reply = serve_until(&mut server, client(addr, b"GET / HTTP/1.1\r\n\r\n"));

    assert_eq!(
        reply,
        b"HTTP/1.1 200 OK\r\nx-slot: 0\r\nx-open: 1\r\nContent-Length: 12\r\n\r\nHello World\n"
    );
    assert_eq!(server.slots().open_count(), 0);
}

#[test]
fn test_echo_with_keep_alive_reuses_connection() {
    const ECHO: &[u8] = b"POST /echo HTTP/1.1\r\nContent-Length: 4\r\n\r\nping";
    let router = Router::new().route(Method::POST, "/echo", Echo);
    let (mut server, addr) = server(true, router);

    let handle = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", ECHO.len());
        let expected = [head.as_bytes(), ECHO].concat();

        let mut replies = Vec::new();
        for _ in 0..2 {
            stream.write_all(ECHO).unwrap();
            let mut reply = vec![0; expected.len()];
            stream.read_exact(&mut reply).unwrap();
            replies.push(reply);
        }
        (replies, expected)
    });

    let (replies, expected) = serve_until(&mut server, handle);
    assert_eq!(replies, vec![expected.clone(), expected]);
}

#[test]
fn test_unrouted_path_is_not_found() {
    let (mut server, addr) = server(false, Router::new());
    let reply = serve_until(&mut server, client(addr, b"GET /nope HTTP/1.1\r\n\r\n"));
    assert_eq!(reply, b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
}

#[test]
fn test_handler_error_becomes_500() {
    let failing = |_: &Request<'_>, _: &SlotInfo| -> anyhow::Result<Response> {
        anyhow::bail!("backend unavailable")
    };
    let (mut server, addr) = server(false, failing);
    let reply = serve_until(&mut server, client(addr, b"GET / HTTP/1.1\r\n\r\n"));
    assert_eq!(
        reply,
        b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n"
    );
}

#[test]
fn test_reply_header_overflow_becomes_bare_500() {
    let options = ConnectionOptions {
        reply_header: BufferLimits::new(8, 16),
        ..ConnectionOptions::default()
    };
    let (mut server, addr) = server_with(&options, Router::builtin(&Config::default()));
    let reply = serve_until(&mut server, client(addr, b"GET / HTTP/1.1\r\n\r\n"));

    assert_eq!(reply, b"HTTP/1.0 500 \r\n\r\n");
    assert_eq!(server.slots().open_count(), 0);
}

#[test]
fn test_metrics_route() {
    let (mut server, addr) = server(false, Router::builtin(&Config::default()));
    let reply = serve_until(&mut server, client(addr, b"GET /metrics HTTP/1.1\r\n\r\n"));
    let text = String::from_utf8(reply).unwrap();

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.contains("connslot_open_connections 1\n"));
    assert!(text.contains("connslot_slots 2\n"));
}

#[test]
fn test_idle_connection_is_swept() {
    let (mut server, addr) = server(true, Router::new());
    server
        .slots_mut()
        .set_idle_timeout(Duration::from_millis(50));

    let handle = client(addr, b"");
    let mut closed = 0;
    for _ in 0..1000 {
        if handle.is_finished() {
            break;
        }
        closed += server.tick().unwrap().closed_idle;
    }
    assert_eq!(handle.join().unwrap(), b"");
    assert_eq!(closed, 1);
    assert_eq!(server.slots().open_count(), 0);
}

#[test]
fn test_from_config_binds_listeners() {
    let config = Config::from_yaml("slots: 3\nlisten: [\"tcp://127.0.0.1:0\"]\n").unwrap();
    let server = Server::from_config(&config, Router::builtin(&config)).unwrap();

    assert_eq!(server.slots().slot_count(), 3);
    let addr = server.slots().listener(0).unwrap().local_addr().unwrap();
    assert!(addr.ip().is_loopback());
    assert_ne!(addr.port(), 0);
}
