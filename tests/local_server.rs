//! Local server exercised through `PlainConnectionSocketFactory`

use hc_ssl::conn::{ConnectionSocketFactory, PlainConnectionSocketFactory};
use hc_ssl::http::parser::parse_response;
use hc_ssl::http::{
    EchoHandler, HttpContext, HttpHost, HttpRequest, HttpResponse, ServerBootstrap, SocketConfig,
};
use hc_ssl::localserver;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

fn read_response(stream: &mut TcpStream) -> HttpResponse {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        if let Some((response, _)) = parse_response(&buf).unwrap() {
            return response;
        }
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed before a full response");
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[test]
fn test_echo_over_plain_factory() {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = ServerBootstrap::bootstrap()
        .set_server_info(localserver::ORIGIN)
        .set_socket_config(SocketConfig {
            so_timeout: Some(Duration::from_secs(5)),
            ..SocketConfig::default()
        })
        .register_handler("/echo*", EchoHandler)
        .create()
        .unwrap();

    let factory = PlainConnectionSocketFactory;
    let mut context = HttpContext::new();
    let host = HttpHost::new("localhost", server.local_port(), "http");
    let remote: SocketAddr = ([127, 0, 0, 1], server.local_port()).into();
    let socket = factory.create_socket(&mut context).unwrap();
    let mut stream = factory
        .connect_socket(1000, socket, &host, remote, None, &mut context)
        .unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    // Two exchanges on one keep-alive connection
    let mut request = HttpRequest::new("POST", "/echo");
    request.headers_mut().set("Host", "localhost");
    let wire = String::from_utf8(request.to_wire()).unwrap();
    let wire = wire.replace("\r\n\r\n", "\r\nContent-Length: 5\r\n\r\nhello");
    stream.write_all(wire.as_bytes()).unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.status(), 200);
    assert_eq!(response.body(), b"hello");
    assert_eq!(response.headers().get("Server"), Some(localserver::ORIGIN));

    stream
        .write_all(&HttpRequest::new("GET", "/unmapped").to_wire())
        .unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.status(), 501);

    server.shutdown(Duration::from_secs(10));
}

#[test]
fn test_drop_stops_listener() {
    let server = ServerBootstrap::bootstrap().create().unwrap();
    let addr = server.local_addr();

    let started = Instant::now();
    drop(server);
    assert!(started.elapsed() < Duration::from_secs(1));

    // The accept loop notices shutdown within one poll interval
    std::thread::sleep(Duration::from_millis(300));
    assert!(TcpStream::connect_timeout(&addr, Duration::from_secs(1)).is_err());
}
