//! TLS connection benchmarks
//!
//! Measures full connect + handshake + hostname verification against the
//! local TLS server, and hostname matching on its own.
//!
//! Run with: cargo bench --bench handshake

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hc_ssl::conn::ssl::{
    BrowserCompatHostnameVerifier, HostnameVerifier, SslConnectionSocketFactory,
    StrictHostnameVerifier,
};
use hc_ssl::http::{HttpContext, HttpHost, ServerBootstrap};
use hc_ssl::localserver;
use std::net::SocketAddr;
use std::time::Duration;

fn bench_connect_socket(c: &mut Criterion) {
    let server = ServerBootstrap::bootstrap()
        .set_server_info(localserver::ORIGIN)
        .set_ssl_context(localserver::create_server_ssl_context().unwrap())
        .create()
        .unwrap();
    let remote: SocketAddr = ([127, 0, 0, 1], server.local_port()).into();
    let host = HttpHost::new("localhost", server.local_port(), "https");
    let factory =
        SslConnectionSocketFactory::new(localserver::create_client_ssl_context().unwrap(), None);

    let mut group = c.benchmark_group("connect_socket");
    group.bench_function("tls_localhost", |b| {
        b.iter(|| {
            let mut context = HttpContext::new();
            let socket = factory.create_socket(&mut context).unwrap();
            let mut tls = factory
                .connect_socket(0, socket, &host, remote, None, &mut context)
                .unwrap();
            tls.close().unwrap();
            black_box(context);
        });
    });
    group.finish();

    server.shutdown(Duration::from_secs(10));
}

fn bench_hostname_matching(c: &mut Criterion) {
    let cns = vec!["*.example.co.jp".to_string()];
    let alts = vec![
        "www.example.com".to_string(),
        "*.api.example.com".to_string(),
        "example.com".to_string(),
    ];

    let mut group = c.benchmark_group("hostname_matching");
    group.bench_function("browser_compat", |b| {
        b.iter(|| {
            let result = BrowserCompatHostnameVerifier.verify_names(
                black_box("v1.api.example.com"),
                black_box(&cns),
                black_box(&alts),
            );
            black_box(result.is_ok());
        });
    });
    group.bench_function("strict", |b| {
        b.iter(|| {
            let result = StrictHostnameVerifier.verify_names(
                black_box("v1.api.example.com"),
                black_box(&cns),
                black_box(&alts),
            );
            black_box(result.is_ok());
        });
    });
    group.finish();
}

criterion_group! {
    name = handshake;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(100);
    targets = bench_connect_socket
}

criterion_group! {
    name = verification;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .sample_size(1000);
    targets = bench_hostname_matching
}

criterion_main!(handshake, verification);
