#![allow(dead_code)]

pub mod fixtures;

use std::net::SocketAddr;

use daap_client::Client;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mount the connect handshake: a content-codes dictionary covering every
/// code the tests use, plus a modern (protocol 3.x) server-info.
pub async fn mount_handshake(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/content-codes"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(fixtures::content_codes_body()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/server-info"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(fixtures::server_info_body(3, 2)))
        .mount(server)
        .await;
}

/// Connect a client to the mock server. Blocking — call from
/// `tokio::task::spawn_blocking`.
pub fn connect(addr: SocketAddr) -> Client {
    let mut client = Client::new();
    client
        .connect(&addr.ip().to_string(), addr.port())
        .expect("connect to mock server");
    client
}
