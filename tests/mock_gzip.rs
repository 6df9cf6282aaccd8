mod common;

use common::fixtures;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── gzip transparency ──

#[tokio::test(flavor = "multi_thread")]
async fn a_gzipped_body_decodes_like_its_plain_counterpart() {
    // Two servers answering /login with the same atoms — one plain, one
    // gzip-encoded. The decoded result must be identical.
    let plain = MockServer::start().await;
    common::mount_handshake(&plain).await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(fixtures::login_body(7)))
        .mount(&plain)
        .await;

    let gzipped = MockServer::start().await;
    common::mount_handshake(&gzipped).await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Encoding", "gzip")
                .set_body_bytes(fixtures::gzip(&fixtures::login_body(7))),
        )
        .mount(&gzipped)
        .await;

    let plain_addr = *plain.address();
    let gzip_addr = *gzipped.address();

    tokio::task::spawn_blocking(move || {
        let plain_client = common::connect(plain_addr);
        let gzip_client = common::connect(gzip_addr);
        let plain_session = plain_client.login().unwrap();
        let gzip_session = gzip_client.login().unwrap();
        assert_eq!(plain_session.id(), gzip_session.id());
        assert_eq!(plain_session.id(), 7);
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn the_whole_handshake_survives_gzip_encoding() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/content-codes"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Encoding", "gzip")
                .set_body_bytes(fixtures::gzip(&fixtures::content_codes_body())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/server-info"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Encoding", "gzip")
                .set_body_bytes(fixtures::gzip(&fixtures::server_info_body(3, 2))),
        )
        .mount(&server)
        .await;

    let addr = *server.address();
    tokio::task::spawn_blocking(move || {
        let client = common::connect(addr);
        assert!(client.content_codes().kind_of(*b"asar").is_some());
        assert!(!client.is_old_itunes());
    })
    .await
    .unwrap();
}
