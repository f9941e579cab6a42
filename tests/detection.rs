//! Protocol detection and session-fatal errors.

mod common;

use common::TestServer;
use serde_json::json;

/// An unclassifiable first frame gets the error string, then the close.
#[tokio::test]
async fn detection_failure_terminates_session() {
    let server = TestServer::spawn().await;
    let mut client = server.client().await;

    client.send_text("certainly not a protocol").await.unwrap();
    let reply = client.recv_text().await.unwrap();
    assert_eq!(reply, "failed to detect protocol");
    client.expect_close().await.unwrap();
}

/// After the protocol is bound, a malformed frame is fatal.
#[tokio::test]
async fn parse_failure_after_binding_terminates_session() {
    let server = TestServer::spawn().await;
    let mut client = server.client().await;

    client.send_json(json!({"cmd": "handshake"})).await.unwrap();
    client.expect_statuscode(100).await.unwrap();

    client.send_text("not json at all").await.unwrap();
    let reply = client.recv_text().await.unwrap();
    assert_eq!(reply, "failed to parse packet");
    client.expect_close().await.unwrap();
}

/// Binary frames are a protocol error.
#[tokio::test]
async fn binary_frames_close_the_session() {
    let server = TestServer::spawn().await;
    let mut client = server.client().await;

    client.send_binary(vec![0x01, 0x02]).await.unwrap();
    client.expect_close().await.unwrap();
}

/// With reject_clients set, connections close before any dispatch.
#[tokio::test]
async fn reject_clients_closes_immediately() {
    let config = cloudlinkd::config::HubConfig {
        reject_clients: true,
        ..Default::default()
    };
    let server = TestServer::spawn_with(config).await;
    let mut client = server.client().await;

    client.expect_close().await.unwrap();
}

/// A semantic error does not end the session: the hub keeps serving.
#[tokio::test]
async fn semantic_errors_are_recoverable() {
    let server = TestServer::spawn().await;
    let mut client = server.client().await;

    client
        .send_json(json!({"cmd": "link", "val": "room", "listener": "x"}))
        .await
        .unwrap();
    client.expect_statuscode(111).await.unwrap();

    client.send_json(json!({"cmd": "handshake"})).await.unwrap();
    client.expect_statuscode(100).await.unwrap();
}
