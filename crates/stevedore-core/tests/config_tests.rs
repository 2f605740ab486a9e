//! Clients built from configuration reach the configured daemon and honour
//! the configured stream buffer.

use std::time::Duration;

use axum::Router;
use axum::routing::get;
use pretty_assertions::assert_eq;
use serde_json::json;
use stevedore_config::AppConfig;
use stevedore_core::{CancellationToken, DaemonApi, DaemonClient, Scheme};
use stevedore_test_utils::{ScriptedDaemon, TestConfigBuilder};

fn daemon() -> ScriptedDaemon {
    ScriptedDaemon::new(
        Router::new()
            .route(
                "/info",
                get(|| async { axum::Json(json!({ "Containers": 2, "Images": 5 })) }),
            )
            .route(
                "/events",
                get(|| async {
                    (0..5)
                        .map(|i| format!("{{\"id\":\"c{i}\",\"status\":\"start\"}}\n"))
                        .collect::<String>()
                }),
            ),
    )
}

#[test_log::test(tokio::test)]
async fn test_from_config_uses_host_and_stream_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("daemon.sock");
    let daemon = daemon();
    let server = daemon.serve_unix(&socket).unwrap();

    let config = TestConfigBuilder::new()
        .unix_socket(&socket)
        .stream_buffer(3)
        .build();
    let client = DaemonClient::from_config(&config);
    assert_eq!(client.address().scheme, Scheme::LocalSocket);

    let mut sub = client.events(CancellationToken::new());
    assert_eq!(sub.capacity(), 3);

    let mut ids = Vec::new();
    while let Some(event) = tokio::time::timeout(Duration::from_secs(2), sub.next())
        .await
        .unwrap()
    {
        ids.push(event.unwrap().container_id);
    }
    assert_eq!(ids, vec!["c0", "c1", "c2", "c3", "c4"]);
    server.abort();
}

#[tokio::test]
async fn test_client_from_loaded_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("daemon.sock");
    let daemon = daemon();
    let server = daemon.serve_unix(&socket).unwrap();

    let path = TestConfigBuilder::new()
        .unix_socket(&socket)
        .stream_buffer(7)
        .write_to(dir.path())
        .unwrap();
    let config = AppConfig::load(&path).await.unwrap();
    assert_eq!(config.streams.buffer, 7);

    let info = DaemonClient::from_config(&config).info().await.unwrap();
    assert_eq!(info.containers, 2);
    assert_eq!(info.images, 5);
    server.abort();
}
