//! One-shot operations end to end: request shape, response decoding, error
//! propagation, and connection cleanup.

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use pretty_assertions::assert_eq;
use serde_json::json;
use stevedore_core::{ClientError, ContainerSpec, DaemonApi, DaemonClient, HostConfig, RunError};
use stevedore_test_utils::ScriptedDaemon;

fn container_json() -> serde_json::Value {
    json!({
        "Id": "4fa6e0f0c678",
        "Name": "/web",
        "State": { "Running": true },
        "Config": { "Image": "nginx:alpine" },
        "NetworkSettings": {
            "IPAddress": "172.17.0.2",
            "Ports": { "80/tcp": [{ "HostIp": "0.0.0.0", "HostPort": "8080" }] }
        },
        "HostConfig": {}
    })
}

#[tokio::test]
async fn test_pull_image_drains_progress_and_succeeds() {
    let daemon = ScriptedDaemon::new(Router::new().route(
        "/images/create",
        post(|| async {
            "{\"status\":\"Pulling from library/alpine\"}\n{\"status\":\"Download complete\"}\n"
        }),
    ));

    daemon.client().pull_image("alpine:3.20").await.unwrap();

    let request = daemon.only_request();
    assert_eq!(request.method, "POST");
    assert_eq!(request.query_param("fromImage").as_deref(), Some("alpine:3.20"));
    daemon.wait_until_all_closed().await;
}

#[tokio::test]
async fn test_pull_image_propagates_rejection() {
    let daemon = ScriptedDaemon::new(Router::new().route(
        "/images/create",
        post(|| async {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "message": "pull access denied for nope" })),
            )
        }),
    ));

    let err = daemon.client().pull_image("nope").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert!(err.to_string().contains("pull access denied"));
}

#[tokio::test]
async fn test_pull_image_fails_on_in_band_error() {
    let daemon = ScriptedDaemon::new(Router::new().route(
        "/images/create",
        post(|| async {
            "{\"status\":\"Pulling from library/nope\"}\n\
             {\"errorDetail\":{\"message\":\"manifest unknown\"},\"error\":\"manifest unknown\"}\n"
        }),
    ));

    let err = daemon.client().pull_image("nope:latest").await.unwrap_err();
    match err {
        ClientError::Reported { message } => assert_eq!(message, "manifest unknown"),
        other => panic!("unexpected error: {other}"),
    }
    daemon.wait_until_all_closed().await;
}

#[tokio::test]
async fn test_remove_escapes_name_in_path() {
    let daemon = ScriptedDaemon::new(Router::new().route(
        "/containers/{name}",
        delete(|| async { StatusCode::NO_CONTENT }),
    ));

    daemon
        .client()
        .remove_container("web?force=true", false, false)
        .await
        .unwrap();

    let request = daemon.only_request();
    assert_eq!(request.path, "/containers/web%3Fforce%3Dtrue");
    assert_eq!(
        request.query_pairs(),
        vec![
            ("force".to_string(), "false".to_string()),
            ("volumes".to_string(), "false".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_remove_container_sends_literal_flags() {
    let daemon = ScriptedDaemon::new(Router::new().route(
        "/containers/{name}",
        delete(|| async { StatusCode::NO_CONTENT }),
    ));

    daemon
        .client()
        .remove_container("web", true, false)
        .await
        .unwrap();

    let request = daemon.only_request();
    assert_eq!(request.method, "DELETE");
    assert_eq!(request.path, "/containers/web");
    assert_eq!(request.query.as_deref(), Some("force=true&volumes=false"));
    daemon.wait_until_all_closed().await;
}

#[tokio::test]
async fn test_create_moves_name_to_query() {
    let daemon = ScriptedDaemon::new(Router::new().route(
        "/containers/create",
        post(|| async { (StatusCode::CREATED, Json(json!({ "Id": "e90e34656806", "Warnings": [] }))) }),
    ));

    let spec = ContainerSpec::new("nginx:alpine")
        .with_name("foo")
        .with_env("MODE=test");
    let id = daemon.client().create_container(&spec).await.unwrap();
    assert_eq!(id, "e90e34656806");

    let request = daemon.only_request();
    assert_eq!(request.query_param("name").as_deref(), Some("foo"));
    let body = request.json();
    assert!(body.get("Name").is_none(), "name leaked into body: {body}");
    assert_eq!(body["Image"], "nginx:alpine");
    assert_eq!(body["Env"], json!(["MODE=test"]));
    daemon.wait_until_all_closed().await;
}

#[tokio::test]
async fn test_create_without_name_has_no_query() {
    let daemon = ScriptedDaemon::new(Router::new().route(
        "/containers/create",
        post(|| async { (StatusCode::CREATED, Json(json!({ "Id": "abc" }))) }),
    ));

    daemon
        .client()
        .create_container(&ContainerSpec::new("busybox"))
        .await
        .unwrap();
    assert_eq!(daemon.only_request().query, None);
}

#[tokio::test]
async fn test_create_with_bad_json_is_decoding_error() {
    let daemon = ScriptedDaemon::new(Router::new().route(
        "/containers/create",
        post(|| async { (StatusCode::CREATED, "not json") }),
    ));

    let err = daemon
        .client()
        .create_container(&ContainerSpec::new("busybox"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Decoding { .. }), "got {err}");
    daemon.wait_until_all_closed().await;
}

#[tokio::test]
async fn test_start_posts_host_config() {
    let daemon = ScriptedDaemon::new(Router::new().route(
        "/containers/{id}/start",
        post(|| async { StatusCode::NO_CONTENT }),
    ));

    let host = HostConfig {
        binds: vec!["/srv:/srv:ro".to_string()],
        ..HostConfig::default()
    };
    daemon
        .client()
        .start_container("abc", Some(&host))
        .await
        .unwrap();

    let request = daemon.only_request();
    assert_eq!(request.path, "/containers/abc/start");
    assert_eq!(request.json(), json!({ "Binds": ["/srv:/srv:ro"] }));
}

#[tokio::test]
async fn test_start_without_host_config_sends_no_body() {
    let daemon = ScriptedDaemon::new(Router::new().route(
        "/containers/{id}/start",
        post(|| async { StatusCode::NO_CONTENT }),
    ));

    daemon.client().start_container("abc", None).await.unwrap();
    assert!(daemon.only_request().body.is_empty());
}

#[tokio::test]
async fn test_run_creates_then_starts() {
    let daemon = ScriptedDaemon::new(
        Router::new()
            .route(
                "/containers/create",
                post(|| async { (StatusCode::CREATED, Json(json!({ "Id": "c1" }))) }),
            )
            .route(
                "/containers/{id}/start",
                post(|| async { StatusCode::NO_CONTENT }),
            ),
    );

    let spec = ContainerSpec::new("nginx").with_name("web").publish("80/tcp", "8080");
    let id = daemon.client().run_container(&spec).await.unwrap();
    assert_eq!(id, "c1");

    let requests = daemon.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].path, "/containers/create");
    assert_eq!(requests[1].path, "/containers/c1/start");
    assert_eq!(
        requests[1].json(),
        json!({ "PortBindings": { "80/tcp": [{ "HostIp": "", "HostPort": "8080" }] } })
    );
    daemon.wait_until_all_closed().await;
}

#[tokio::test]
async fn test_run_stops_after_failed_create() {
    let daemon = ScriptedDaemon::new(
        Router::new()
            .route(
                "/containers/create",
                post(|| async {
                    (StatusCode::CONFLICT, Json(json!({ "message": "name in use" })))
                }),
            )
            .route(
                "/containers/{id}/start",
                post(|| async { StatusCode::NO_CONTENT }),
            ),
    );

    let err = daemon
        .client()
        .run_container(&ContainerSpec::new("nginx").with_name("web"))
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Create(_)));
    assert_eq!(err.created_id(), None);
    assert_eq!(daemon.requests().len(), 1, "start must not be attempted");
}

#[tokio::test]
async fn test_run_keeps_container_when_start_fails() {
    let daemon = ScriptedDaemon::new(
        Router::new()
            .route(
                "/containers/create",
                post(|| async { (StatusCode::CREATED, Json(json!({ "Id": "c2" }))) }),
            )
            .route(
                "/containers/{id}/start",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "port is already allocated") }),
            ),
    );

    let err = daemon
        .client()
        .run_container(&ContainerSpec::new("nginx"))
        .await
        .unwrap_err();
    assert_eq!(err.created_id(), Some("c2"));
    assert_eq!(err.client_error().status(), Some(500));

    // No rollback: nothing but create and start reached the daemon
    let paths: Vec<_> = daemon.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(paths, vec!["/containers/create", "/containers/c2/start"]);
}

#[tokio::test]
async fn test_fetch_container_decodes_record() {
    let daemon = ScriptedDaemon::new(Router::new().route(
        "/containers/{name}/json",
        get(|| async { Json(container_json()) }),
    ));

    let container = daemon.client().fetch_container("web").await.unwrap();
    assert_eq!(container.id, "4fa6e0f0c678");
    assert!(container.is_running());
    assert_eq!(container.ip_address(), Some("172.17.0.2"));
    assert_eq!(daemon.only_request().path, "/containers/web/json");
    daemon.wait_until_all_closed().await;
}

#[tokio::test]
async fn test_fetch_missing_container_is_request_error() {
    let daemon = ScriptedDaemon::new(Router::new().route(
        "/containers/{name}/json",
        get(|| async { (StatusCode::NOT_FOUND, Json(json!({ "message": "No such container: ghost" }))) }),
    ));

    let err = daemon.client().fetch_container("ghost").await.unwrap_err();
    match err {
        ClientError::Request { status, message, .. } => {
            assert_eq!(status, 404);
            assert_eq!(message.as_deref(), Some("No such container: ghost"));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn test_fetch_all_containers_keeps_order() {
    let daemon = ScriptedDaemon::new(Router::new().route(
        "/containers/json",
        get(|| async {
            Json(json!([
                { "Id": "a", "Names": ["/first"], "Image": "redis", "State": "running", "Ports": [] },
                { "Id": "b", "Names": ["/second"], "Image": "nginx", "State": "exited", "Ports": null },
                { "Id": "c", "Names": ["/third"], "Image": "nginx", "State": "created",
                  "Ports": [{ "PrivatePort": 80, "PublicPort": 8080, "Type": "tcp" }] }
            ]))
        }),
    ));

    let containers = daemon.client().fetch_all_containers().await.unwrap();
    let ids: Vec<_> = containers.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(containers[1].state, "exited");
    assert_eq!(containers[2].ports[0].public_port, Some(8080));
}

#[tokio::test]
async fn test_info_exposes_root_dir() {
    let daemon = ScriptedDaemon::new(Router::new().route(
        "/info",
        get(|| async {
            Json(json!({
                "Containers": 2,
                "Images": 7,
                "Driver": "overlay2",
                "DriverStatus": [["Backing Filesystem", "extfs"], ["Root Dir", "/var/lib/docker/overlay2"]],
                "KernelVersion": "6.8.0"
            }))
        }),
    ));

    let info = daemon.client().info().await.unwrap();
    assert_eq!(info.containers, 2);
    assert_eq!(info.images, 7);
    assert_eq!(info.root_dir(), Some("/var/lib/docker/overlay2"));
    assert_eq!(info.kernel_version, "6.8.0");
}

#[tokio::test]
async fn test_operations_work_over_a_unix_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("daemon.sock");

    let daemon = ScriptedDaemon::new(
        Router::new()
            .route("/info", get(|| async { Json(json!({ "Containers": 1, "Driver": "vfs" })) }))
            .route(
                "/containers/{name}/json",
                get(|| async { Json(container_json()) }),
            ),
    );
    let server = daemon.serve_unix(&socket).unwrap();

    let client = DaemonClient::new(&format!("unix://{}", socket.display()));
    let info = client.info().await.unwrap();
    assert_eq!(info.driver, "vfs");

    // Bare paths resolve to the same socket
    let bare = DaemonClient::new(socket.to_str().unwrap());
    let container = bare.fetch_container("web").await.unwrap();
    assert_eq!(container.config.image, "nginx:alpine");

    assert_eq!(daemon.requests().len(), 2);
    server.abort();
}

#[tokio::test]
async fn test_concurrent_calls_share_one_client() {
    let daemon = ScriptedDaemon::new(Router::new().route(
        "/info",
        get(|| async { Json(json!({ "Containers": 4 })) }),
    ));
    let client = daemon.client();

    let calls = (0..8).map(|_| {
        let client = client.clone();
        tokio::spawn(async move { client.info().await })
    });
    for call in calls.collect::<Vec<_>>() {
        assert_eq!(call.await.unwrap().unwrap().containers, 4);
    }

    assert_eq!(daemon.connections_opened(), 8);
    daemon.wait_until_all_closed().await;
}
