//! Collaborator clients against mock servers, and the full server over TCP.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use todo_service::collaborators::{AuthClient, HttpAuthClient, KeyValueStore, RedisStore};
use todo_service::error::{AuthError, StoreError};
use todo_service::http::{AppState, HttpServer, TRACE_ID_HEADER};
use todo_service::lifecycle::{seed_defaults, Shutdown};
use todo_service::observability::context::{with_context, BaggageEntry, PropagationContext};
use todo_service::pipeline::{Aggregator, FaultInjector, TodoPipeline};
use todo_service::ServiceConfig;

mod common;

fn auth_client(url: String) -> HttpAuthClient {
    HttpAuthClient::with_client(reqwest::Client::builder().no_proxy().build().unwrap(), url)
}

#[tokio::test]
async fn test_auth_client_forwards_trace_headers() {
    let (url, heads) = common::start_mock_auth(200, r#"{"plan":"enterprise"}"#).await;
    let client = auth_client(url);

    let ctx = PropagationContext::create([("user.plan", BaggageEntry::new("enterprise"))]);
    let trace_id = ctx.trace_id().to_string();
    let user = with_context(ctx, client.authenticate()).await.unwrap();
    assert_eq!(user, serde_json::json!({ "plan": "enterprise" }));

    let heads = heads.lock().unwrap();
    assert_eq!(heads.len(), 1);
    assert!(heads[0].starts_with("get /auth http/1.1"));
    assert!(heads[0].contains(&format!("traceparent: 00-{}-", trace_id)));
    assert!(heads[0].contains("baggage: user.plan=enterprise"));
}

#[tokio::test]
async fn test_auth_client_rejects_non_success() {
    let (url, _) = common::start_mock_auth(503, "").await;
    let err = auth_client(url).authenticate().await.unwrap_err();
    assert!(matches!(err, AuthError::Status(503)));
}

#[tokio::test]
async fn test_auth_client_unreachable() {
    let addr = common::start_hangup_server().await;
    let err = auth_client(format!("http://{}/auth", addr))
        .authenticate()
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Transport(_)));
}

#[tokio::test]
async fn test_redis_store_commands() {
    let (addr, data) = common::start_mock_redis().await;
    let store = RedisStore::new(addr.to_string());

    store.set("todo:1", r#"{"name":"a"}"#).await.unwrap();
    store.set("todo:2", r#"{"name":"b"}"#).await.unwrap();
    store.set("user:1", "x").await.unwrap();

    assert_eq!(store.keys("todo:*").await.unwrap(), vec!["todo:1", "todo:2"]);
    assert_eq!(store.get("todo:2").await.unwrap().as_deref(), Some(r#"{"name":"b"}"#));
    assert_eq!(store.get("todo:9").await.unwrap(), None);
    assert_eq!(data.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_redis_store_connection_dropped() {
    let addr = common::start_hangup_server().await;
    let store = RedisStore::new(addr.to_string());
    let err = store.get("todo:1").await.unwrap_err();
    assert!(matches!(err, StoreError::Io(_)));
}

#[tokio::test]
async fn test_redis_oversized_reply_is_protocol_error() {
    let addr = common::start_scripted_redis(b"*9223372036854775807\r\n").await;
    let store = RedisStore::new(addr.to_string());
    let err = store.keys("todo:*").await.unwrap_err();
    assert!(matches!(err, StoreError::Protocol(_)));
}

#[tokio::test]
async fn test_oversized_store_reply_still_answers_500() {
    let addr = common::start_scripted_redis(b"*9223372036854775807\r\n").await;
    let (state, recorder) = common::test_state(
        common::enterprise_auth(),
        Arc::new(RedisStore::new(addr.to_string())),
        Duration::from_millis(1),
    );
    let app = todo_service::build_router(state);

    let response = app
        .oneshot(Request::get("/todos").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(body.is_empty());

    let samples = recorder.samples();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].status, 500);
    assert_eq!(samples[0].route.as_deref(), Some("/todos"));
}

#[tokio::test]
async fn test_server_end_to_end_with_redis() {
    let (redis_addr, _) = common::start_mock_redis().await;
    let (auth_url, _) = common::start_mock_auth(200, r#"{"plan":"enterprise"}"#).await;

    let store: Arc<dyn KeyValueStore> = Arc::new(RedisStore::new(redis_addr.to_string()));
    seed_defaults(store.as_ref()).await.unwrap();

    let recorder = Arc::new(common::InMemoryRecorder::default());
    let pipeline = TodoPipeline::new(
        Aggregator::new(Arc::new(auth_client(auth_url)), store, "todo:*"),
        FaultInjector::new(Duration::from_millis(1000)),
    );
    let state = AppState::new(pipeline, recorder.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(ServiceConfig::default(), state);
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, server_shutdown).await });

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let res = client
        .get(format!("http://{}/todos", addr))
        .send()
        .await
        .expect("server unreachable");
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()[TRACE_ID_HEADER].len(), 32);

    let body: serde_json::Value = res.json().await.unwrap();
    let mut names: Vec<&str> = body["todos"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "Configure sampling rule",
            "Deploy OpenTelemetry Collector",
            "Install OpenTelemetry SDK",
            "You are OpenTelemetry master!",
        ]
    );
    assert_eq!(body["user"]["plan"], "enterprise");

    let res = client
        .get(format!("http://{}/todos?fail=1", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);
    assert!(res.bytes().await.unwrap().is_empty());

    assert_eq!(recorder.samples().len(), 2);

    shutdown.trigger();
    handle.await.unwrap().unwrap();
}
