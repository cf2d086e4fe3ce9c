//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufStream};
use tokio::net::TcpListener;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use todo_service::collaborators::redis::{read_reply, Reply};
use todo_service::collaborators::store::glob_match;
use todo_service::collaborators::{AuthClient, KeyValueStore};
use todo_service::error::AuthError;
use todo_service::http::AppState;
use todo_service::observability::metrics::{DurationRecorder, MetricSample};
use todo_service::pipeline::{Aggregator, FaultInjector, TodoPipeline};

/// Keeps every sample in memory.
#[derive(Default)]
pub struct InMemoryRecorder {
    samples: Mutex<Vec<MetricSample>>,
}

impl InMemoryRecorder {
    pub fn samples(&self) -> Vec<MetricSample> {
        self.samples.lock().unwrap().clone()
    }
}

impl DurationRecorder for InMemoryRecorder {
    fn record_duration(&self, sample: &MetricSample) {
        self.samples.lock().unwrap().push(sample.clone());
    }
}

/// Auth stub returning a fixed payload.
pub struct StaticAuth(pub serde_json::Value);

#[async_trait]
impl AuthClient for StaticAuth {
    async fn authenticate(&self) -> Result<serde_json::Value, AuthError> {
        Ok(self.0.clone())
    }
}

/// Auth stub that always rejects.
pub struct DownAuth;

#[async_trait]
impl AuthClient for DownAuth {
    async fn authenticate(&self) -> Result<serde_json::Value, AuthError> {
        Err(AuthError::Status(503))
    }
}

pub fn enterprise_auth() -> Arc<dyn AuthClient> {
    Arc::new(StaticAuth(serde_json::json!({ "plan": "enterprise" })))
}

/// Build handler state around the given collaborators.
pub fn test_state(
    auth: Arc<dyn AuthClient>,
    store: Arc<dyn KeyValueStore>,
    slow_delay: Duration,
) -> (AppState, Arc<InMemoryRecorder>) {
    let recorder = Arc::new(InMemoryRecorder::default());
    let pipeline = TodoPipeline::new(
        Aggregator::new(auth, store, "todo:*"),
        FaultInjector::new(slow_delay),
    );
    (AppState::new(pipeline, recorder.clone()), recorder)
}

/// One captured tracing event.
#[derive(Debug, Clone, Default)]
pub struct CapturedEvent {
    pub level: String,
    pub fields: HashMap<String, String>,
    /// `trace_id` of the nearest enclosing span that carries one.
    pub span_trace_id: Option<String>,
}

/// Span extension holding the span's own `trace_id` field.
struct SpanTraceId(String);

impl CapturedEvent {
    pub fn message(&self) -> Option<&str> {
        self.fields.get("message").map(String::as_str)
    }
}

struct FieldVisitor<'a>(&'a mut HashMap<String, String>);

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }
}

/// Tracing layer that stores every event it sees.
#[derive(Clone, Default)]
pub struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CaptureLayer {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut fields = HashMap::new();
        attrs.record(&mut FieldVisitor(&mut fields));
        if let (Some(trace_id), Some(span)) = (fields.remove("trace_id"), ctx.span(id)) {
            span.extensions_mut().insert(SpanTraceId(trace_id));
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let mut captured = CapturedEvent {
            level: event.metadata().level().to_string(),
            ..Default::default()
        };
        event.record(&mut FieldVisitor(&mut captured.fields));
        if let Some(span) = ctx.event_span(event) {
            for s in span.scope() {
                let extensions = s.extensions();
                if let Some(trace_id) = extensions.get::<SpanTraceId>() {
                    captured.span_trace_id = Some(trace_id.0.clone());
                    break;
                }
            }
        }
        self.events.lock().unwrap().push(captured);
    }
}

/// Start a raw HTTP auth mock. Returns its URL and the captured request heads.
pub async fn start_mock_auth(status: u16, body: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let heads = Arc::new(Mutex::new(Vec::new()));
    let captured = heads.clone();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let captured = captured.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(socket);
                let mut head = String::new();
                loop {
                    let mut line = String::new();
                    match reader.read_line(&mut line).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) if line == "\r\n" => break,
                        Ok(_) => head.push_str(&line),
                    }
                }
                captured.lock().unwrap().push(head.to_ascii_lowercase());

                let status_text = match status {
                    200 => "200 OK",
                    401 => "401 Unauthorized",
                    503 => "503 Service Unavailable",
                    _ => "500 Internal Server Error",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let mut socket = reader.into_inner();
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}/auth", addr), heads)
}

/// Start a RESP server understanding KEYS, GET and SET.
pub async fn start_mock_redis() -> (SocketAddr, Arc<Mutex<BTreeMap<String, String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let data = Arc::new(Mutex::new(BTreeMap::<String, String>::new()));
    let shared = data.clone();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let data = shared.clone();
            tokio::spawn(async move {
                let mut stream = BufStream::new(socket);
                loop {
                    let Ok(Reply::Array(Some(args))) = read_reply(&mut stream).await else {
                        return;
                    };
                    let args: Vec<String> = args
                        .into_iter()
                        .filter_map(|arg| match arg {
                            Reply::Bulk(Some(bytes)) => String::from_utf8(bytes).ok(),
                            _ => None,
                        })
                        .collect();

                    let reply = {
                        let mut data = data.lock().unwrap();
                        match (args.first().map(|c| c.to_ascii_uppercase()).as_deref(), args.len()) {
                            (Some("KEYS"), 2) => {
                                let keys: Vec<&String> =
                                    data.keys().filter(|k| glob_match(&args[1], k)).collect();
                                let mut out = format!("*{}\r\n", keys.len());
                                for key in keys {
                                    out.push_str(&format!("${}\r\n{}\r\n", key.len(), key));
                                }
                                out
                            }
                            (Some("GET"), 2) => match data.get(&args[1]) {
                                Some(v) => format!("${}\r\n{}\r\n", v.len(), v),
                                None => "$-1\r\n".to_string(),
                            },
                            (Some("SET"), 3) => {
                                data.insert(args[1].clone(), args[2].clone());
                                "+OK\r\n".to_string()
                            }
                            _ => "-ERR unknown command\r\n".to_string(),
                        }
                    };

                    if stream.write_all(reply.as_bytes()).await.is_err() {
                        return;
                    }
                    if stream.flush().await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    (addr, data)
}

/// Start a RESP server that answers every command with the same raw bytes.
pub async fn start_scripted_redis(reply: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut stream = BufStream::new(socket);
                while read_reply(&mut stream).await.is_ok() {
                    if stream.write_all(reply).await.is_err() || stream.flush().await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    addr
}

/// Start a server that accepts one connection, reads a little, then hangs up.
pub async fn start_hangup_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 64];
            let _ = socket.read(&mut buf).await;
            drop(socket);
        }
    });
    addr
}
