use async_trait::async_trait;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use hostroute_core::{
    Candidate, ConnectionError, ConnectionStatus, DiagnosticStage, DispatchEnvelope,
    DispatchError, RawResponse,
};
use hostroute_lb::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

/// Probes fail for hosts with remaining scripted failures.
#[derive(Default)]
struct ScriptedProbe {
    failures: DashMap<String, usize>,
    probes: DashMap<String, usize>,
    total: AtomicUsize,
}

impl ScriptedProbe {
    fn fail(self, host: &str, times: usize) -> Self {
        self.failures.insert(host.to_string(), times);
        self
    }

    fn probes_for(&self, host: &str) -> usize {
        self.probes.get(host).map(|v| *v).unwrap_or(0)
    }
}

#[async_trait]
impl Transport for ScriptedProbe {
    async fn probe(&self, base: &Url) -> Result<(), ConnectionError> {
        let host = base.host_str().unwrap_or_default().to_string();
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.probes.entry(host.clone()).or_insert(0) += 1;

        if let Some(mut left) = self.failures.get_mut(&host) {
            if *left > 0 {
                *left -= 1;
                return Err(ConnectionError::Transport {
                    url: base.to_string(),
                    reason: "connection refused".into(),
                });
            }
        }
        Ok(())
    }

    async fn send(
        &self,
        _base: &Url,
        envelope: &DispatchEnvelope,
    ) -> Result<RawResponse, DispatchError> {
        Ok(RawResponse::Text(envelope.task_text.clone()))
    }
}

fn candidate(name: &str, url: Option<&str>) -> Candidate {
    Candidate {
        name: name.into(),
        agent_id: format!("id-{}", name),
        url: url.map(str::to_string),
        score: 0.5,
        version: "1.0".into(),
        description: None,
    }
}

#[tokio::test]
async fn test_misconfigured_candidates_are_never_probed() {
    let transport = Arc::new(ScriptedProbe::default());
    let pool = ConnectionPool::new(transport.clone());

    let report = pool
        .ensure(&[
            candidate("W1", Some("http://h1:9000")),
            candidate("W2", None),
            candidate("W3", Some("ftp://h3/x")),
        ])
        .await;

    assert_eq!(report.reachable_names(), vec!["W1"]);
    assert_eq!(transport.total.load(Ordering::SeqCst), 1);

    let statuses: Vec<_> = report.connections.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            ConnectionStatus::Reachable,
            ConnectionStatus::Misconfigured,
            ConnectionStatus::Misconfigured
        ]
    );
    assert_eq!(report.excluded().count(), 2);
    assert!(report
        .diagnostics
        .entries()
        .iter()
        .all(|e| e.stage == DiagnosticStage::Configuration));
}

#[tokio::test]
async fn test_unreachable_candidate_is_excluded_and_recorded() {
    let transport = Arc::new(ScriptedProbe::default().fail("h2", 1));
    let pool = ConnectionPool::new(transport.clone());

    let report = pool
        .ensure(&[
            candidate("W1", Some("http://h1")),
            candidate("W2", Some("http://h2")),
            candidate("W3", Some("http://h3")),
        ])
        .await;

    assert_eq!(report.reachable_names(), vec!["W1", "W3"]);
    assert_eq!(report.connections[1].status, ConnectionStatus::Unreachable);
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(
        report.diagnostics.entries()[0].candidate.as_deref(),
        Some("W2")
    );
    assert_eq!(pool.state("W2").await, ProbeState::Unreachable);
}

#[tokio::test]
async fn test_reachable_connections_are_reused() {
    let transport = Arc::new(ScriptedProbe::default());
    let pool = ConnectionPool::new(transport.clone());
    let candidates = [candidate("W1", Some("http://h1"))];

    pool.ensure(&candidates).await;
    pool.ensure(&candidates).await;
    let report = pool.ensure(&candidates).await;

    assert_eq!(report.reachable_names(), vec!["W1"]);
    assert_eq!(transport.probes_for("h1"), 1);
    assert_eq!(pool.len(), 1);
}

#[tokio::test]
async fn test_unreachable_candidates_are_probed_again() {
    let transport = Arc::new(ScriptedProbe::default().fail("h1", 1));
    let pool = ConnectionPool::new(transport.clone());
    let candidates = [candidate("W1", Some("http://h1"))];

    let first = pool.ensure(&candidates).await;
    assert!(first.reachable.is_empty());

    let second = pool.ensure(&candidates).await;
    assert_eq!(second.reachable_names(), vec!["W1"]);
    assert_eq!(transport.probes_for("h1"), 2);
    assert_eq!(pool.state("W1").await, ProbeState::Reachable);
}

#[tokio::test]
async fn test_url_change_triggers_new_probe() {
    let transport = Arc::new(ScriptedProbe::default());
    let pool = ConnectionPool::new(transport.clone());

    pool.ensure(&[candidate("W1", Some("http://h1"))]).await;
    let report = pool.ensure(&[candidate("W1", Some("http://h1-new"))]).await;

    assert_eq!(transport.probes_for("h1"), 1);
    assert_eq!(transport.probes_for("h1-new"), 1);
    assert_eq!(report.reachable[0].url.host_str(), Some("h1-new"));
}

#[tokio::test]
async fn test_concurrent_ensures_probe_once() {
    let transport = Arc::new(ScriptedProbe::default());
    let pool = Arc::new(ConnectionPool::new(transport.clone()));
    let candidates = vec![candidate("W1", Some("http://h1"))];

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            let candidates = candidates.clone();
            tokio::spawn(async move { pool.ensure(&candidates).await.reachable.len() })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), 1);
    }
    assert_eq!(transport.probes_for("h1"), 1);
}

async fn spawn_worker(app: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{}", addr)).unwrap()
}

fn http_transport(dispatch_timeout: Duration) -> HttpTransport {
    HttpTransport::with_settings(
        HealthCheckConfig {
            path: "/card".into(),
            timeout: Duration::from_secs(1),
            accept_invalid_certs: false,
        },
        "/messages",
        dispatch_timeout,
    )
    .unwrap()
}

#[tokio::test]
async fn test_http_transport_probe_and_send() {
    let app = Router::new()
        .route("/card", get(|| async { Json(json!({"name": "weather"})) }))
        .route(
            "/messages",
            post(|Json(body): Json<Value>| async move {
                let text = body["message"]["parts"][0]["text"]
                    .as_str()
                    .unwrap_or_default()
                    .to_uppercase();
                Json(json!({
                    "kind": "task",
                    "id": "t1",
                    "artifacts": [{"parts": [{"type": "text", "text": text}]}]
                }))
            }),
        );
    let base = spawn_worker(app).await;
    let transport = http_transport(Duration::from_secs(2));

    transport.probe(&base).await.unwrap();

    let envelope = DispatchEnvelope::new("sunny?", None, None);
    match transport.send(&base, &envelope).await.unwrap() {
        RawResponse::Task(task) => {
            let artifacts = task.artifacts.unwrap();
            assert_eq!(artifacts[0].first_text(), Some("SUNNY?"));
        }
        other => panic!("expected task, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_transport_reports_status_failures() {
    let app = Router::new()
        .route("/card", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route(
            "/messages",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
    let base = spawn_worker(app).await;
    let transport = http_transport(Duration::from_secs(2));

    assert!(matches!(
        transport.probe(&base).await,
        Err(ConnectionError::Status { status: 503, .. })
    ));

    let envelope = DispatchEnvelope::new("task", None, None);
    match transport.send(&base, &envelope).await {
        Err(DispatchError::Status { status, body }) => {
            assert_eq!(status, 502);
            assert_eq!(body, "upstream down");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_transport_times_out_slow_workers() {
    let app = Router::new().route(
        "/messages",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            "late"
        }),
    );
    let base = spawn_worker(app).await;
    let transport = http_transport(Duration::from_millis(100));

    let envelope = DispatchEnvelope::new("task", None, None);
    assert!(matches!(
        transport.send(&base, &envelope).await,
        Err(DispatchError::Timeout { after_ms: 100 })
    ));
}
