//! HealthServer - read-only HTTP view of the process state.
//!
//! - `GET /health`: 200 unless the status is `error` (503)
//! - `GET /ready`: 200 when idle or running, 503 otherwise
//! - `GET /metrics`: Prometheus text format

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::metrics;
use crate::domain::ProcessState;
use crate::ports::{Clock, StateStore};

#[derive(Clone)]
pub struct HealthState {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    host: Arc<str>,
}

impl HealthState {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>, host: &str) -> Self {
        Self {
            store,
            clock,
            host: Arc::from(host),
        }
    }

    async fn snapshot(&self) -> Option<ProcessState> {
        match self.store.get().await {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(error = %e, "health endpoint cannot read state");
                None
            }
        }
    }

    fn timestamp(&self) -> String {
        self.clock.now().to_rfc3339()
    }
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    timestamp: String,
    current_operation: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReadyBody {
    ready: bool,
    timestamp: String,
}

fn status_code(ok: bool) -> StatusCode {
    if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn health(State(state): State<HealthState>) -> impl IntoResponse {
    let snapshot = state.snapshot().await;
    let healthy = snapshot.as_ref().is_some_and(|s| s.status.is_healthy());
    let body = HealthBody {
        status: if healthy { "healthy" } else { "unhealthy" },
        timestamp: state.timestamp(),
        current_operation: snapshot.and_then(|s| s.current_operation),
    };
    (status_code(healthy), Json(body))
}

async fn ready(State(state): State<HealthState>) -> impl IntoResponse {
    let ready = state
        .snapshot()
        .await
        .is_some_and(|s| s.status.is_ready());
    let body = ReadyBody {
        ready,
        timestamp: state.timestamp(),
    };
    (status_code(ready), Json(body))
}

async fn metrics_page(State(state): State<HealthState>) -> Response {
    let snapshot = state.snapshot().await.unwrap_or_default();
    match metrics::render(&snapshot, &state.host, state.clock.now_utc()) {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics_page))
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    state: HealthState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "health server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProcessStatus, StateUpdate};
    use crate::impls::InMemoryStateStore;
    use crate::ports::SystemClock;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn get_path(store: Arc<InMemoryStateStore>, path: &str) -> (StatusCode, String) {
        let app = router(HealthState::new(store, Arc::new(SystemClock), "host1"));
        let response = app
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn store_with(status: ProcessStatus) -> Arc<InMemoryStateStore> {
        let store = Arc::new(InMemoryStateStore::new());
        store
            .apply(vec![
                StateUpdate::SetStatus(status),
                StateUpdate::SetCurrentOperation(Some("db: uploaded".into())),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn health_is_ok_unless_error() {
        let (code, body) = get_path(store_with(ProcessStatus::Running).await, "/health").await;
        assert_eq!(code, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["current_operation"], "db: uploaded");
        assert!(json["timestamp"].is_string());

        let (code, body) = get_path(store_with(ProcessStatus::Error).await, "/health").await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("unhealthy"));
    }

    #[tokio::test]
    async fn ready_only_when_idle_or_running() {
        let (code, _) = get_path(Arc::new(InMemoryStateStore::new()), "/ready").await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);

        let (code, body) = get_path(store_with(ProcessStatus::Idle).await, "/ready").await;
        assert_eq!(code, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["ready"], true);
    }

    #[tokio::test]
    async fn metrics_reflect_last_cycle() {
        let store = Arc::new(InMemoryStateStore::new());
        store
            .apply(vec![StateUpdate::SetCycleCounts {
                succeeded: 2,
                failed: 1,
                skipped: 0,
            }])
            .await
            .unwrap();

        let (code, body) = get_path(store, "/metrics").await;

        assert_eq!(code, StatusCode::OK);
        assert!(body.contains(r#"backup_volumes_success{backuphost="host1"} 2"#), "{body}");
        assert!(body.contains(r#"backup_volumes_failed{backuphost="host1"} 1"#));
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let (code, _) = get_path(Arc::new(InMemoryStateStore::new()), "/nope").await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }
}
