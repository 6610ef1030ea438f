mod config;
mod cors;
mod dispatch;
mod error;
mod gateway;
mod metrics;
mod session;
mod submission;
mod ws;

use anyhow::Context;
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{header, header::HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::{sync::Arc, time::Instant};
use tokio::net::TcpListener;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::{LogFormat, RelayConfig};
use crate::dispatch::RelayDispatcher;
use crate::gateway::RoomDirectory;
use crate::metrics::RelayMetrics;
use crate::session::RoomMonitor;
use crate::submission::{HttpSubmissionStore, SubmissionCoordinator};

const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;
const REQUEST_ID_HEADER: &str = "x-request-id";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env();
    init_tracing(&config);

    let store = HttpSubmissionStore::new(&config.origin)
        .with_context(|| format!("invalid submission API origin `{}`", config.origin))?;
    info!(endpoint = %store.endpoint(), "session submissions will be persisted");
    let relay_metrics = Arc::new(RelayMetrics::default());
    metrics::set_global_metrics(Arc::clone(&relay_metrics));

    let rooms = Arc::new(RoomDirectory::default());
    let monitor = RoomMonitor::new(Arc::clone(&rooms));
    let submissions =
        SubmissionCoordinator::new(Arc::clone(&rooms), monitor.clone(), Arc::new(store));
    let dispatcher = RelayDispatcher::new(rooms, monitor, submissions);
    let app = build_router(dispatcher, relay_metrics, &config.origin);

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind relay listener on {}", config.listen_addr))?;

    info!(listen_addr = %config.listen_addr, origin = %config.origin, "starting relay server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("relay server exited unexpectedly")
}

fn init_tracing(config: &RelayConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn build_router(
    dispatcher: RelayDispatcher,
    relay_metrics: Arc<RelayMetrics>,
    origin: &str,
) -> Router {
    apply_middleware(
        Router::new()
            .route("/healthz", get(healthz))
            .route("/metrics", get(metrics_endpoint).with_state(relay_metrics))
            .merge(ws::router(dispatcher)),
        origin,
    )
}

fn apply_middleware(router: Router, origin: &str) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(cors::cors_layer(origin))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn metrics_endpoint(State(relay_metrics): State<Arc<RelayMetrics>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        relay_metrics.render_prometheus(),
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(error = %error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(error = %error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = next.run(request).await;

    if let Ok(request_id_header) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, request_id_header);
    }

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    use super::{apply_middleware, build_router};
    use crate::dispatch::RelayDispatcher;
    use crate::gateway::RoomDirectory;
    use crate::metrics::RelayMetrics;
    use crate::session::RoomMonitor;
    use crate::submission::{HttpSubmissionStore, SubmissionCoordinator};

    const ORIGIN: &str = "http://localhost:3000";

    fn test_router() -> Router {
        let rooms = Arc::new(RoomDirectory::default());
        let monitor = RoomMonitor::new(Arc::clone(&rooms));
        let store = HttpSubmissionStore::new(ORIGIN).expect("test origin should parse");
        let submissions =
            SubmissionCoordinator::new(Arc::clone(&rooms), monitor.clone(), Arc::new(store));
        let dispatcher = RelayDispatcher::new(rooms, monitor, submissions);
        build_router(dispatcher, Arc::new(RelayMetrics::default()), ORIGIN)
    }

    #[tokio::test]
    async fn health_check_has_request_id_header() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .expect("healthz request should build"),
            )
            .await
            .expect("healthz request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn caller_request_id_is_echoed() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .header("x-request-id", "req-123")
                    .body(Body::empty())
                    .expect("healthz request should build"),
            )
            .await
            .expect("healthz request should succeed");

        assert_eq!(
            response.headers().get("x-request-id").and_then(|value| value.to_str().ok()),
            Some("req-123")
        );
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_prometheus_text() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("metrics request should build"),
            )
            .await
            .expect("metrics request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("metrics body should be readable");
        let text = String::from_utf8(body.to_vec()).expect("metrics body should be utf8");
        assert!(text.contains("# TYPE relay_active_connections gauge"));
    }

    #[tokio::test]
    async fn websocket_route_rejects_plain_http() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/ws")
                    .body(Body::empty())
                    .expect("ws request should build"),
            )
            .await
            .expect("ws request should return a response");

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn panic_handler_returns_internal_server_error() {
        async fn panic_route() -> &'static str {
            panic!("test panic");
        }

        let app = apply_middleware(Router::new().route("/panic", get(panic_route)), ORIGIN);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/panic")
                    .body(Body::empty())
                    .expect("panic request should build"),
            )
            .await
            .expect("panic request should return a response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
