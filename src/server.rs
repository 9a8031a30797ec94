//! HTTP front that answers every request through the worker, cache-first.

use std::net::SocketAddr;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::controller::FetchOutcome;
use crate::error::{Error, Result};
use crate::request::{Method, Request};
use crate::worker::WorkerHandle;

/// Header naming which path served the response.
pub const SOURCE_HEADER: &str = "x-pwa-cache";

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "content-length",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
];

#[derive(Clone)]
struct AppState {
    worker: WorkerHandle,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

async fn api_health() -> impl IntoResponse {
    axum::Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn api_status(State(state): State<AppState>) -> Response {
    match state.worker.status().await {
        Ok(status) => axum::Json(status).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

async fn serve_cached(
    State(state): State<AppState>,
    method: axum::http::Method,
    uri: Uri,
) -> Response {
    let Some(method) = Method::parse(method.as_str()) else {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    };
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());

    match state.worker.fetch(Request::new(method, path)).await {
        Ok(outcome) => into_http(outcome),
        Err(Error::Offline { url }) => {
            (StatusCode::GATEWAY_TIMEOUT, format!("offline: {url}")).into_response()
        }
        Err(e) => {
            log::error!("fetch {path} failed: {e}");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

fn into_http(outcome: FetchOutcome) -> Response {
    let FetchOutcome {
        response,
        served_from,
    } = outcome;
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut http = Response::new(Body::from(response.body));
    *http.status_mut() = status;
    let headers = http.headers_mut();
    for (name, value) in &response.headers {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    headers.insert(
        HeaderName::from_static(SOURCE_HEADER),
        HeaderValue::from_static(served_from.as_str()),
    );
    http
}

/// Builds the router around a running worker.
pub fn router(worker: WorkerHandle) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/__pwa/health", get(api_health))
        .route("/__pwa/status", get(api_status))
        .fallback(serve_cached)
        .layer(cors)
        .with_state(AppState { worker })
}

/// Serves the router on `host:port` until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address is invalid or cannot be bound.
pub async fn run_server(host: &str, port: u16, worker: WorkerHandle) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e: std::net::AddrParseError| Error::Config(format!("bind address: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("serving cache-first on http://{addr}");

    let shutdown_worker = worker.clone();
    axum::serve(listener, router(worker))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("could not listen for Ctrl-C: {e}");
            }
            shutdown_worker.shutdown();
        })
        .await?;
    Ok(())
}
