//! HTTP gate: serves the single-page application behind the viewer-request filter.

use super::{evaluate, EdgeDecision, EdgePolicy, EdgeResponse, ViewerRequest};
use crate::GIT_COMMIT_HASH;
use anyhow::Result;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, services::ServeDir, set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;

#[derive(Debug, Clone)]
pub struct GateState {
    pub policy: Arc<EdgePolicy>,
    /// Use the first `x-forwarded-for` hop instead of the socket peer.
    pub trust_forwarded_for: bool,
}

impl IntoResponse for EdgeResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::FORBIDDEN);
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }

        (status, headers, self.body).into_response()
    }
}

fn client_ip(state: &GateState, peer: SocketAddr, headers: &HeaderMap) -> String {
    if state.trust_forwarded_for {
        if let Some(first) = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return first.to_string();
        }
    }

    match peer.ip() {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map_or_else(|| v6.to_string(), |v4| v4.to_string()),
        IpAddr::V4(v4) => v4.to_string(),
    }
}

/// Middleware applying [`evaluate`] to every request.
pub async fn viewer_request(
    State(state): State<GateState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let mut viewer = ViewerRequest::new(
        client_ip(&state, peer, request.headers()),
        request.uri().to_string(),
    );
    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            viewer = viewer.with_header(name.as_str(), value);
        }
    }

    match evaluate(viewer, &state.policy) {
        EdgeDecision::Pass(_) => next.run(request).await,
        EdgeDecision::Reject(response) => response.into_response(),
    }
}

// axum handler for health
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "commit": GIT_COMMIT_HASH,
    }))
}

/// Build the gate router. `/health` stays reachable for health checks.
pub fn router(state: GateState, static_dir: PathBuf) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(static_dir))
        .layer(middleware::from_fn_with_state(state, viewer_request))
        .route("/health", get(health))
}

/// Serve the gate until ctrl-c.
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails
pub async fn new(port: u16, static_dir: PathBuf, state: GateState) -> Result<()> {
    let app = router(state, static_dir).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span)),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let path = request.uri().path();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, request_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::VIEWER_COUNTRY_HEADER;
    use axum::{body::to_bytes, extract::connect_info::MockConnectInfo, http::Request};
    use std::fs;
    use tower::ServiceExt;

    fn app(peer: &str, state: GateState) -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<html>faceauth</html>").unwrap();
        let peer: SocketAddr = peer.parse().unwrap();
        let router = router(state, dir.path().to_path_buf()).layer(MockConnectInfo(peer));
        (router, dir)
    }

    fn state() -> GateState {
        GateState {
            policy: Arc::new(EdgePolicy::default()),
            trust_forwarded_for: false,
        }
    }

    #[tokio::test]
    async fn allowed_peer_reaches_static_content() {
        let (app, _dir) = app("210.128.54.70:40000", state());
        let response = app
            .oneshot(Request::get("/index.html").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"<html>faceauth</html>");
    }

    #[tokio::test]
    async fn denied_peer_gets_forbidden_page() {
        let (app, _dir) = app("210.128.54.96:40000", state());
        let response = app
            .oneshot(Request::get("/index.html").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/html; charset=utf-8"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("Your IP: 210.128.54.96"));
    }

    #[tokio::test]
    async fn health_is_not_gated() {
        let (app, _dir) = app("198.51.100.7:40000", state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn mapped_ipv6_peer_is_evaluated_as_ipv4() {
        let (app, _dir) = app("[::ffff:210.128.54.70]:40000", state());
        let response = app
            .oneshot(Request::get("/index.html").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn forwarded_for_used_only_when_trusted() {
        let request = || {
            Request::get("/index.html")
                .header("x-forwarded-for", "210.128.54.70, 10.0.0.1")
                .body(Body::empty())
                .unwrap()
        };

        let (untrusted, _dir) = app("198.51.100.7:40000", state());
        let response = untrusted.oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let trusted_state = GateState {
            trust_forwarded_for: true,
            ..state()
        };
        let (trusted, _dir) = app("198.51.100.7:40000", trusted_state);
        let response = trusted.oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn country_header_passes_when_configured() {
        let state = GateState {
            policy: Arc::new(EdgePolicy::new(Vec::new(), vec!["JP".to_string()])),
            trust_forwarded_for: false,
        };
        let (app, _dir) = app("198.51.100.7:40000", state);
        let response = app
            .oneshot(
                Request::get("/index.html")
                    .header(VIEWER_COUNTRY_HEADER, "JP")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
