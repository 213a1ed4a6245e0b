//! HTTP front end of the signal store
//!
//! Pages inside fenced frames cannot talk to the embedder, but they can
//! fetch. They report values with `GET /key-value-store?key=K&value=V` (or a
//! POST with the value as body); the orchestrator polls
//! `GET /key-value-store?key=K` until the value shows up.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use fenced_harness_common::Token;
use serde::Deserialize;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::{RelayError, RelayResult};
use crate::store::SignalStore;

/// Path of the key-value endpoint
pub const STORE_PATH: &str = "/key-value-store";

/// Body returned while no value is available
pub const NOT_SET: &str = "<Not set>";

/// Relay server configuration
#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    /// Unread values and tombstones older than this are dropped
    pub value_ttl: Duration,

    /// How often expired slots are swept
    pub sweep_interval: Duration,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            value_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StoreQuery {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeyQuery {
    key: String,
}

/// Build the relay router over `store`
pub fn router(store: SignalStore) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(STORE_PATH, get(store_get_handler).post(store_post_handler))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

/// A bound relay server
pub struct RelayServer {
    listener: TcpListener,
    store: SignalStore,
    config: RelayServerConfig,
}

impl RelayServer {
    pub async fn bind(
        addr: SocketAddr,
        store: SignalStore,
        config: RelayServerConfig,
    ) -> RelayResult<Self> {
        if config.sweep_interval.is_zero() {
            return Err(RelayError::InvalidConfig(
                "sweep interval must be greater than zero".to_string(),
            ));
        }
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            store,
            config,
        })
    }

    pub fn local_addr(&self) -> RelayResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn store(&self) -> &SignalStore {
        &self.store
    }

    /// Serve until the process exits
    pub async fn run(self) -> RelayResult<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` completes
    pub async fn run_until<F>(self, shutdown: F) -> RelayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        info!("Signal relay listening on http://{}", addr);

        let sweeper = self
            .store
            .spawn_sweeper(self.config.value_ttl, self.config.sweep_interval)?;
        let result = axum::serve(self.listener, router(self.store))
            .with_graceful_shutdown(shutdown)
            .await;
        sweeper.abort();

        info!("Signal relay stopped");
        result.map_err(RelayError::from)
    }
}

/// Bind and serve a fresh store on `addr` until ctrl-c or SIGTERM
pub async fn serve(addr: SocketAddr, config: RelayServerConfig) -> anyhow::Result<()> {
    let server = RelayServer::bind(addr, SignalStore::new(), config).await?;
    let shutdown = shutdown_signal()?;
    server.run_until(shutdown).await?;
    Ok(())
}

/// Completes on ctrl-c, or on SIGTERM where available.
///
/// The SIGTERM handler is installed before this returns, so a signal that
/// arrives while the server starts is not lost.
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()> + Send + 'static> {
    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    Ok(async move {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
    })
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler(State(store): State<SignalStore>) -> impl IntoResponse {
    let stats = store.stats();
    Json(serde_json::json!({
        "status": "ok",
        "service": "fenced-relay",
        "ready": stats.ready,
        "waiting": stats.waiting,
        "delivered": stats.delivered,
    }))
}

async fn store_get_handler(
    State(store): State<SignalStore>,
    Query(query): Query<StoreQuery>,
) -> Response {
    let token = Token::from_string(query.key);
    match query.value {
        Some(value) => publish_response(&store, &token, value),
        None => take_response(&store, &token),
    }
}

async fn store_post_handler(
    State(store): State<SignalStore>,
    Query(query): Query<KeyQuery>,
    body: String,
) -> Response {
    let token = Token::from_string(query.key);
    publish_response(&store, &token, body)
}

fn publish_response(store: &SignalStore, token: &Token, value: String) -> Response {
    match store.publish(token, value) {
        Ok(()) => (StatusCode::OK, "ok").into_response(),
        Err(e @ RelayError::AlreadyPublished(_)) => {
            warn!("Rejected second value: {}", e);
            (StatusCode::CONFLICT, e.to_string()).into_response()
        }
        Err(e) => {
            error!("Publish failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

fn take_response(store: &SignalStore, token: &Token) -> Response {
    match store.try_take(token) {
        Ok(Some(value)) => (StatusCode::OK, value).into_response(),
        Ok(None) => (StatusCode::OK, NOT_SET).into_response(),
        Err(e @ RelayError::AlreadyDelivered(_)) => (StatusCode::GONE, e.to_string()).into_response(),
        Err(e) => {
            error!("Read failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    async fn call(app: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, String) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_read_before_write_is_not_set() {
        let app = router(SignalStore::new());
        let (status, body) = call(&app, Method::GET, "/key-value-store?key=abc", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, NOT_SET);
    }

    #[tokio::test]
    async fn test_write_then_read_once() {
        let app = router(SignalStore::new());

        let (status, _) = call(&app, Method::GET, "/key-value-store?key=abc&value=loaded", "").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, Method::GET, "/key-value-store?key=abc", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "loaded");

        let (status, _) = call(&app, Method::GET, "/key-value-store?key=abc", "").await;
        assert_eq!(status, StatusCode::GONE);
    }

    #[tokio::test]
    async fn test_post_body_and_conflict() {
        let store = SignalStore::new();
        let app = router(store.clone());

        let (status, _) = call(
            &app,
            Method::POST,
            "/key-value-store?key=err",
            "TypeError: Failed to fetch",
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, Method::POST, "/key-value-store?key=err", "again").await;
        assert_eq!(status, StatusCode::CONFLICT);

        assert_eq!(
            store.try_take(&Token::from_string("err")).unwrap().as_deref(),
            Some("TypeError: Failed to fetch")
        );
    }

    #[tokio::test]
    async fn test_empty_value_is_a_value() {
        let app = router(SignalStore::new());
        call(&app, Method::GET, "/key-value-store?key=body&value=", "").await;
        let (_, body) = call(&app, Method::GET, "/key-value-store?key=body", "").await;
        assert_eq!(body, "");
    }

    #[tokio::test]
    async fn test_missing_key_rejected() {
        let app = router(SignalStore::new());
        let (status, _) = call(&app, Method::GET, "/key-value-store", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bind_rejects_zero_sweep_interval() {
        let config = RelayServerConfig {
            sweep_interval: Duration::ZERO,
            ..Default::default()
        };
        let result = RelayServer::bind("127.0.0.1:0".parse().unwrap(), SignalStore::new(), config).await;
        assert!(matches!(result, Err(RelayError::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sweeps_expired_values() {
        let store = SignalStore::new();
        let server = RelayServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            store.clone(),
            RelayServerConfig {
                value_ttl: Duration::from_secs(60),
                sweep_interval: Duration::from_secs(10),
            },
        )
        .await
        .unwrap();
        let task = tokio::spawn(server.run());

        store.publish(&Token::from_string("late"), "loaded").unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(store.is_empty());
        task.abort();
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(SignalStore::new());
        let (status, body) = call(&app, Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("fenced-relay"));
    }
}
