//! HTTP server assembly: routes, middleware stack, and process entry.

use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router, middleware};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::{AppConfig, ServerConfig};
use crate::error::Result;
use crate::rate_limit::{self, RateLimiter};
use crate::store::{LibSqlBackend, TodoStore};
use crate::todos::model::ErrorResponse;
use crate::todos::routes::todo_routes;
use crate::todos::service::TodoService;

/// Prefix under which the todo routes are mounted.
pub const API_PREFIX: &str = "/api/v1";

/// Build the full application router.
///
/// `limiter` is `None` when rate limiting is disabled.
pub fn build_app(
    config: &ServerConfig,
    service: TodoService,
    limiter: Option<Arc<RateLimiter>>,
) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .nest(API_PREFIX, todo_routes(service));

    if let Some(limiter) = limiter {
        app = app.layer(middleware::from_fn_with_state(
            limiter,
            rate_limit::rate_limit,
        ));
    }

    app = app.layer(cors_layer(config));

    if config.enable_logger {
        app = app.layer(TraceLayer::new_for_http());
    }

    app.layer(CatchPanicLayer::custom(handle_panic))
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "message": "API is running"
    }))
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::CONTENT_LENGTH,
            header::ACCEPT_ENCODING,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::ORIGIN,
            header::CACHE_CONTROL,
            HeaderName::from_static("x-csrf-token"),
            HeaderName::from_static("x-requested-with"),
        ]);

    // Credentials cannot be combined with a wildcard origin.
    if config.allowed_origins.is_empty() {
        return layer.allow_origin(AnyOrigin);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(config.allow_credentials)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    error!(panic = %detail, "Panic recovered");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Internal server error".to_string(),
        }),
    )
        .into_response()
}

/// Serve `app` on `listener` until `shutdown` resolves.
///
/// Peer addresses are exposed to handlers through `ConnectInfo`.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutting down server");
}

/// Load configuration, wire store → service → router, and serve until shutdown.
pub async fn run() -> Result<()> {
    let config = AppConfig::from_env()?;

    let store: Arc<dyn TodoStore> = Arc::new(LibSqlBackend::open(&config.database).await?);
    info!(database = %config.database.url, "Database ready");

    let service = TodoService::new(store);

    let limiter = config.server.rate_limit.map(RateLimiter::new);
    if let Some(limiter) = &limiter {
        let _eviction_handle = rate_limit::spawn_eviction_task(Arc::clone(limiter));
        info!(
            max_requests = limiter.config().max_requests,
            window_secs = limiter.config().window.as_secs(),
            "Rate limiting enabled"
        );
    }

    let app = build_app(&config.server, service, limiter);

    let listener = TcpListener::bind(config.server.addr()).await?;
    let url = config.server.public_url();
    info!("Server starting on {url}");
    info!("Health check: {url}/health");
    info!("Todo API: {url}{API_PREFIX}/todos");

    serve(listener, app, shutdown_signal()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::config::RateLimitConfig;

    async fn service() -> TodoService {
        TodoService::new(Arc::new(LibSqlBackend::new_memory().await.unwrap()))
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_app(&ServerConfig::default(), service().await, None);
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["message"], "API is running");
    }

    #[tokio::test]
    async fn todos_are_mounted_under_api_prefix() {
        let app = build_app(&ServerConfig::default(), service().await, None);

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/api/v1/todos").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(Request::builder().uri("/todos").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cors_preflight_with_any_origin() {
        let app = build_app(&ServerConfig::default(), service().await, None);
        let resp = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/v1/todos")
                    .header(header::ORIGIN, "http://example.com")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }

    #[tokio::test]
    async fn cors_with_explicit_origins_allows_credentials() {
        let config = ServerConfig {
            allowed_origins: vec!["http://app.example".to_string()],
            ..ServerConfig::default()
        };
        let app = build_app(&config, service().await, None);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "http://app.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://app.example"
        );
        assert_eq!(
            resp.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );
    }

    #[tokio::test]
    async fn rate_limited_requests_get_429() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window: Duration::from_secs(60),
        });
        let app = build_app(&ServerConfig::default(), service().await, Some(limiter));
        let peer: SocketAddr = "10.0.0.1:5000".parse().unwrap();

        let request = || {
            let mut req = Request::builder().uri("/health").body(Body::empty()).unwrap();
            req.extensions_mut().insert(ConnectInfo(peer));
            req
        };

        let first = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(second).await;
        assert_eq!(body["error"], "Too Many Requests");
        assert!(body["retry_after"].as_u64().unwrap() <= 60);
    }

    #[test]
    fn panic_handler_returns_generic_500() {
        let resp = handle_panic(Box::new("boom"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
