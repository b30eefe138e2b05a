//! Main axum router and HTTP request handlers for the static server.
//!
//! Routes:
//! - `GET /healthz`  - Health check
//! - `GET /metrics`  - Prometheus metrics
//! - fallback        - Session-gated tenant content, resolved from the
//!                     Host header against the local mirror; the operator
//!                     host gets the landing page instead.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, instrument, warn};

use super::content_type::resolve_content_type;
use super::resolve;
use crate::metrics::{RequestLabels, RequestOutcome};
use crate::AppState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`] with all HTTP routes and shared state.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Tenant content: everything not claimed by another route.
        .fallback(serve_content)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_session,
        ))
        // Health and metrics sit outside the session gate.
        .route("/healthz", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Session gate middleware
// ---------------------------------------------------------------------------

/// Redirect requests without an authenticated session to the login path on
/// the identity layer. The operator landing page is exempt.
async fn require_session(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let host = resolve::normalize_host(request_host(&req)).to_string();
    let path = resolve::normalize_path(req.uri().path());

    if is_operator_landing(&state, &host, &path) {
        return next.run(req).await;
    }

    let gate = state.sessions.get(&host).await;
    if gate.is_authenticated(req.headers()) {
        // The profile is opaque; only its presence is interesting here.
        debug!(%host, has_profile = gate.profile(req.headers()).is_some(), "session accepted");
        next.run(req).await
    } else {
        debug!(%host, "unauthenticated request, redirecting to login");
        Redirect::to(&state.config.auth.login_path).into_response()
    }
}

/// Host the client addressed, from the Host header (HTTP/1.1) or the
/// request target (HTTP/2 `:authority`).
fn request_host(req: &Request) -> &str {
    req.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host())
        .unwrap_or_default()
}

fn is_operator_landing(state: &AppState, host: &str, path: &str) -> bool {
    host == resolve::normalize_host(&state.config.operator_host) && path == "/index.html"
}

// ---------------------------------------------------------------------------
// Content handler
// ---------------------------------------------------------------------------

/// Resolve the Host header and URL path against the local mirror and stream
/// the matching file.
#[instrument(skip_all, fields(host = tracing::field::Empty, path = tracing::field::Empty))]
async fn serve_content(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let host = resolve::normalize_host(request_host(&req)).to_string();
    let path = resolve::normalize_path(req.uri().path());
    tracing::Span::current().record("host", host.as_str());
    tracing::Span::current().record("path", path.as_str());

    if is_operator_landing(&state, &host, &path) {
        state
            .metrics
            .metrics
            .requests_total
            .get_or_create(&RequestLabels {
                outcome: RequestOutcome::Landing,
            })
            .inc();
        return landing_page(&state);
    }

    if !resolve::is_safe_path(&path) {
        warn!("rejected unsafe request path");
        return not_found(&state);
    }

    let file_path = resolve::tenant_file_path(&state.site_dir, &host, &path);
    match stream_file(&file_path).await {
        Ok((body, content_type, len)) => {
            state
                .metrics
                .metrics
                .requests_total
                .get_or_create(&RequestLabels {
                    outcome: RequestOutcome::Hit,
                })
                .inc();
            state.metrics.metrics.bytes_served_total.inc_by(len);
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => {
            // Expected in normal operation; not an error-level event.
            debug!(error = %e, "file not resolvable");
            not_found(&state)
        }
    }
}

/// Open a mirror file and prepare a streamed response body. The leading
/// bytes are read once for content-type sniffing, then the file is rewound
/// and handed to a backpressure-aware stream.
async fn stream_file(path: &Path) -> anyhow::Result<(Body, String, u64)> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("open {}", path.display()))?;
    let meta = file.metadata().await.context("stat open file")?;
    if meta.is_dir() {
        anyhow::bail!("{} is a directory", path.display());
    }

    let mut head = [0u8; 512];
    let n = file.read(&mut head).await.context("read sniff window")?;
    file.seek(std::io::SeekFrom::Start(0))
        .await
        .context("rewind after sniff")?;

    let content_type = resolve_content_type(path, &head[..n]);
    let body = Body::from_stream(ReaderStream::new(file));
    Ok((body, content_type, meta.len()))
}

// ---------------------------------------------------------------------------
// Rendered pages
// ---------------------------------------------------------------------------

/// Operator landing page: links to every tenant known to the mirror.
/// Rendered per request, so caching is explicitly disabled.
fn landing_page(state: &AppState) -> Response {
    let scheme = state.config.http_scheme();
    let items: String = state
        .tags
        .tenants()
        .iter()
        .map(|tenant| format!("    <li><a href=\"{scheme}://{tenant}/\">{tenant}</a></li>\n"))
        .collect();

    let html = format!(
        "<!doctype html>\n<html>\n<head><title>sitemirror</title></head>\n<body>\n\
         <h1>Hosted sites</h1>\n<ul>\n{items}</ul>\n</body>\n</html>\n"
    );

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        html,
    )
        .into_response()
}

const NOT_FOUND_PAGE: &str = "<!doctype html>\n<html>\n<head><title>Not Found</title></head>\n\
<body>\n<h1>404</h1>\n<p>The requested page does not exist.</p>\n</body>\n</html>\n";

fn not_found(state: &AppState) -> Response {
    state
        .metrics
        .metrics
        .requests_total
        .get_or_create(&RequestLabels {
            outcome: RequestOutcome::Miss,
        })
        .inc();
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        NOT_FOUND_PAGE,
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Health and metrics
// ---------------------------------------------------------------------------

/// `GET /healthz`
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = crate::health::run_checks(&state.site_dir, state.store.as_deref()).await;
    (crate::health::http_status(report.status), axum::Json(report))
}

/// `GET /metrics`
///
/// Returns Prometheus metrics collected by the server.
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let mut buf = String::new();
    prometheus_client::encoding::text::encode(&mut buf, &state.metrics.registry)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("metrics encoding failed: {e}")))?;

    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buf,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Application-level error type that maps cleanly to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// An unexpected internal error.
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Internal(err) => {
                error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Internal server error: {err:#}"),
                )
                    .into_response()
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::auth::registry::SessionRegistry;
    use crate::auth::CookieSessionGate;
    use crate::config::{AuthConfig, Config, ServerConfig, SyncConfig};
    use crate::metrics::MetricsRegistry;
    use crate::sync::tags::TagStore;

    fn test_state(site: &Path) -> Arc<AppState> {
        let config = Config {
            server: ServerConfig {
                listen: "127.0.0.1:0".to_string(),
                tls: false,
            },
            operator_host: "sites.example.com".to_string(),
            site_dir: site.display().to_string(),
            auth: AuthConfig::default(),
            sync: SyncConfig {
                enabled: false,
                bucket: String::new(),
                region: "eu-north-1".to_string(),
                interval_secs: 300,
            },
        };
        let cookie = config.auth.session_cookie.clone();
        Arc::new(AppState {
            config: Arc::new(config),
            site_dir: PathBuf::from(site),
            tags: TagStore::new(site),
            sessions: SessionRegistry::new(move |_host| {
                Arc::new(CookieSessionGate::new(cookie.clone()))
            }),
            store: None,
            metrics: MetricsRegistry::new(),
        })
    }

    fn request(host: &str, path: &str, authenticated: bool) -> Request {
        let mut builder = Request::builder().uri(path).header(header::HOST, host);
        if authenticated {
            builder = builder.header(header::COOKIE, "auth-session=tok123");
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn unauthenticated_request_is_redirected_to_login() {
        let site = tempfile::tempdir().unwrap();
        let app = create_router(test_state(site.path()));

        let response = app
            .oneshot(request("tenant1.example", "/index.html", false))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/auth/login"
        );
    }

    #[tokio::test]
    async fn root_serves_tenant_default_document() {
        let site = tempfile::tempdir().unwrap();
        let tenant_dir = site.path().join("tenant1.example");
        std::fs::create_dir_all(&tenant_dir).unwrap();
        std::fs::write(tenant_dir.join("index.html"), "<h1>tenant one</h1>").unwrap();

        let app = create_router(test_state(site.path()));
        let response = app
            .oneshot(request("tenant1.example:443", "/", true))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );
        assert_eq!(body_text(response).await, "<h1>tenant one</h1>");
    }

    #[tokio::test]
    async fn stylesheet_gets_refined_content_type() {
        let site = tempfile::tempdir().unwrap();
        let tenant_dir = site.path().join("tenant1.example/assets");
        std::fs::create_dir_all(&tenant_dir).unwrap();
        std::fs::write(tenant_dir.join("style.css"), "body { margin: 0; }").unwrap();

        let app = create_router(test_state(site.path()));
        let response = app
            .oneshot(request("tenant1.example", "/assets/style.css", true))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/css; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn missing_file_yields_not_found_page() {
        let site = tempfile::tempdir().unwrap();
        let app = create_router(test_state(site.path()));

        let response = app
            .oneshot(request("tenant1.example", "/missing.html", true))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("404"));
    }

    #[tokio::test]
    async fn traversal_path_yields_not_found() {
        let site = tempfile::tempdir().unwrap();
        std::fs::write(site.path().join("secret.txt"), "top secret").unwrap();

        let app = create_router(test_state(site.path()));
        let response = app
            .oneshot(request("tenant1.example", "/../secret.txt", true))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn operator_landing_lists_tenants_without_a_session() {
        let site = tempfile::tempdir().unwrap();
        let tags = TagStore::new(site.path());
        tags.write("tenant1.example.zip", "e1").unwrap();
        tags.write("tenant2.example.zip", "e2").unwrap();

        let app = create_router(test_state(site.path()));
        let response = app
            .oneshot(request("sites.example.com", "/", false))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-cache"
        );
        let body = body_text(response).await;
        assert!(body.contains("http://tenant1.example/"));
        assert!(body.contains("http://tenant2.example/"));
    }

    #[tokio::test]
    async fn operator_host_still_serves_tenant_files_elsewhere() {
        let site = tempfile::tempdir().unwrap();
        let tenant_dir = site.path().join("sites.example.com");
        std::fs::create_dir_all(&tenant_dir).unwrap();
        std::fs::write(tenant_dir.join("about.html"), "about").unwrap();

        let app = create_router(test_state(site.path()));
        let response = app
            .oneshot(request("sites.example.com", "/about.html", true))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "about");
    }

    #[tokio::test]
    async fn health_and_metrics_bypass_the_session_gate() {
        let site = tempfile::tempdir().unwrap();
        let app = create_router(test_state(site.path()));

        let health = app
            .clone()
            .oneshot(request("tenant1.example", "/healthz", false))
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let metrics = app
            .oneshot(request("tenant1.example", "/metrics", false))
            .await
            .unwrap();
        assert_eq!(metrics.status(), StatusCode::OK);
    }
}
