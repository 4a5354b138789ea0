//! HTTP host for the evaluation service.
//!
//! `POST /eval` evaluates the request body and returns the encoded result,
//! `POST /il` returns a plain-text disassembly and `GET /health` reports
//! liveness. Evaluations run on the blocking pool; interpreter values never
//! leave the worker, only encoded bytes do.

pub mod completion;
pub mod error;

pub use error::{Result, ServerError};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::eval::{DisassemblyEngine, EngineConfig, ScriptEngine};
use crate::guard::{guards_path, GuardConfig, LifecycleGuard, ProcessExit, Terminate};

use self::completion::NotifyOnComplete;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Environment {
    Production,
    Development,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    /// How long a guarded request may run before the process is ended.
    pub request_timeout: Duration,
    /// How long a finished response may take to drain.
    pub drain_grace: Duration,
    pub max_body_size: usize,
    pub enable_logging: bool,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let guard = GuardConfig::default();
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            environment: Environment::Development,
            request_timeout: guard.request_timeout,
            drain_grace: guard.drain_grace,
            max_body_size: 1024 * 1024,
            enable_logging: true,
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Parse and set the bind address from a string.
    pub fn with_bind_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| ServerError::config_error(format!("Invalid bind address '{}': {}", addr, e)))?;
        Ok(self)
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            request_timeout: self.request_timeout,
            drain_grace: self.drain_grace,
        }
    }

    /// Requests to `path` arm the lifecycle guard.
    pub fn is_guarded(&self, path: &str) -> bool {
        self.environment == Environment::Production && guards_path(path)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ScriptEngine>,
    pub disassembler: DisassemblyEngine,
    pub guard: LifecycleGuard,
    pub config: ServerConfig,
}

/// Request bodies are decoded leniently; invalid UTF-8 becomes U+FFFD and
/// still produces an in-band result.
fn body_text(body: &Bytes) -> String {
    String::from_utf8_lossy(body).into_owned()
}

async fn eval_handler(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let engine = Arc::clone(&state.engine);
    let source = body_text(&body);
    let bytes = tokio::task::spawn_blocking(move || engine.evaluate_to_json(&source)).await?;
    Ok(([(CONTENT_TYPE, "application/json; charset=utf-8")], bytes).into_response())
}

async fn il_handler(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let disassembler = state.disassembler;
    let fragment = body_text(&body);
    let text = tokio::task::spawn_blocking(move || disassembler.disassemble(&fragment).render()).await?;
    Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response())
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Arms the guard for watched requests and reports when their response body
/// has been fully sent or abandoned.
async fn lifecycle_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.config.is_guarded(request.uri().path()) {
        return next.run(request).await;
    }
    state.guard.arm();
    let response = next.run(request).await;
    let guard = state.guard.clone();
    let (parts, body) = response.into_parts();
    let body = Body::from_stream(NotifyOnComplete::new(body.into_data_stream(), move || {
        guard.response_completed()
    }));
    Response::from_parts(parts, body)
}

async fn logging_middleware(request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();
    log::info!("Request {} {} {}", request_id, method, uri);

    let start = std::time::Instant::now();
    let response = next.run(request).await;
    log::info!("Response {} completed in {:?}", request_id, start.elapsed());
    response
}

pub struct EvalServer {
    config: ServerConfig,
    terminator: Arc<dyn Terminate>,
}

impl EvalServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            terminator: Arc::new(ProcessExit),
        }
    }

    /// Replace what happens when the lifecycle guard fires.
    pub fn with_terminator(mut self, terminator: Arc<dyn Terminate>) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Builds the router together with the guard it drives.
    pub fn build(&self) -> (Router, LifecycleGuard) {
        let guard = LifecycleGuard::new(self.config.guard_config(), Arc::clone(&self.terminator));
        let state = AppState {
            engine: Arc::new(ScriptEngine::new(self.config.engine)),
            disassembler: DisassemblyEngine,
            guard: guard.clone(),
            config: self.config.clone(),
        };

        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/eval", post(eval_handler))
            .route("/il", post(il_handler))
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .layer(middleware::from_fn_with_state(state.clone(), lifecycle_middleware))
            .with_state(state);

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(logging_middleware));
        }
        (router.layer(TraceLayer::new_for_http()), guard)
    }

    pub fn build_router(&self) -> Router {
        self.build().0
    }

    /// Serve until `shutdown_signal` resolves.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr).await.map_err(|e| {
            ServerError::config_error(format!("Failed to bind to {}: {}", self.config.bind_addr, e))
        })?;

        log::info!(
            "cseval listening on {} ({:?})",
            self.config.bind_addr,
            self.config.environment
        );
        log::info!("Health check: http://{}/health", self.config.bind_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("cseval shut down gracefully");
        Ok(())
    }
}

impl Default for EvalServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
