use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{extract::DefaultBodyLimit, http::HeaderValue, Router};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    lid::{LidInhibit, STATE_FILE_NAME},
    routes::{dispatch, RouteTable},
    system::{HostStats, NotifySend, SystemdControl},
    AppState,
};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Defaults to `<Downloads>/phone_transfers`.
    pub upload_dir: Option<PathBuf>,
    /// Defaults to `<Downloads>/phone_share`.
    pub share_dir: Option<PathBuf>,
    /// Holds the lid state file. Defaults to the platform data dir.
    pub state_dir: Option<PathBuf>,
    /// Comma-separated allowed origins; any origin when unset.
    pub cors_origins: Option<String>,
    pub max_upload_bytes: usize,
    /// How long in-flight requests may run after a shutdown signal.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("DESKBRIDGE_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("DESKBRIDGE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8081),
            upload_dir: std::env::var("DESKBRIDGE_UPLOAD_DIR").ok().map(PathBuf::from),
            share_dir: std::env::var("DESKBRIDGE_SHARE_DIR").ok().map(PathBuf::from),
            state_dir: std::env::var("DESKBRIDGE_STATE_DIR").ok().map(PathBuf::from),
            cors_origins: std::env::var("DESKBRIDGE_CORS_ORIGINS").ok(),
            max_upload_bytes: std::env::var("DESKBRIDGE_MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            shutdown_grace: std::env::var("DESKBRIDGE_SHUTDOWN_GRACE")
                .ok()
                .and_then(|v| humantime::parse_duration(&v).ok())
                .unwrap_or(Duration::from_secs(5)),
        }
    }
}

/// Create `dir` if needed and return its absolute form.
fn prepare_dir(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    dir.canonicalize()
        .with_context(|| format!("resolve {}", dir.display()))
}

/// Everything goes through the route table; axum only supplies the fallback.
pub fn build_router(state: AppState, cfg: &ServerConfig) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(state)
        .layer(DefaultBodyLimit::max(cfg.max_upload_bytes))
        .layer(build_cors(cfg.cors_origins.as_deref()))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let upload_dir = match &cfg.upload_dir {
        Some(d) => d.clone(),
        None => crate::dirs::default_upload_dir()?,
    };
    let share_dir = match &cfg.share_dir {
        Some(d) => d.clone(),
        None => crate::dirs::default_share_dir()?,
    };
    let state_dir = match &cfg.state_dir {
        Some(d) => d.clone(),
        None => crate::dirs::data_dir()?,
    };
    let upload_dir = prepare_dir(&upload_dir)?;
    let share_dir = prepare_dir(&share_dir)?;
    let state_dir = prepare_dir(&state_dir)?;

    info!(
        upload_dir = %upload_dir.display(),
        share_dir = %share_dir.display(),
        state_dir = %state_dir.display(),
        "using directories"
    );

    let control = Arc::new(SystemdControl);
    let lid = LidInhibit::new(state_dir.join(STATE_FILE_NAME));
    lid.restore(control.as_ref()).await;

    let state = AppState {
        routes: Arc::new(RouteTable::standard()),
        stats: Arc::new(HostStats::new()),
        control,
        notifier: Arc::new(NotifySend),
        lid,
        upload_dir,
        share_dir,
    };

    let app = build_router(state, &cfg);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "deskbridge listening");
    let listener = TcpListener::bind(addr).await.context("bind listener")?;

    serve(listener, app, shutdown_signal(), cfg.shutdown_grace).await
}

/// Serve `app` until `shutdown` resolves, then give in-flight requests at
/// most `grace` to finish.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F, grace: Duration) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let shutdown = async move {
        shutdown.await;
        let _ = signalled_tx.send(());
    };

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .into_future();

    let deadline = async move {
        match signalled_rx.await {
            Ok(()) => tokio::time::sleep(grace).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        result = server => {
            result.context("server error")?;
            info!("server stopped");
            Ok(())
        }
        () = deadline => {
            warn!(grace = %humantime::format_duration(grace), "grace period elapsed; dropping open connections");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "could not listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(Any);

    match origins {
        Some(o) => cors.allow_origin(parse_origins(o)),
        None => cors.allow_origin(Any),
    }
}

/// Comma-separated origins; unparsable entries are logged and skipped.
fn parse_origins(list: &str) -> Vec<HeaderValue> {
    let origins: Vec<HeaderValue> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<HeaderValue>() {
            Ok(origin) => Some(origin),
            Err(e) => {
                warn!(origin = %s.escape_debug(), error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        warn!("no valid CORS origins configured; cross-origin requests will be refused");
    }
    origins
}
