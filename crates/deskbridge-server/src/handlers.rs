use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::Context;
use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{ConnectInfo, FromRequest, Multipart, Request},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{fs::File, io::AsyncWriteExt};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, info, warn};

use crate::{
    error::ApiError,
    notification::NotificationPayload,
    routes::Endpoint,
    sanitize::sanitize,
    system::{DesktopNotification, SystemStats},
    AppState,
};

/// Cap for JSON bodies; only uploads get the configured body limit.
pub const MAX_JSON_BODY_BYTES: usize = 64 * 1024;

/// Run the handler selected by the router. `tail` is the path remainder for
/// prefix routes and empty otherwise.
pub async fn call(endpoint: Endpoint, state: AppState, tail: String, request: Request) -> Response {
    let result = match endpoint {
        Endpoint::Stats => stats(state, request).await,
        Endpoint::Sleep => sleep(state).await,
        Endpoint::PhoneNotification => phone_notification(state, request).await,
        Endpoint::Upload => upload(state, request).await,
        Endpoint::ListFiles => list_files(state).await,
        Endpoint::Download => download(state, &tail, request).await,
        Endpoint::InhibitLidSleep => inhibit_lid_sleep(state, request).await,
    };
    result.unwrap_or_else(IntoResponse::into_response)
}

// ── Stats ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: SystemStats,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

async fn stats(state: AppState, request: Request) -> Result<Response, ApiError> {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        debug!(client = %addr, "stats requested");
    }
    let stats = state.stats.snapshot().await;
    Ok(Json(StatsResponse {
        stats,
        timestamp: unix_seconds(SystemTime::now()),
    })
    .into_response())
}

// ── Sleep ─────────────────────────────────────────────────────────────────────

async fn sleep(state: AppState) -> Result<Response, ApiError> {
    state
        .control
        .suspend()
        .await
        .map_err(|e| ApiError::internal("failed to suspend system", e))?;
    info!("suspend requested");
    Ok(Json(json!({"status": "success", "message": "Suspending system"})).into_response())
}

// ── Phone notifications ───────────────────────────────────────────────────────

async fn phone_notification(state: AppState, request: Request) -> Result<Response, ApiError> {
    let body = read_json_body(request).await?;

    let payload = if body.iter().all(u8::is_ascii_whitespace) {
        NotificationPayload::default()
    } else {
        serde_json::from_slice::<NotificationPayload>(&body)
            .map_err(|_| ApiError::bad_request("Invalid JSON payload"))?
    };
    let note = payload.validate()?;

    info!(
        app = %note.app_name,
        title = %note.title,
        text = %note.text,
        posted_at = ?payload.posted_at,
        "phone notification"
    );

    if let Err(e) = state.notifier.notify(&note.to_desktop()).await {
        warn!(error = %format!("{e:#}"), "desktop notification failed");
    }
    Ok(Json(json!({"status": "success"})).into_response())
}

// ── Upload ────────────────────────────────────────────────────────────────────

async fn upload(state: AppState, request: Request) -> Result<Response, ApiError> {
    let mut multipart = Multipart::from_request(request, &state)
        .await
        .map_err(|_| ApiError::bad_request("failed to parse multipart form"))?;

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(ApiError::bad_request("missing 'file' field")),
            Err(_) => return Err(ApiError::bad_request("failed to parse multipart form")),
        };
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_owned();
        let dest = sanitize(&state.upload_dir, &filename)
            .map_err(|_| ApiError::bad_request("invalid filename"))?;

        let mut file = File::create(&dest)
            .await
            .with_context(|| format!("create {}", dest.display()))
            .map_err(|e| ApiError::internal("could not create destination file", e))?;

        let mut written: u64 = 0;
        let copied: Result<(), ApiError> = async {
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|_| ApiError::bad_request("failed to read upload"))?
            {
                file.write_all(&chunk)
                    .await
                    .map_err(|e| ApiError::internal("failed to write file", e))?;
                written += chunk.len() as u64;
            }
            file.flush()
                .await
                .map_err(|e| ApiError::internal("failed to write file", e))
        }
        .await;

        if let Err(e) = copied {
            drop(file);
            if let Err(rm) = tokio::fs::remove_file(&dest).await {
                warn!(error = %rm, path = %dest.display(), "could not remove partial upload");
            }
            return Err(e);
        }

        info!(filename = %filename, path = %dest.display(), bytes = written, "file received");
        let popup = DesktopNotification::new("File received", filename.as_str());
        if let Err(e) = state.notifier.notify(&popup).await {
            warn!(error = %format!("{e:#}"), "desktop notification failed");
        }
        return Ok(Json(json!({"status": "success", "filename": filename})).into_response());
    }
}

// ── Shared files ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedFile {
    pub name: String,
    pub size: u64,
    /// Seconds since the Unix epoch.
    pub mod_time: f64,
}

async fn list_files(state: AppState) -> Result<Response, ApiError> {
    let files = read_share_dir(&state.share_dir)
        .await
        .map_err(|e| ApiError::internal("could not read share directory", e))?;
    info!(count = files.len(), "listed share files");
    Ok(Json(files).into_response())
}

/// Non-directory entries of `dir`, sorted by name.
pub async fn read_share_dir(dir: &Path) -> anyhow::Result<Vec<SharedFile>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("read {}", dir.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let meta = match entry.metadata().await {
            Ok(meta) => meta,
            Err(e) => {
                warn!(error = %e, entry = ?entry.file_name(), "skipping unreadable entry");
                continue;
            }
        };
        if meta.is_dir() {
            continue;
        }
        files.push(SharedFile {
            name: entry.file_name().to_string_lossy().into_owned(),
            size: meta.len(),
            mod_time: meta.modified().map(unix_seconds).unwrap_or(0.0),
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

async fn download(state: AppState, tail: &str, request: Request) -> Result<Response, ApiError> {
    let name = urlencoding::decode(tail).map_err(|_| ApiError::bad_request("invalid filename"))?;
    if name.is_empty() {
        return Err(ApiError::bad_request("missing filename"));
    }
    let path: PathBuf =
        sanitize(&state.share_dir, &name).map_err(|_| ApiError::bad_request("invalid filename"))?;

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(ApiError::not_found("file not found")),
    }

    info!(filename = %name, path = %path.display(), "serving file");
    match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => Ok(response.map(Body::new)),
        Err(never) => match never {},
    }
}

// ── Lid ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LidInhibitPayload {
    /// Absent or `null` means disabled.
    #[serde(default)]
    pub enabled: Option<bool>,
}

async fn inhibit_lid_sleep(state: AppState, request: Request) -> Result<Response, ApiError> {
    let body = read_json_body(request).await?;
    let payload: LidInhibitPayload =
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request("Invalid JSON payload"))?;
    let enabled = payload.enabled.unwrap_or_default();

    state
        .lid
        .toggle(enabled, state.control.as_ref())
        .await
        .map_err(|e| ApiError::internal("failed to apply lid switch handling", e))?;

    info!(enabled, "lid sleep inhibit updated");
    Ok(Json(json!({"status": "success", "enabled": enabled})).into_response())
}

async fn read_json_body(request: Request) -> Result<Bytes, ApiError> {
    to_bytes(request.into_body(), MAX_JSON_BODY_BYTES)
        .await
        .map_err(|_| ApiError::bad_request("Failed to read body"))
}

fn unix_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
