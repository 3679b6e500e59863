#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use deskbridge_server::{
    build_router,
    lid::{LidInhibit, STATE_FILE_NAME},
    routes::RouteTable,
    serve,
    system::{
        DesktopNotification, LidSwitchMode, Notifier, StatsSource, SystemControl, SystemStats,
    },
    AppState, ServerConfig,
};
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

// ── Collaborator doubles ──────────────────────────────────────────────────────

pub const STUB_STATS: SystemStats = SystemStats {
    cpu_usage: 12.5,
    ram_usage: 43.0,
    cpu_temp: 51.0,
    battery_percent: 87.0,
    is_plugged: true,
};

pub struct StubStats;

#[async_trait]
impl StatsSource for StubStats {
    async fn snapshot(&self) -> SystemStats {
        STUB_STATS
    }
}

/// Answers only after `delay`, to keep a request in flight.
pub struct SlowStats(pub Duration);

#[async_trait]
impl StatsSource for SlowStats {
    async fn snapshot(&self) -> SystemStats {
        tokio::time::sleep(self.0).await;
        STUB_STATS
    }
}

#[derive(Default)]
pub struct StubControl {
    pub fail: AtomicBool,
    pub suspends: AtomicUsize,
    pub lid_modes: Mutex<Vec<LidSwitchMode>>,
}

impl StubControl {
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn lid_modes(&self) -> Vec<LidSwitchMode> {
        self.lid_modes.lock().unwrap().clone()
    }
}

#[async_trait]
impl SystemControl for StubControl {
    async fn suspend(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("systemctl: access denied");
        }
        self.suspends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_lid_switch(&self, mode: LidSwitchMode) -> Result<()> {
        self.lid_modes.lock().unwrap().push(mode);
        if self.fail.load(Ordering::SeqCst) {
            bail!("loginctl: access denied");
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<DesktopNotification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<DesktopNotification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &DesktopNotification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// ── Test server ───────────────────────────────────────────────────────────────

pub struct AppOptions {
    /// Serve downloads from the upload directory.
    pub same_dir: bool,
    pub stats: Arc<dyn StatsSource>,
    pub control: Arc<StubControl>,
    pub cors_origins: Option<String>,
    pub shutdown_grace: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            same_dir: false,
            stats: Arc::new(StubStats),
            control: Arc::new(StubControl::default()),
            cors_origins: None,
            shutdown_grace: Duration::from_secs(1),
        }
    }
}

pub struct TestApp {
    pub base: String,
    pub client: reqwest::Client,
    pub upload_dir: PathBuf,
    pub share_dir: PathBuf,
    pub state_file: PathBuf,
    pub control: Arc<StubControl>,
    pub notifier: Arc<RecordingNotifier>,
    shutdown: Option<oneshot::Sender<()>>,
    pub server: JoinHandle<Result<()>>,
    _tmp: TempDir,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub fn trigger_shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(AppOptions::default()).await
}

/// Real router on an OS-assigned port, stub collaborators, scratch dirs.
pub async fn spawn_app_with(opts: AppOptions) -> TestApp {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    let upload_dir = root.join("uploads");
    let share_dir = if opts.same_dir {
        upload_dir.clone()
    } else {
        root.join("share")
    };
    let state_file = root.join("state").join(STATE_FILE_NAME);
    std::fs::create_dir_all(&upload_dir).unwrap();
    std::fs::create_dir_all(&share_dir).unwrap();

    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState {
        routes: Arc::new(RouteTable::standard()),
        stats: opts.stats,
        control: opts.control.clone(),
        notifier: notifier.clone(),
        lid: LidInhibit::new(&state_file),
        upload_dir: upload_dir.clone(),
        share_dir: share_dir.clone(),
    };
    let cfg = ServerConfig {
        cors_origins: opts.cors_origins,
        max_upload_bytes: 16 * 1024 * 1024,
        shutdown_grace: opts.shutdown_grace,
        ..ServerConfig::default()
    };
    let app = build_router(state, &cfg);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve(
        listener,
        app,
        async move {
            let _ = rx.await;
        },
        cfg.shutdown_grace,
    ));

    TestApp {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        upload_dir,
        share_dir,
        state_file,
        control: opts.control,
        notifier,
        shutdown: Some(tx),
        server,
        _tmp: tmp,
    }
}
