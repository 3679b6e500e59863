use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::warn;

use crate::notification::{truncate_chars, MAX_TEXT_CHARS, MAX_TITLE_CHARS};

/// App name shown on every desktop popup raised by the daemon.
pub const NOTIFIER_APP_NAME: &str = "Phone Sync";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopNotification {
    pub app_name: String,
    pub summary: String,
    pub body: String,
}

impl DesktopNotification {
    /// Summary is clipped to 200 code points, body to 500.
    pub fn new(summary: impl Into<String>, body: impl Into<String>) -> Self {
        let summary = summary.into();
        let body = body.into();
        Self {
            app_name: NOTIFIER_APP_NAME.to_owned(),
            summary: truncate_chars(&summary, MAX_TITLE_CHARS).to_owned(),
            body: truncate_chars(&body, MAX_TEXT_CHARS).to_owned(),
        }
    }
}

/// Best-effort desktop notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &DesktopNotification) -> Result<()>;
}

/// Shells out to `notify-send`. A missing binary is logged, not an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifySend;

#[async_trait]
impl Notifier for NotifySend {
    async fn notify(&self, notification: &DesktopNotification) -> Result<()> {
        let Ok(program) = which::which("notify-send") else {
            warn!("notify-send not found; skipping desktop popup");
            return Ok(());
        };
        let status = Command::new(&program)
            .arg(format!("--app-name={}", notification.app_name))
            .arg(&notification.summary)
            .arg(&notification.body)
            .status()
            .await
            .context("spawn notify-send")?;
        ensure!(status.success(), "notify-send exited with {status}");
        Ok(())
    }
}
