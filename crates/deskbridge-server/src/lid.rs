//! The lid-sleep inhibit flag, mirrored to a small state file so it survives
//! daemon restarts.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::system::{LidSwitchMode, SystemControl};

pub const STATE_FILE_NAME: &str = "lid_inhibit.state";

const ENABLED: &str = "enabled";
const DISABLED: &str = "disabled";

#[derive(Clone)]
pub struct LidInhibit {
    enabled: Arc<RwLock<bool>>,
    path: Arc<PathBuf>,
}

impl LidInhibit {
    /// Starts disabled; call [`LidInhibit::restore`] to load the persisted value.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            enabled: Arc::new(RwLock::new(false)),
            path: Arc::new(path.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn is_enabled(&self) -> bool {
        *self.enabled.read().await
    }

    /// Set the flag, apply it to the OS and persist it. The write lock is held
    /// for the whole sequence so concurrent toggles are serialized.
    ///
    /// The new value is recorded and persisted even when applying it fails;
    /// the apply error is still returned to the caller.
    pub async fn toggle(&self, enabled: bool, control: &dyn SystemControl) -> Result<()> {
        let mut guard = self.enabled.write().await;
        *guard = enabled;

        let applied = control
            .set_lid_switch(LidSwitchMode::for_inhibit(enabled))
            .await;

        if let Err(e) = write_state(&self.path, enabled).await {
            warn!(error = %format!("{e:#}"), path = %self.path.display(), "could not persist lid state");
        }

        applied
    }

    /// Load the persisted value and re-apply it. Returns the restored value,
    /// or `None` when nothing usable was on disk.
    pub async fn restore(&self, control: &dyn SystemControl) -> Option<bool> {
        let enabled = match read_state(&self.path).await {
            Ok(Some(enabled)) => enabled,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "ignoring lid state file");
                return None;
            }
        };

        *self.enabled.write().await = enabled;
        match control
            .set_lid_switch(LidSwitchMode::for_inhibit(enabled))
            .await
        {
            Ok(()) => info!(enabled, "restored lid sleep inhibit"),
            Err(e) => warn!(error = %format!("{e:#}"), enabled, "could not re-apply lid state"),
        }
        Some(enabled)
    }
}

/// `Ok(None)` when the file does not exist.
pub async fn read_state(path: &Path) -> Result<Option<bool>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    match raw.trim() {
        ENABLED => Ok(Some(true)),
        DISABLED => Ok(Some(false)),
        other => bail!("unexpected lid state {other:?} in {}", path.display()),
    }
}

pub async fn write_state(path: &Path, enabled: bool) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let value = if enabled { ENABLED } else { DISABLED };
    tokio::fs::write(path, value)
        .await
        .with_context(|| format!("write {}", path.display()))
}
