use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use super::run_command;

/// What logind does when the lid closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LidSwitchMode {
    Suspend,
    External,
}

impl LidSwitchMode {
    /// Inhibiting lid sleep means treating the lid like an external display.
    pub fn for_inhibit(enabled: bool) -> Self {
        if enabled {
            Self::External
        } else {
            Self::Suspend
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Suspend => "suspend",
            Self::External => "external",
        }
    }
}

#[async_trait]
pub trait SystemControl: Send + Sync {
    async fn suspend(&self) -> Result<()>;
    async fn set_lid_switch(&self, mode: LidSwitchMode) -> Result<()>;
}

/// Drives systemd through `systemctl` and `loginctl`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemdControl;

#[async_trait]
impl SystemControl for SystemdControl {
    async fn suspend(&self) -> Result<()> {
        run_command("systemctl", &["suspend"]).await
    }

    async fn set_lid_switch(&self, mode: LidSwitchMode) -> Result<()> {
        run_command("loginctl", &["set-handle-lid-switch", mode.as_str()]).await?;
        info!(mode = mode.as_str(), "lid switch handling set");
        Ok(())
    }
}
