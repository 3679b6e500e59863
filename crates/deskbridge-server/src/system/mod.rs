//! OS collaborators behind narrow capability traits, so handlers can run
//! against test doubles.

mod control;
mod notifier;
mod stats;

pub use control::{LidSwitchMode, SystemControl, SystemdControl};
pub use notifier::{DesktopNotification, Notifier, NotifySend, NOTIFIER_APP_NAME};
pub use stats::{parse_upower_info, pick_temperature, HostStats, StatsSource, SystemStats};

use anyhow::{bail, Context, Result};
use tokio::process::Command;

/// Run `program` to completion, failing on a non-zero exit.
async fn run_command(program: &str, args: &[&str]) -> Result<()> {
    let status = Command::new(program)
        .args(args)
        .status()
        .await
        .with_context(|| format!("spawn {program}"))?;
    if !status.success() {
        bail!("{program} {} exited with {status}", args.join(" "));
    }
    Ok(())
}

/// Run `program` and capture its stdout.
async fn command_output(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("spawn {program}"))?;
    if !output.status.success() {
        bail!("{program} {} exited with {}", args.join(" "), output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
