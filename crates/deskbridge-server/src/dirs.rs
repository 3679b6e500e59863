use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};

/// Default directory for daemon state (`lid_inhibit.state`): the
/// platform-specific app data dir (`~/.local/share/deskbridge/`, etc.).
///
/// `DESKBRIDGE_STATE_DIR` is resolved by `ServerConfig`, not here.
pub fn data_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "deskbridge")
        .context("could not determine platform data directory")?;
    Ok(dirs.data_dir().to_owned())
}

/// The user's download directory, falling back to `$HOME/Downloads`.
pub fn downloads_dir() -> Result<PathBuf> {
    if let Some(dir) = UserDirs::new().and_then(|u| u.download_dir().map(PathBuf::from)) {
        return Ok(dir);
    }
    let home = std::env::var_os("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join("Downloads"))
}

pub fn default_upload_dir() -> Result<PathBuf> {
    Ok(downloads_dir()?.join("phone_transfers"))
}

pub fn default_share_dir() -> Result<PathBuf> {
    Ok(downloads_dir()?.join("phone_share"))
}
