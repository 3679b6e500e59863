pub mod dirs;
pub mod error;
pub mod handlers;
pub mod lid;
pub mod notification;
pub mod routes;
pub mod sanitize;
pub mod server;
pub mod system;

use std::{path::PathBuf, sync::Arc};

/// Shared application state threaded through the dispatcher and handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<routes::RouteTable>,
    pub stats: Arc<dyn system::StatsSource>,
    pub control: Arc<dyn system::SystemControl>,
    pub notifier: Arc<dyn system::Notifier>,
    pub lid: lid::LidInhibit,
    /// Absolute; files from the phone land here.
    pub upload_dir: PathBuf,
    /// Absolute; files staged for the phone.
    pub share_dir: PathBuf,
}

pub use server::{build_router, run, serve, ServerConfig};
