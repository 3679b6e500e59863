use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use deskbridge_server::handlers::{SharedFile, StatsResponse};
use reqwest::{multipart, Client, Response};
use serde_json::{json, Value};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "deskbridge", about = "Phone to laptop bridge daemon and client", version)]
struct Cli {
    /// Daemon URL (default: http://localhost:8081 or $DESKBRIDGE_SERVER)
    #[arg(long, env = "DESKBRIDGE_SERVER", default_value = "http://localhost:8081")]
    server: String,

    /// Also write daily-rotated log files into this directory
    #[arg(long, env = "DESKBRIDGE_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge daemon
    Serve {
        /// Port to listen on
        #[arg(long, env = "DESKBRIDGE_PORT", default_value = "8081")]
        port: u16,
        /// Host to bind
        #[arg(long, env = "DESKBRIDGE_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Where phone uploads are written (default: ~/Downloads/phone_transfers)
        #[arg(long, env = "DESKBRIDGE_UPLOAD_DIR")]
        upload_dir: Option<PathBuf>,
        /// Files offered to the phone (default: ~/Downloads/phone_share)
        #[arg(long, env = "DESKBRIDGE_SHARE_DIR")]
        share_dir: Option<PathBuf>,
        /// Directory for the lid state file
        #[arg(long, env = "DESKBRIDGE_STATE_DIR")]
        state_dir: Option<PathBuf>,
        /// Comma-separated allowed CORS origins (default: any)
        #[arg(long, env = "DESKBRIDGE_CORS_ORIGINS")]
        cors_origins: Option<String>,
        /// Maximum request body size in bytes
        #[arg(long, env = "DESKBRIDGE_MAX_UPLOAD_BYTES")]
        max_upload_bytes: Option<usize>,
        /// Grace period for in-flight requests on shutdown, e.g. 5s
        #[arg(long, env = "DESKBRIDGE_SHUTDOWN_GRACE", value_parser = humantime::parse_duration)]
        shutdown_grace: Option<Duration>,
    },
    /// Show CPU, memory, temperature and battery
    Stats,
    /// Suspend the laptop
    Sleep,
    /// Raise a desktop notification as if it came from the phone
    Notify {
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        text: String,
        /// Source app package name
        #[arg(long)]
        app: Option<String>,
    },
    /// Upload a file to the laptop
    Push {
        file: PathBuf,
    },
    /// List files shared by the laptop
    Files,
    /// Download a shared file
    Pull {
        name: String,
        /// Destination path (default: the file's name in the current directory)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Keep the laptop awake with the lid closed
    Lid {
        #[arg(value_enum)]
        state: Toggle,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    let _guard = init_logging(cli.log_dir.as_deref(), default_level);

    let server = cli.server.trim_end_matches('/');
    match cli.command {
        Commands::Serve {
            port,
            host,
            upload_dir,
            share_dir,
            state_dir,
            cors_origins,
            max_upload_bytes,
            shutdown_grace,
        } => {
            let defaults = deskbridge_server::ServerConfig::default();
            let cfg = deskbridge_server::ServerConfig {
                host,
                port,
                upload_dir: upload_dir.or(defaults.upload_dir),
                share_dir: share_dir.or(defaults.share_dir),
                state_dir: state_dir.or(defaults.state_dir),
                cors_origins: cors_origins.or(defaults.cors_origins),
                max_upload_bytes: max_upload_bytes.unwrap_or(defaults.max_upload_bytes),
                shutdown_grace: shutdown_grace.unwrap_or(defaults.shutdown_grace),
            };
            deskbridge_server::run(cfg).await
        }
        Commands::Stats => cmd_stats(server).await,
        Commands::Sleep => cmd_sleep(server).await,
        Commands::Notify { title, text, app } => cmd_notify(server, &title, &text, app).await,
        Commands::Push { file } => cmd_push(server, &file).await,
        Commands::Files => cmd_files(server).await,
        Commands::Pull { name, output } => cmd_pull(server, &name, output).await,
        Commands::Lid { state } => cmd_lid(server, matches!(state, Toggle::On)).await,
    }
}

/// Stdout always; a daily-rolling file as well when `log_dir` is set. The
/// returned guard must live until exit so buffered lines are flushed.
fn init_logging(log_dir: Option<&Path>, default_level: &str) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_env("DESKBRIDGE_LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "deskbridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    guard
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_stats(server: &str) -> Result<()> {
    let resp = Client::new()
        .get(format!("{server}/stats"))
        .send()
        .await
        .context("HTTP request failed")?;
    let stats: StatsResponse = check(resp).await?.json().await.context("parse stats")?;
    let s = stats.stats;

    println!("cpu      {:>6.1}%", s.cpu_usage);
    println!("memory   {:>6.1}%", s.ram_usage);
    println!("temp     {:>6.1}°C", s.cpu_temp);
    println!(
        "battery  {:>6.1}%{}",
        s.battery_percent,
        if s.is_plugged { " (plugged in)" } else { "" }
    );
    Ok(())
}

async fn cmd_sleep(server: &str) -> Result<()> {
    let resp = Client::new()
        .post(format!("{server}/sleep"))
        .send()
        .await
        .context("HTTP request failed")?;
    let json: Value = check(resp).await?.json().await?;
    println!("{}", json["message"].as_str().unwrap_or("ok"));
    Ok(())
}

async fn cmd_notify(server: &str, title: &str, text: &str, app: Option<String>) -> Result<()> {
    let body = json!({
        "package_name": app,
        "title": title,
        "text": text,
    });
    let resp = Client::new()
        .post(format!("{server}/phone-notification"))
        .json(&body)
        .send()
        .await
        .context("HTTP request failed")?;
    check(resp).await?;
    println!("✓ notification sent");
    Ok(())
}

async fn cmd_push(server: &str, path: &Path) -> Result<()> {
    let name = path
        .file_name()
        .context("path has no file name")?
        .to_string_lossy()
        .into_owned();
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    let size = bytes.len();

    // Raw filename in Content-Disposition; the daemon does not decode `filename*`.
    let form = multipart::Form::new()
        .percent_encode_noop()
        .part("file", multipart::Part::bytes(bytes).file_name(name));
    let resp = Client::new()
        .post(format!("{server}/upload"))
        .multipart(form)
        .send()
        .await
        .context("HTTP request failed")?;
    let json: Value = check(resp).await?.json().await?;
    println!(
        "✓ uploaded {} ({size} bytes)",
        json["filename"].as_str().unwrap_or_default()
    );
    Ok(())
}

async fn cmd_files(server: &str) -> Result<()> {
    let resp = Client::new()
        .get(format!("{server}/list-files"))
        .send()
        .await
        .context("HTTP request failed")?;
    let files: Vec<SharedFile> = check(resp).await?.json().await.context("parse file list")?;
    if files.is_empty() {
        println!("(no shared files)");
        return Ok(());
    }
    for f in &files {
        let modified = UNIX_EPOCH + Duration::try_from_secs_f64(f.mod_time).unwrap_or_default();
        println!(
            "  {:<40} {:>12}  {}",
            f.name,
            f.size,
            humantime::format_rfc3339_seconds(modified)
        );
    }
    Ok(())
}

async fn cmd_pull(server: &str, name: &str, output: Option<PathBuf>) -> Result<()> {
    let resp = Client::new()
        .get(format!("{server}/download/{}", urlencoding::encode(name)))
        .send()
        .await
        .context("HTTP request failed")?;
    let bytes = check(resp).await?.bytes().await.context("read download")?;

    let dest = match output {
        Some(p) => p,
        None => local_name(name)?,
    };
    tokio::fs::write(&dest, &bytes)
        .await
        .with_context(|| format!("write {}", dest.display()))?;
    println!("✓ wrote {} bytes to {}", bytes.len(), dest.display());
    Ok(())
}

async fn cmd_lid(server: &str, enabled: bool) -> Result<()> {
    let resp = Client::new()
        .post(format!("{server}/inhibit-lid-sleep"))
        .json(&json!({ "enabled": enabled }))
        .send()
        .await
        .context("HTTP request failed")?;
    check(resp).await?;
    if enabled {
        println!("✓ lid sleep inhibited");
    } else {
        println!("✓ lid sleep restored");
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Pass 2xx responses through; otherwise fail with the server's message.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let json: Value = resp.json().await.unwrap_or_default();
    anyhow::bail!(
        "server returned {status}: {}",
        json["message"].as_str().unwrap_or("")
    );
}

/// Last path component of a remote name, so a pull never writes outside the
/// current directory.
fn local_name(name: &str) -> Result<PathBuf> {
    name.rsplit(['/', '\\'])
        .find(|part| !part.is_empty() && *part != "." && *part != "..")
        .map(PathBuf::from)
        .with_context(|| format!("cannot derive a local file name from {name:?}"))
}
