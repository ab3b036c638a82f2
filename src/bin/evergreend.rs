//! Evergreen daemon - keeps the persisted Pennyworth session fresh.
//!
//! This binary runs in the foreground (under systemd or a terminal),
//! restores the persisted session slot, renews the access token ahead
//! of expiry, and picks up sessions written or cleared by other
//! processes.
//!
//! # Usage
//!
//! ```bash
//! # Run against the configured identity server
//! evergreend
//!
//! # Override the config file
//! evergreend --base-url https://app.pennyworth.dev
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: shut down cleanly
//! - `SIGCONT`: renew immediately if the session is due (resume)
//! - `SIGUSR1`: reload the session from disk

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use evergreend::{
    spawn_manager, DaemonConfig, HttpRefreshTransport, ManagerHandle, SessionEvent, SessionStore,
    SystemClock,
};

/// Evergreen daemon - session lifecycle keeper
#[derive(Parser, Debug)]
#[command(name = "evergreend", version, about)]
struct Args {
    /// Path to the config file (default: ~/.config/evergreen/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Identity server base URL (overrides the config file)
    #[arg(long)]
    base_url: Option<String>,

    /// Path of the persisted session slot (overrides the config file)
    #[arg(long)]
    state_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    run_daemon(config)
}

fn load_config(args: &Args) -> Result<DaemonConfig> {
    let mut config = match &args.config {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::load_or_default(&DaemonConfig::default_path())?,
    };

    if let Some(base_url) = &args.base_url {
        config.base_url = Some(base_url.clone());
    }
    if let Some(state_path) = &args.state_path {
        config.state_path = Some(state_path.clone());
    }

    Ok(config)
}

#[tokio::main]
async fn run_daemon(config: DaemonConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("evergreend=info".parse()?)
                .add_directive("evergreen_core=info".parse()?),
        )
        .init();

    let Some(base_url) = config.base_url.clone() else {
        bail!(
            "no identity server configured; set baseUrl in {} or pass --base-url",
            DaemonConfig::default_path().display()
        );
    };
    let state_path = config
        .state_path
        .clone()
        .unwrap_or_else(SessionStore::default_path);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        base_url = %base_url,
        state_path = %state_path.display(),
        "Evergreen daemon starting"
    );

    let transport = HttpRefreshTransport::new(&base_url, config.request_timeout())?;
    let cancel_token = CancellationToken::new();

    let handle = spawn_manager(
        SessionStore::new(state_path),
        Arc::new(transport),
        SystemClock,
        config.policy,
        cancel_token.clone(),
    );

    let signal_handle = handle.clone();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = dispatch_signals(signal_handle, signal_token).await {
            error!(error = %e, "Error in signal dispatcher");
        }
    });

    let mut events = handle.subscribe();
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            event = events.recv() => match event {
                Ok(SessionEvent::Invalidated { reason }) => {
                    warn!(reason = %reason, "No active session; waiting for the next login");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    cancel_token.cancel();
    info!("Evergreen daemon stopped");
    Ok(())
}

/// Translates process signals into manager commands until a shutdown
/// signal arrives.
async fn dispatch_signals(handle: ManagerHandle, cancel: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigcont = signal(SignalKind::from_raw(libc::SIGCONT))?;
        let mut sigusr1 = signal(SignalKind::user_defined1())?;

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM");
                    cancel.cancel();
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT");
                    cancel.cancel();
                    break;
                }
                _ = sigcont.recv() => {
                    info!("Process resumed, checking whether a renewal is due");
                    handle.foreground().await;
                }
                _ = sigusr1.recv() => {
                    info!("Received SIGUSR1, reloading session from disk");
                    if let Err(e) = handle.reload().await {
                        error!(error = %e, "Reload failed");
                    }
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = handle;
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
        cancel.cancel();
    }

    Ok(())
}
