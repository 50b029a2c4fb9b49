//! codeplayd - session hub for live coding rooms
//!
//! Accepts client connections over TCP and relays chat and language
//! changes between everyone in the session.
//!
//! # Usage
//!
//! ```bash
//! # Start the hub (foreground, port 3000)
//! codeplayd start
//!
//! # Start in the background on another port
//! codeplayd start -d --port 4000
//!
//! # Stop the hub
//! codeplayd stop
//!
//! # Check hub status
//! codeplayd status
//! ```
//!
//! Settings come from `--config`, else `$XDG_CONFIG_HOME/codeplay/codeplayd.toml`
//! when present, then `CODEPLAY_BIND` / `CODEPLAY_PORT`, then flags.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use codeplayd::{bind_server, HubEvent, ServerConfig};

/// codeplay hub - shared chat and language for a coding session
#[derive(Parser, Debug)]
#[command(name = "codeplayd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the hub
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// TOML settings file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address to listen on (overrides config and environment)
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on (overrides config and environment)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Stop the running hub
    Stop,
    /// Show hub status
    Status,
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("codeplay")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("codeplayd.pid")
}

/// Address the running hub actually bound, written next to the PID file.
fn addr_file_path() -> PathBuf {
    state_dir().join("codeplayd.addr")
}

fn log_file_path() -> PathBuf {
    state_dir().join("codeplayd.log")
}

fn default_config_path() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("codeplay").join("codeplayd.toml");
    path.exists().then_some(path)
}

fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
    let _ = fs::remove_file(addr_file_path());
}

fn write_addr(path: &Path, addr: &std::net::SocketAddr) -> Result<()> {
    fs::write(path, addr.to_string()).context("Failed to write address file")
}

fn read_addr(path: &Path) -> Option<String> {
    let addr = fs::read_to_string(path).ok()?;
    let addr = addr.trim();
    (!addr.is_empty()).then(|| addr.to_string())
}

fn is_process_running(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

fn running_hub_pid() -> Option<u32> {
    let pid = read_pid()?;
    if is_process_running(pid) {
        return Some(pid);
    }
    remove_pid_file();
    None
}

fn stop_hub(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let Ok(raw) = i32::try_from(pid) else {
            bail!("Invalid PID {pid}");
        };
        // SAFETY: kill(2) has no memory-safety preconditions.
        let result = unsafe { libc::kill(raw, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn load_config(path: Option<PathBuf>, bind: Option<String>, port: Option<u16>) -> Result<ServerConfig> {
    let path = path.or_else(default_config_path);
    let mut config = ServerConfig::load(path.as_deref()).context("Failed to load configuration")?;

    if let Some(bind) = bind {
        config.bind = bind;
    }
    if let Some(port) = port {
        config.port = port;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        config: None,
        bind: None,
        port: None,
    });

    match command {
        Command::Start {
            daemon,
            config,
            bind,
            port,
        } => {
            if let Some(pid) = running_hub_pid() {
                eprintln!("Hub is already running (PID {pid})");
                eprintln!("Use 'codeplayd stop' to stop it first.");
                process::exit(1);
            }

            // Config errors surface on the terminal, before forking.
            let config = load_config(config, bind, port)?;

            if daemon {
                daemonize()?;
            }

            write_pid()?;
            let result = run_hub(config);
            remove_pid_file();
            result
        }
        Command::Stop => {
            let Some(pid) = running_hub_pid() else {
                println!("Hub is not running.");
                return Ok(());
            };

            println!("Stopping hub (PID {pid})...");
            stop_hub(pid)?;

            for _ in 0..50 {
                if !is_process_running(pid) {
                    println!("Hub stopped.");
                    return Ok(());
                }
                std::thread::sleep(std::time::Duration::from_millis(100));
            }

            eprintln!("Hub did not stop within 5 seconds.");
            process::exit(1);
        }
        Command::Status => {
            let Some(pid) = running_hub_pid() else {
                println!("Hub is not running.");
                process::exit(1);
            };

            println!("Hub is running (PID {pid})");
            if let Some(addr) = read_addr(&addr_file_path()) {
                println!("Address: {addr}");
            }
            Ok(())
        }
    }
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_hub(config: ServerConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("codeplayd=info".parse()?)
                .add_directive("codeplay_core=info".parse()?)
                .add_directive("codeplay_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "codeplay hub starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let server = bind_server(&config, cancel_token.clone())
        .await
        .context("Failed to start server")?;

    spawn_event_log(server.hub().subscribe(), cancel_token.clone());

    match server.local_addr() {
        Ok(addr) => {
            info!(addr = %addr, max_connections = config.max_connections, "Listening");
            if let Err(e) = write_addr(&addr_file_path(), &addr) {
                warn!(error = %e, "Status will not report the address");
            }
        }
        Err(e) => warn!(error = %e, "Could not read bound address"),
    }

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("codeplay hub stopped");
    Ok(())
}

/// Mirrors hub activity into the debug log.
fn spawn_event_log(
    mut events: tokio::sync::broadcast::Receiver<HubEvent>,
    cancel_token: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => debug!(?event, "Hub event"),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Event log lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
