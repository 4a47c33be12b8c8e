//! mockd: local mock server backend
//!
//! A single-process backend for the mock server desktop app. It exposes a
//! JSON-RPC 2.0 control channel over WebSocket through which the UI creates,
//! stops, and inspects HTTP and WebSocket mock servers on local ports, and
//! saves their configurations across restarts.
//!
//! Usage:
//!   mockd                                   # Control channel on port 7071
//!   mockd --port 0                          # OS-assigned control port
//!   mockd --config-file ./servers.json      # Custom configuration store
//!   mockd --log-file                        # Log to ~/.mockd/logs/mockd.log

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use mockd_control::ControlServer;
use mockd_protocol::Notification;
use mockd_servers::service::{ConfigService, ServerService};
use mockd_servers::{ConfigStore, NotifySender, ServerRegistry};
use mockd_transport::{TransportConfig, TransportServer};
use tokio::sync::broadcast;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mockd", version, about = "mockd: local HTTP and WebSocket mock server backend")]
struct Cli {
    /// Control channel port (0 for OS-assigned)
    #[arg(long, default_value = "7071")]
    port: u16,

    /// Hostname the control channel binds to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Saved server configurations (defaults to ~/.mockd/server-configs.json)
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// Maximum concurrent control connections
    #[arg(long, default_value = "8")]
    max_connections: usize,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file (defaults to ~/.mockd/logs/mockd.log if no path given)
    #[arg(long, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,
}

fn mockd_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".mockd")
}

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let Some(log_file_arg) = &cli.log_file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return;
    };

    let log_path = if log_file_arg == "DEFAULT" {
        mockd_dir().join("logs/mockd.log")
    } else {
        PathBuf::from(log_file_arg)
    };
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    match std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
            eprintln!("Logging to {}", log_path.display());
        }
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            error!("Failed to open log file {}: {e}; logging to stderr", log_path.display());
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config_path = cli
        .config_file
        .clone()
        .unwrap_or_else(|| mockd_dir().join("server-configs.json"));

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                            mockd                             ║");
    println!("║                 HTTP + WebSocket mock servers                ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("  Control port:   {}", cli.port);
    println!("  Binding:        {} (localhost only)", cli.hostname);
    println!("  Saved configs:  {}", config_path.display());
    println!();

    // Notifications from the registry go out on the same channel the
    // transport fans out to every control client.
    let (notification_tx, _) = broadcast::channel::<String>(1024);

    let registry = Arc::new(ServerRegistry::new(ConfigStore::new(&config_path)));
    {
        let tx = notification_tx.clone();
        let notify: NotifySender = Arc::new(move |method: &str, params: serde_json::Value| {
            let notification = Notification::new(method, params);
            if let Ok(json) = serde_json::to_string(&notification) {
                let _ = tx.send(json);
            }
        });
        registry.set_notify_sender(notify);
    }

    let mut control = ControlServer::new();
    control.register_service(ServerService::new(registry.clone()));
    control.register_service(ConfigService::new(registry.clone()));

    if let Err(e) = control.initialize().await {
        error!("Failed to initialize control server: {e}");
        std::process::exit(1);
    }
    let control = Arc::new(control);

    let transport_config = TransportConfig {
        port: cli.port,
        hostname: cli.hostname.clone(),
        max_connections: cli.max_connections,
    };

    let mut transport =
        match TransportServer::start(transport_config, control.clone(), notification_tx).await {
            Ok(t) => t,
            Err(e) => {
                error!("Failed to start control channel: {e}");
                std::process::exit(1);
            }
        };

    let ws_url = format!("ws://{}:{}/ws", cli.hostname, transport.port());

    println!("────────────────────────────────────────────────────────────────");
    println!();
    println!("  Server running!");
    println!();
    println!("  Control endpoint:");
    println!("    {ws_url}");
    println!();
    println!("────────────────────────────────────────────────────────────────");
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    // Wait for Ctrl+C or stdin EOF. The desktop app holds our stdin open;
    // when it exits, the pipe closes and we stop instead of lingering.
    let shutdown_notify = Arc::new(tokio::sync::Notify::new());
    {
        let notify = shutdown_notify.clone();
        std::thread::spawn(move || {
            use std::io::Read;
            let mut buf = [0u8; 1];
            loop {
                match std::io::stdin().read(&mut buf) {
                    Ok(0) | Err(_) => {
                        notify.notify_one();
                        return;
                    }
                    Ok(_) => continue,
                }
            }
        });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = shutdown_notify.notified() => {
            eprintln!("stdin closed (parent process gone), shutting down");
        }
    }

    println!();
    println!("  Shutting down...");
    transport.stop().await;
    control.shutdown().await;
    println!("  Server stopped.");
}
