use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use webagentd::config::{Config, Transport};
use webagentd::driver::cdp::CdpDriver;
use webagentd::replay::ReplayStore;
use webagentd::session::SessionManager;
use webagentd::tools::ToolRegistry;
use webagentd::transport;

/// Deterministic browser-control tool server for autonomous agents.
#[derive(Parser, Debug)]
#[command(name = "webagentd")]
#[command(version)]
#[command(about = "Browser-control tool server: create → step → snapshot → stop → replay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the tool server (default)
    Serve {
        /// Transport: stdio or rest
        #[arg(long)]
        transport: Option<String>,
        /// Bind host for the REST transport
        #[arg(long)]
        host: Option<String>,
        /// Bind port for the REST transport
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the replay events of a trace
    Replay {
        /// Trace id to load
        trace_id: String,
        /// First event index (inclusive)
        #[arg(long)]
        start: Option<u64>,
        /// Last event index (inclusive)
        #[arg(long)]
        end: Option<u64>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        None => serve(config, None, None, None).await,
        Some(Commands::Serve {
            transport,
            host,
            port,
        }) => serve(config, transport, host, port).await,
        Some(Commands::Replay {
            trace_id,
            start,
            end,
        }) => {
            let store = ReplayStore::new(config.traces_root);
            let events = store.filter(&trace_id, start, end)?;
            for event in events {
                println!("{}", serde_json::to_string(&event)?);
            }
            Ok(())
        }
        Some(Commands::Config) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn serve(
    mut config: Config,
    transport: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    if let Some(raw) = transport {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rest" => config.transport = Transport::Rest,
            _ => config.transport = Transport::Stdio,
        }
    }
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    info!(
        transport = ?config.transport,
        max_sessions = config.max_sessions,
        policy = config.policy_mode.as_str(),
        traces = %config.traces_root.display(),
        "starting webagentd"
    );

    let replay = Arc::new(ReplayStore::new(config.traces_root.clone()));
    let driver = Arc::new(CdpDriver::new());
    let manager = SessionManager::new(config.clone(), driver, replay);
    let _gc = manager.spawn_gc_loop();
    let registry = Arc::new(ToolRegistry::new(manager));

    match config.transport {
        Transport::Stdio => transport::stdio::run(registry).await,
        Transport::Rest => transport::rest::run(registry, &config.host, config.port).await,
    }
}
