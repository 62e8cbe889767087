use miniats::config::Config;
use miniats::infrastructure::metrics::init_metrics;
use miniats::infrastructure::{TcpTransport, Transport};
use miniats::Switch;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("=== MiniATS ===");

    // Load configuration, never fatal
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load_or_default(config_path.as_deref());
    info!("Configuration: {:?}", config);

    // A broken exporter setup never keeps the switch from starting
    if config.metrics.enabled {
        match config.metrics_addr() {
            Ok(listen) => match init_metrics(listen) {
                Ok(()) => info!("Prometheus metrics exporter listening on {}", listen),
                Err(e) => warn!("Failed to start metrics exporter: {}", e),
            },
            Err(e) => warn!("{}; metrics exporter disabled", e),
        }
    }

    let switch = Arc::new(Switch::new(config.exchange));

    let bind = format!("{}:{}", config.server.host, config.server.port);
    let mut transport = TcpTransport::new(bind, switch);
    transport.start().await?;

    info!("Waiting for connections...");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    transport.stop().await?;
    info!("Server stopped");

    Ok(())
}
