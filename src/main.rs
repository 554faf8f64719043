//! AMP CORS gateway.
//!
//! Sits in front of a publisher backend and applies the AMP cross-origin
//! policy to every request before forwarding it.
//!
//! ```text
//!   AMP cache / browser ──▶ gateway ──▶ amp_cors guard ──┬─▶ upstream backend
//!                                                       └─▶ 401 Unauthorized Request
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use amp_cors_gateway::config::load_config;
use amp_cors_gateway::lifecycle::signals::shutdown_on_signal;
use amp_cors_gateway::observability::{logging, metrics};
use amp_cors_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "amp-cors-gateway")]
#[command(about = "AMP CORS gateway for a single publisher origin", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "amp-gateway.toml")]
    config: PathBuf,

    /// Validate the configuration, print the allowed origins and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    if cli.check {
        let server = HttpServer::new(config)?;
        println!("publisher origin: {}", server.guard().publisher_origin());
        for origin in server.guard().valid_origins().iter() {
            println!("  allowed: {}", origin);
        }
        return Ok(());
    }

    logging::init_logging(&config.observability);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        publisher_origin = %config.amp.publisher_origin,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        shutdown_on_signal(&shutdown).await;
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
