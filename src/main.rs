//! ReasonKit Hooks Server
//!
//! Payment-provider webhook receiver, forwarder, and replayer.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use reasonkit_hooks::config::AppConfig;
use reasonkit_hooks::server::app_router;
use reasonkit_hooks::state::AppState;

/// ReasonKit Hooks Server
#[derive(Parser, Debug)]
#[command(name = "rk-hooks")]
#[command(author = "ReasonKit Team <team@reasonkit.sh>")]
#[command(version)]
#[command(about = "Payment-provider webhook receiver, forwarder, and replayer")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3020")]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose { "debug" } else { "info" };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config =
        AppConfig::from_env(&args.host, args.port).context("Failed to load configuration")?;

    reasonkit_hooks::metrics::init();
    let state =
        Arc::new(AppState::new(config).context("Failed to initialize application state")?);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        addr = %addr,
        version = reasonkit_hooks::VERSION,
        "ReasonKit Hooks server listening"
    );

    axum::serve(listener, app_router(state))
        .await
        .context("Server error")?;

    Ok(())
}
