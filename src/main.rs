//! metroscope demo server
//!
//! Serves the demo API with every request sampled into Prometheus metrics,
//! which are exposed on `/metrics` according to the `[telemetry]` settings.

use clap::Parser;
use metroscope::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    handlers::AppState,
    metrics::{Reporter, Scope},
    middleware::{Collector, SCRAPE_PATH},
    telemetry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                println!("Configuration template written to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    let config = Config::from_file(&cli.config)?;

    telemetry::init(&config.observability.log_level);

    tracing::info!(
        "Starting metroscope server on {}:{}",
        config.server.host,
        config.server.port
    );

    let reporter = Arc::new(Reporter::new());
    let app_scope = Scope::new(Arc::clone(&reporter), "app");
    let collector = Arc::new(Collector::new(&config.telemetry, Arc::clone(&reporter)));

    let app = metroscope::app(AppState::new(app_scope.clone()), Arc::clone(&collector))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;

    tracing::info!("Listening on {}", addr);
    if collector.is_enabled() {
        tracing::info!("Metrics available at http://{}{}", addr, SCRAPE_PATH);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    app_scope.close();
    collector.close();
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
