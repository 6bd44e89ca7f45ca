use clap::Parser;
use std::sync::Arc;

use statestore::config::Args;
use statestore::coordinator::service::StateStore;
use statestore::coordinator::tasks;
use statestore::transport::client::HttpUpdateSink;
use statestore::transport::router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt().with_max_level(args.log_level).init();

    let config = args.to_config();
    config.validate()?;

    tracing::info!("Starting state store on {}", args.bind);
    tracing::info!(
        "Heartbeat interval {:?}, failure timeout {:?}, dispatch period {:?}",
        config.heartbeat_interval,
        config.failure_timeout,
        config.dispatch_period
    );

    // 1. Coordinator state:
    let sink = Arc::new(HttpUpdateSink::new(config.delivery_timeout)?);
    let store = StateStore::new(config);

    // 2. Failure detector, dispatcher and stats reporter:
    let background = tasks::spawn(store.clone(), sink);
    let shutdown = background.cancellation_token();

    // 3. HTTP server:
    let app = router(store);
    let listener = tokio::net::TcpListener::bind(args.bind).await?;

    tracing::info!("HTTP server listening on {}", args.bind);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::error!("Failed to listen for Ctrl+C: {}", e);
                    }
                    tracing::info!("Shutdown requested");
                }
                _ = shutdown.cancelled() => {}
            }
        })
        .await?;

    background.shutdown().await;

    Ok(())
}
