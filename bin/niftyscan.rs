use std::{sync::Arc, time::Duration};

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use niftyscan::{
    api::{self, AppState},
    subgraph::{ChainHeadResolver, HttpSubgraph, Subgraph},
    worker::{HttpDispatch, LocalDispatch, PageFetcher, ScanDispatch},
    BlockScanner, CronScheduler, Database, ScanScheduler, Settings,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let settings = Arc::new(
        Settings::new()
            .context("Failed to load configuration. Check config.yaml and NIFTYSCAN__* variables")?,
    );

    SimpleLogger::new()
        .with_level(settings.logging.level)
        .init()
        .context("Failed to initialize logger")?;

    let db = Database::new(&settings.storage)
        .await
        .context("Failed to initialize key-value store")?;

    let subgraph: Arc<dyn Subgraph> = Arc::new(
        HttpSubgraph::new(&settings.subgraph).context("Failed to build subgraph client")?,
    );

    let fetcher = PageFetcher::new(
        subgraph.clone(),
        db.tokens.clone(),
        settings.scanner.page_size,
    );
    let scanner = Arc::new(BlockScanner::new(db.scan.clone(), fetcher));

    let dispatcher: Arc<dyn ScanDispatch> = match &settings.server.location {
        Some(location) => {
            info!("Dispatching block scans to {}", location);
            Arc::new(
                HttpDispatch::new(
                    location.clone(),
                    Duration::from_millis(settings.subgraph.request_timeout_ms)
                        + settings.scanner.time_budget(),
                )
                .context("Failed to build dispatch client")?,
            )
        },
        None => {
            info!("Dispatching block scans in-process");
            Arc::new(LocalDispatch::new(scanner.clone()))
        },
    };

    let scheduler = Arc::new(ScanScheduler::new(
        db,
        ChainHeadResolver::new(subgraph),
        dispatcher,
        settings.scanner.clone(),
    ));

    run_scanner(settings, scheduler, scanner).await
}

async fn run_scanner(
    settings: Arc<Settings>,
    scheduler: Arc<ScanScheduler>,
    scanner: Arc<BlockScanner>,
) -> anyhow::Result<()> {
    let cancellation_token = CancellationToken::new();

    let listener = tokio::net::TcpListener::bind(&settings.server.listen)
        .await
        .with_context(|| format!("Failed to bind {}", settings.server.listen))?;
    info!("HTTP server listening on {}", settings.server.listen);

    let app = api::router(AppState {
        scheduler: scheduler.clone(),
        scanner,
    });
    let server_token = cancellation_token.child_token();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(server_token.cancelled_owned())
            .await
        {
            error!("HTTP server failed: {:#}", e);
        }
    });

    let cron_scheduler = CronScheduler::new(scheduler, settings.cron.clone());

    let cron_token = cancellation_token.child_token();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron_scheduler.run(cron_token).await {
            error!("Cron scheduler failed: {:#}", e);
        }
    });

    info!("Cron scheduler started - chain scans will run periodically");

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Scanner running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    info!("Finishing all tasks...");

    cancellation_token.cancel();

    info!("Waiting for HTTP server to stop...");
    let _ = server_handle.await;

    info!("Waiting for cron scheduler to stop...");
    let _ = cron_handle.await;

    info!("Scanner stopped");
    Ok(())
}
