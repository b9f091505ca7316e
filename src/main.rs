use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use std::sync::Arc;
use temp_media::TempMediaServices;
use temp_media::config::TempMediaConfig;
use temp_media::infrastructure::{database, staging};
use temp_media::services::notifications::{QueuedNotificationSink, TracingNotificationSink};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Run a single sweep and exit (for cron)
    Once,
    /// Sweep on an interval until interrupted
    Watch,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Temporary media sweeper", long_about = None)]
struct Args {
    #[arg(short, long, value_enum, default_value_t = Mode::Once)]
    mode: Mode,

    /// Seconds between sweeps in watch mode (overrides TEMP_MEDIA_SWEEP_INTERVAL_SECS)
    #[arg(short, long)]
    interval: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "temp_media=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting temp-media sweeper [Mode: {:?}]...", args.mode);

    let mut config = TempMediaConfig::from_env();
    if let Some(interval) = args.interval {
        config.sweep_interval_secs = interval;
    }
    info!(
        "🛡️  Config: TTL={}h, Processed retention={}h, Batch={}",
        config.default_ttl_hours, config.processed_retention_hours, config.sweep_batch_size
    );

    let db = database::setup_database().await?;
    let staging_area = staging::setup_staging(&config).await?;
    let (notifications, notifier) = QueuedNotificationSink::spawn(Arc::new(TracingNotificationSink));
    let services = TempMediaServices::new(db, staging_area, Arc::new(notifications), config);

    match args.mode {
        Mode::Once => {
            let purged = services.sweeper.sweep().await?;
            info!("✅ Purged {} temporary media records", purged);
            println!("{}", purged);
        }
        Mode::Watch => {
            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            let sweeper = services.sweeper.clone();
            let handle = tokio::spawn(sweeper.run(shutdown_rx));

            shutdown_signal().await;
            let _ = shutdown_tx.send(true);

            if let Err(e) = handle.await {
                error!("❌ Sweeper task failed: {}", e);
            }
            info!("🛑 Sweeper shut down gracefully.");
        }
    }

    // flush queued notifications before exiting
    drop(services);
    if let Err(e) = notifier.await {
        error!("❌ Notification task failed: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
