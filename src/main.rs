use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tagz::services::watcher;
use tagz::{ExtensionPolicy, IngestConfig, Pipeline};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Watch a directory and move dropped files into a content-addressed store
#[derive(Parser, Debug)]
#[command(name = "tagz", version)]
struct Cli {
    /// Watched input directory (env: TAGZ_IN_DIR)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Staging directory (env: TAGZ_TMP_DIR)
    #[arg(long)]
    staging: Option<PathBuf>,

    /// Store directory, must share a filesystem with staging (env: TAGZ_OUT_DIR)
    #[arg(long)]
    store: Option<PathBuf>,

    /// "original" or "detected" (env: TAGZ_EXTENSION_POLICY)
    #[arg(long)]
    extension_policy: Option<ExtensionPolicy>,

    /// Concurrent identification limit (env: TAGZ_IDENTIFY_WORKERS)
    #[arg(long)]
    workers: Option<usize>,

    /// Drain the staging directory and exit without watching
    #[arg(long)]
    recover_only: bool,

    /// Print every outcome as a JSON line on stdout
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn apply(self, mut config: IngestConfig) -> IngestConfig {
        if let Some(dir) = self.input {
            config.input_dir = dir;
        }
        if let Some(dir) = self.staging {
            config.staging_dir = dir;
        }
        if let Some(dir) = self.store {
            config.store_dir = dir;
        }
        if let Some(policy) = self.extension_policy {
            config.extension_policy = policy;
        }
        if let Some(workers) = self.workers {
            config.identify_workers = workers;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing with EnvFilter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tagz=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let recover_only = cli.recover_only;
    let json = cli.json;
    let config = cli.apply(IngestConfig::from_env()?);

    config.validate()?;
    config.ensure_dirs().await?;

    info!(
        "🚀 Watching: {} and moving to {} (staging: {}, policy: {:?}, workers: {})",
        config.input_dir.display(),
        config.store_dir.display(),
        config.staging_dir.display(),
        config.extension_policy,
        config.identify_workers
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    // The watcher must outlive the pipeline or the event stream closes
    let (_watcher, events) = if recover_only {
        (None, None)
    } else {
        let (w, events) = watcher::subscribe(&config.input_dir, config.queue_capacity)?;
        info!("👀 Subscribed to {}", w.path().display());
        (Some(w), Some(events))
    };

    let (handle, mut outcomes) = Pipeline::new(config).spawn(events, cancel);

    while let Some(outcome) = outcomes.recv().await {
        if json {
            match serde_json::to_string(&outcome) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("❌ Cannot encode outcome: {}", e),
            }
        }
    }

    match handle.join().await {
        Ok(report) => {
            info!(
                "🛑 Exiting! stored={} duplicates={}",
                report.commit.stored, report.commit.duplicates
            );
            Ok(())
        }
        Err(e) => {
            error!("❌ Pipeline stopped: {}", e);
            Err(e.into())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
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
