use std::sync::Arc;

use clap::Parser;
use task_queue_store::RedisStoreClient;
use task_queue_worker::{Worker, WorkerConfig};
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tq-worker")]
#[command(about = "Task dispatch worker", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    #[arg(long)]
    store_addr: Option<String>,

    #[arg(long)]
    bin_root: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = if std::path::Path::new(&args.config).exists() {
        WorkerConfig::from_file(&args.config)?
    } else {
        eprintln!("config file {} not found, using defaults", args.config);
        WorkerConfig::default()
    };

    if let Some(store_addr) = args.store_addr {
        config.store_addr = store_addr;
    }
    if let Some(bin_root) = args.bin_root {
        config.bin_root = bin_root;
    }

    let _guard = init_tracing(&config);
    tracing::info!(?config, "starting worker");

    let store = Arc::new(RedisStoreClient::new(&config.store_addr).await?);
    let worker = Worker::new(
        store,
        config.bin_root.clone(),
        config.task_run_time,
        config.result_keep_time,
        config.period,
    );

    let shutdown = Arc::new(tokio::sync::Notify::new());
    let run_shutdown = shutdown.clone();
    let run = tokio::spawn(async move {
        worker.run(run_shutdown).await;
    });

    shutdown_signal().await;
    tracing::info!("shutdown signal received");
    shutdown.notify_waiters();

    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), run).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    let terminate = async {
        signal(SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_tracing(config: &WorkerConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));

    match &config.log_path {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "worker.log".to_string());
            let file_appender = tracing_appender::rolling::daily(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    }
}
