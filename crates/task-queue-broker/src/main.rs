use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use prometheus::{Encoder, TextEncoder};
use task_queue_broker::{Broker, BrokerConfig, BrokerMetrics, TimingWheel};
use task_queue_store::RedisStoreClient;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tq-broker")]
#[command(about = "Task dispatch broker", long_about = None)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    #[arg(long)]
    listen_addr: Option<String>,

    #[arg(long)]
    store_addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = if std::path::Path::new(&args.config).exists() {
        BrokerConfig::from_file(&args.config)?
    } else {
        eprintln!("config file {} not found, using defaults", args.config);
        BrokerConfig::default()
    };

    if let Some(listen_addr) = args.listen_addr {
        config.listen_addr = listen_addr.parse()?;
    }
    if let Some(store_addr) = args.store_addr {
        config.store_addr = store_addr;
    }

    let _guard = init_tracing(&config);
    tracing::info!(?config, "starting broker");

    let store = Arc::new(RedisStoreClient::new(&config.store_addr).await?);
    let timer = TimingWheel::new();
    let metrics = Arc::new(BrokerMetrics::new()?);
    let broker = Arc::new(Broker::new(store, timer.clone(), metrics.clone()));

    let dispatcher = tokio::spawn(timer.clone().run());

    let requeue_shutdown = Arc::new(tokio::sync::Notify::new());
    let requeue_broker = broker.clone();
    let requeue_shutdown_clone = requeue_shutdown.clone();
    let requeue_loop = tokio::spawn(async move {
        requeue_broker.run_fail_requeue_loop(requeue_shutdown_clone).await;
    });

    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);
    let app = task_queue_broker::api::router(broker.clone()).merge(metrics_router);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    timer.stop();
    requeue_shutdown.notify_waiters();
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = dispatcher.await;
        let _ = requeue_loop.await;
    })
    .await;

    Ok(())
}

async fn metrics_handler(State(metrics): State<Arc<BrokerMetrics>>) -> String {
    let encoder = TextEncoder::new();
    let metric_families = metrics.registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap_or_default()
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
    tracing::info!("shutdown signal received");
}

fn init_tracing(config: &BrokerConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));

    match &config.log_path {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "broker.log".to_string());
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
