use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fraudwatch::{
    decoder::json,
    generator,
    ingester::Ingester,
    settings::Settings,
    sink::postgres::PgSink,
    source::kafka::KafkaSource,
};
use tokio::sync::watch;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// pipeline gave up at runtime
const EXIT_PIPELINE_FAILURE: u8 = 1;
/// could not get started
const EXIT_STARTUP_FAILURE: u8 = 2;

#[doc(hidden)]
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// optional TOML config file, environment variables take precedence
    #[arg(short, long)]
    config: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// ingest transactions from kafka into postgres
    Consume,
    /// emit synthetic transactions to kafka
    Produce,
}

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy()
            .add_directive("rdkafka=warn".parse().expect("static directive")),
    );
    tracing_subscriber::registry().with(log_layer).init();
}

/// Flips the returned flag on SIGINT or SIGTERM
fn shutdown_signal() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });
    shutdown_rx
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            info!("received SIGINT");
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received SIGINT");
}

async fn consume(settings: Settings) -> ExitCode {
    let startup = async {
        let source = KafkaSource::new(&settings).context("failed to create kafka consumer")?;
        let sink = PgSink::connect(
            &settings.postgres_dsn,
            settings.max_pg_connections,
            &settings.postgres_table,
        )
        .await
        .context("failed to connect to postgres")?;
        sink.ensure_schema()
            .await
            .context("failed to initialize schema")?;
        anyhow::Ok((source, sink))
    };
    let (source, sink) = match startup.await {
        Ok(parts) => parts,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };

    let ingester = Ingester::new(
        source,
        sink,
        json::Decoder,
        settings.batch_size,
        settings.poll_timeout(),
        settings.flush_timeout(),
        settings.retry_policy(),
    );
    match ingester.run(shutdown_signal()).await {
        Ok(stats) => {
            info!(messages = stats.consumed, "total messages processed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "ingester failed");
            ExitCode::from(EXIT_PIPELINE_FAILURE)
        }
    }
}

async fn produce(settings: Settings) -> ExitCode {
    let producer = match generator::create_producer(&settings) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "failed to create kafka producer");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };
    let result = generator::run(
        producer,
        &settings.topic,
        settings.producer_interval(),
        settings.producer_delivery_timeout(),
        shutdown_signal(),
    )
    .await;
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "producer failed");
            ExitCode::from(EXIT_PIPELINE_FAILURE)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_tracing();
    let args = Args::parse();
    let settings = match Settings::new(args.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot load config");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };
    info!(
        topic = settings.topic,
        batch_size = settings.batch_size,
        flush_timeout_seconds = settings.flush_timeout_seconds,
        "configuration loaded"
    );

    match args.command {
        Command::Consume => consume(settings).await,
        Command::Produce => produce(settings).await,
    }
}
