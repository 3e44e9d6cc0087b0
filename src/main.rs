//! Bankruptcy Prediction Service - Main Entry Point
//!
//! Loads the trained pipeline artifact, then serves predictions over HTTP
//! and, when enabled, NATS request/reply.

use anyhow::{Context, Result};
use bankruptcy_pipeline::{
    api,
    config::{AppConfig, LoggingConfig},
    metrics::{MetricsReporter, PipelineMetrics},
    models::InferencePipeline,
    PredictionService, ReplyProducer, RequestConsumer,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging)?;

    info!("Starting Bankruptcy Prediction Service");

    // Any artifact problem is fatal
    let pipeline = Arc::new(InferencePipeline::new(&config).context("Failed to load pipeline")?);

    let metrics = Arc::new(PipelineMetrics::new());
    let service = PredictionService::new(
        pipeline,
        metrics.clone(),
        config.pipeline.naming,
        config.server.max_batch_size,
    );

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    if config.nats.enabled {
        let client = async_nats::connect(&config.nats.url)
            .await
            .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
        info!("Connected to NATS at {}", config.nats.url);

        let consumer = RequestConsumer::new(client.clone(), &config.nats);
        let producer = ReplyProducer::new(client);
        let service = service.clone();
        tokio::spawn(async move {
            if let Err(e) = consumer.run(service, producer).await {
                error!(error = %e, "NATS consumer stopped");
            }
        });
    }

    let app = api::router(service, config.server.max_body_bytes);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid logging.level directive")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
