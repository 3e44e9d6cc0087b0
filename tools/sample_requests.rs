//! Sample Request Generator
//!
//! Builds random in-bounds records from the configured pipeline artifact
//! and sends them to the service's NATS prediction subjects.
//!
//! Usage: sample_requests [count] [batch_size] [delay_ms]

use bankruptcy_pipeline::{config::AppConfig, InferencePipeline};
use rand::Rng;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{info, warn};

/// Random records keyed by request field names
struct RecordGenerator {
    rng: rand::rngs::ThreadRng,
    fields: Vec<String>,
    bounds: Vec<(f64, f64)>,
}

impl RecordGenerator {
    fn new(pipeline: &InferencePipeline) -> Self {
        let winsorizer = pipeline.winsorizer();
        Self {
            rng: rand::thread_rng(),
            fields: pipeline.reconciler().fields().to_vec(),
            bounds: winsorizer
                .lower()
                .iter()
                .copied()
                .zip(winsorizer.upper().iter().copied())
                .collect(),
        }
    }

    /// Every value drawn uniformly within the training clip bounds
    fn generate(&mut self) -> Value {
        let mut record = Map::with_capacity(self.fields.len());
        for (field, &(lower, upper)) in self.fields.iter().zip(&self.bounds) {
            let value = if upper > lower {
                self.rng.gen_range(lower..=upper)
            } else {
                lower
            };
            record.insert(field.clone(), json!(value));
        }
        Value::Object(record)
    }

    fn generate_batch(&mut self, size: usize) -> Value {
        let records: Vec<Value> = (0..size).map(|_| self.generate()).collect();
        json!({ "records": records })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sample_requests=info".parse()?),
        )
        .init();

    info!("Starting Sample Request Generator");

    let args: Vec<String> = std::env::args().collect();
    let count: u64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(20);
    let batch_size: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(1);
    let delay_ms: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);

    let config = AppConfig::load()?;
    let pipeline = InferencePipeline::new(&config)?;
    let mut generator = RecordGenerator::new(&pipeline);

    let subject = if batch_size > 1 {
        config.nats.batch_subject.clone()
    } else {
        config.nats.predict_subject.clone()
    };

    info!(
        nats_url = %config.nats.url,
        subject = %subject,
        count = count,
        batch_size = batch_size,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(&config.nats.url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(&pipeline, &mut generator, count, delay_ms).await;
        }
    };

    let mut bankrupt = 0u64;
    let mut rejected = 0u64;

    for i in 0..count {
        let request = if batch_size > 1 {
            generator.generate_batch(batch_size)
        } else {
            generator.generate()
        };

        let reply = client
            .request(subject.clone(), serde_json::to_vec(&request)?.into())
            .await?;
        let body: Value = serde_json::from_slice(&reply.payload)?;

        if let Some(kind) = body.get("kind") {
            rejected += 1;
            warn!(request = i + 1, kind = %kind, error = %body["error"], "Request rejected");
        } else if let Some(predictions) = body["predictions"].as_array() {
            bankrupt += predictions.iter().filter(|p| p.as_u64() == Some(1)).count() as u64;
        } else if body["prediction"].as_u64() == Some(1) {
            bankrupt += 1;
        }

        if (i + 1) % 10 == 0 {
            info!(
                "Sent {}/{} requests ({} bankrupt predictions, {} rejected)",
                i + 1,
                count,
                bankrupt,
                rejected
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! Sent {} requests ({} bankrupt predictions, {} rejected)",
        count, bankrupt, rejected
    );

    Ok(())
}

/// Score locally and print sample records instead of sending them
async fn run_dry_mode(
    pipeline: &InferencePipeline,
    generator: &mut RecordGenerator,
    count: u64,
    delay_ms: u64,
) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    for i in 0..count {
        let record = generator.generate();
        let result = pipeline.predict(&bankruptcy_pipeline::FeatureRecord::from_json(&record)?)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!(
                "Sample record {} ({}, p={:.3}):\n{}",
                i + 1,
                result.label,
                result.probability,
                serde_json::to_string_pretty(&record)?
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
