//! Bankruptcy Prediction Pipeline Library
//!
//! Scores company financial-ratio records with a trained pipeline
//! (column reconciliation, winsorizing, scaling, classifier) and serves
//! predictions over HTTP and, optionally, NATS request/reply.

pub mod api;
pub mod config;
pub mod consumer;
pub mod error;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod reconciler;
pub mod service;
pub mod types;

pub use config::AppConfig;
pub use consumer::RequestConsumer;
pub use error::{PipelineError, Result};
pub use models::InferencePipeline;
pub use producer::ReplyProducer;
pub use reconciler::{ColumnReconciler, NamingConvention};
pub use service::PredictionService;
pub use types::{BankruptcyLabel, FeatureRecord, PredictionResult};
