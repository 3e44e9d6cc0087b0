//! Configuration management for the bankruptcy prediction service

use crate::reconciler::NamingConvention;
use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable overriding [`DEFAULT_CONFIG_PATH`]
pub const CONFIG_PATH_ENV: &str = "BANKRUPTCY_CONFIG";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted batch request
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Largest accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_max_batch_size() -> usize {
    1000
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

/// Trained pipeline artifact and request field naming
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// JSON artifact produced by the training run
    pub artifact_path: PathBuf,
    /// Request field naming convention
    #[serde(default)]
    pub naming: NamingConvention,
    /// `{request_name: canonical_name}` file, required for `mapped` naming
    #[serde(default)]
    pub field_map_path: Option<PathBuf>,
    /// Reject request fields without a column translation
    #[serde(default = "default_strict_fields")]
    pub strict_fields: bool,
    /// Column count this deployment expects; startup fails on mismatch
    #[serde(default)]
    pub expected_feature_count: Option<usize>,
}

fn default_strict_fields() -> bool {
    true
}

/// Decision policy
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectionConfig {
    /// Overrides the artifact's decision threshold when set
    #[serde(default)]
    pub threshold: Option<f64>,
}

/// NATS request/reply transport
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub enabled: bool,
    /// NATS server URL
    pub url: String,
    /// Subject for single-record requests
    pub predict_subject: String,
    /// Subject for batch requests
    pub batch_subject: String,
    /// Maximum requests processed concurrently
    pub workers: usize,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "nats://localhost:4222".to_string(),
            predict_subject: "bankruptcy.predict".to_string(),
            batch_subject: "bankruptcy.predict.batch".to_string(),
            workers: 4,
        }
    }
}

/// Periodic metrics summary
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between summaries; 0 disables the reporter
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from `$BANKRUPTCY_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path, layered with
    /// `BANKRUPTCY__SECTION__KEY` environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("BANKRUPTCY").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks the type system cannot express
    pub fn validate(&self) -> Result<()> {
        if self.server.max_batch_size == 0 {
            bail!("server.max_batch_size must be positive");
        }
        if self.pipeline.naming == NamingConvention::Mapped
            && self.pipeline.field_map_path.is_none()
        {
            bail!("pipeline.naming = \"mapped\" requires pipeline.field_map_path");
        }
        if let Some(t) = self.detection.threshold {
            if !(0.0..=1.0).contains(&t) {
                bail!("detection.threshold must be within [0, 1], got {}", t);
            }
        }
        if self.server.max_body_bytes == 0 {
            bail!("server.max_body_bytes must be positive");
        }
        if self.nats.enabled && self.nats.workers == 0 {
            bail!("nats.workers must be positive");
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            bail!(
                "logging.format must be \"json\" or \"pretty\", got {:?}",
                self.logging.format
            );
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                max_batch_size: default_max_batch_size(),
                max_body_bytes: default_max_body_bytes(),
            },
            pipeline: PipelineConfig {
                artifact_path: PathBuf::from("models/demo_pipeline.json"),
                naming: NamingConvention::SnakeCase,
                field_map_path: None,
                strict_fields: true,
                expected_feature_count: None,
            },
            detection: DetectionConfig::default(),
            nats: NatsConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
