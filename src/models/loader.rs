//! Pipeline artifact loader

use crate::error::{PipelineError, Result};
use crate::models::classifier::{Classifier, ClassifierModel};
use crate::models::transforms::{StandardScaler, Winsorizer};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::info;

/// Artifact layout revision understood by this loader
pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 {
    SUPPORTED_FORMAT_VERSION
}

fn default_decision_threshold() -> f64 {
    0.5
}

/// Frozen pipeline produced by the offline training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineArtifact {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    /// Classifier family / experiment name, e.g. `knn`
    pub model_name: String,
    #[serde(default)]
    pub artifact_version: Option<String>,
    /// Canonical column names in the order the transforms were fit on
    pub columns: Vec<String>,
    pub winsorizer: Winsorizer,
    pub scaler: StandardScaler,
    #[serde(default = "default_decision_threshold")]
    pub decision_threshold: f64,
    pub classifier: ClassifierModel,
}

impl PipelineArtifact {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| PipelineError::load(format!("invalid artifact JSON: {}", e)))
    }

    /// Check internal consistency; every failure is fatal at startup.
    pub fn validate(&self, expected_feature_count: Option<usize>) -> Result<()> {
        if self.format_version != SUPPORTED_FORMAT_VERSION {
            return Err(PipelineError::load(format!(
                "unsupported artifact format_version {} (expected {})",
                self.format_version, SUPPORTED_FORMAT_VERSION
            )));
        }

        let n = self.columns.len();
        if n == 0 {
            return Err(PipelineError::load("artifact declares no columns"));
        }
        if let Some(expected) = expected_feature_count {
            if expected != n {
                return Err(PipelineError::load(format!(
                    "artifact has {} columns, configuration expects {}",
                    n, expected
                )));
            }
        }

        let mut seen = HashSet::with_capacity(n);
        for column in &self.columns {
            if column.trim().is_empty() {
                return Err(PipelineError::load("artifact contains an empty column name"));
            }
            if !seen.insert(column.as_str()) {
                return Err(PipelineError::load(format!(
                    "artifact column '{}' appears more than once",
                    column
                )));
            }
        }

        self.winsorizer.validate()?;
        self.scaler.validate()?;
        if self.winsorizer.len() != n || self.scaler.len() != n {
            return Err(PipelineError::load(format!(
                "artifact has {} columns but {} clip bounds and {} scaler entries",
                n,
                self.winsorizer.len(),
                self.scaler.len()
            )));
        }

        if !self.decision_threshold.is_finite() || !(0.0..=1.0).contains(&self.decision_threshold)
        {
            return Err(PipelineError::load(format!(
                "decision_threshold must be within [0, 1], got {}",
                self.decision_threshold
            )));
        }

        self.classifier.validate()?;
        if self.classifier.input_dim() != n {
            return Err(PipelineError::load(format!(
                "{} classifier expects {} features, artifact has {} columns",
                self.classifier.family(),
                self.classifier.input_dim(),
                n
            )));
        }

        Ok(())
    }
}

/// Loads and validates pipeline artifacts from disk.
#[derive(Debug, Clone, Default)]
pub struct ArtifactLoader {
    /// Column count the deployment was built against, if pinned
    expected_feature_count: Option<usize>,
}

impl ArtifactLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_expected_feature_count(expected_feature_count: Option<usize>) -> Self {
        Self {
            expected_feature_count,
        }
    }

    /// Read, parse and validate an artifact file.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<PipelineArtifact> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading pipeline artifact");

        let bytes = fs::read(path).map_err(|e| {
            PipelineError::load(format!("cannot read {}: {}", path.display(), e))
        })?;
        let artifact = PipelineArtifact::from_slice(&bytes)?;
        artifact.validate(self.expected_feature_count)?;

        info!(
            model = %artifact.model_name,
            family = artifact.classifier.family(),
            version = artifact.artifact_version.as_deref().unwrap_or("unversioned"),
            columns = artifact.columns.len(),
            threshold = artifact.decision_threshold,
            "Pipeline artifact loaded"
        );

        Ok(artifact)
    }
}

/// Read a `{request_name: canonical_name}` JSON object.
pub fn load_field_map<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| {
        PipelineError::load(format!("cannot read field map {}: {}", path.display(), e))
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| PipelineError::load(format!("invalid field map {}: {}", path.display(), e)))
}
