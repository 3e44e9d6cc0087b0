//! Inference pipeline: reconcile -> validate -> clip -> scale -> decide

use crate::config::AppConfig;
use crate::error::{PipelineError, Result};
use crate::models::classifier::Classifier;
use crate::models::loader::{load_field_map, ArtifactLoader, PipelineArtifact};
use crate::models::transforms::{StandardScaler, Winsorizer};
use crate::reconciler::{ColumnReconciler, NamingConvention};
use crate::types::{FeatureRecord, PredictionResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Frozen preprocessing + classifier chain.
///
/// Every field is immutable after construction, so one instance can be
/// shared across any number of concurrent requests.
pub struct InferencePipeline {
    model_name: String,
    artifact_version: Option<String>,
    reconciler: ColumnReconciler,
    winsorizer: Winsorizer,
    scaler: StandardScaler,
    classifier: Arc<dyn Classifier>,
    /// `label = Bankrupt` iff `probability >= threshold`
    threshold: f64,
}

impl InferencePipeline {
    /// Load the artifact named in the configuration and build the pipeline.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let loader = ArtifactLoader::with_expected_feature_count(
            config.pipeline.expected_feature_count,
        );
        let artifact = loader.load(&config.pipeline.artifact_path)?;

        let field_map = match &config.pipeline.field_map_path {
            Some(path) => Some(load_field_map(path)?),
            None => None,
        };

        let pipeline = Self::from_artifact(
            artifact,
            config.pipeline.naming,
            field_map.as_ref(),
            config.pipeline.strict_fields,
            config.detection.threshold,
        )?;

        info!(
            model = %pipeline.model_name,
            family = pipeline.family(),
            features = pipeline.feature_count(),
            naming = config.pipeline.naming.as_str(),
            strict = config.pipeline.strict_fields,
            threshold = pipeline.threshold,
            "Inference pipeline initialized"
        );

        Ok(pipeline)
    }

    /// Build from an already loaded (and validated) artifact.
    pub fn from_artifact(
        artifact: PipelineArtifact,
        naming: NamingConvention,
        field_map: Option<&HashMap<String, String>>,
        strict: bool,
        threshold_override: Option<f64>,
    ) -> Result<Self> {
        artifact.validate(None)?;

        let reconciler = ColumnReconciler::new(&artifact.columns, naming, field_map, strict)?;

        let threshold = match threshold_override {
            Some(t) if t != artifact.decision_threshold => {
                warn!(
                    artifact_threshold = artifact.decision_threshold,
                    configured_threshold = t,
                    "Overriding the artifact's decision threshold"
                );
                t
            }
            _ => artifact.decision_threshold,
        };

        let mut pipeline = Self::from_parts(
            reconciler,
            artifact.winsorizer,
            artifact.scaler,
            artifact.classifier.into_shared(),
            threshold,
        )?;
        pipeline.model_name = artifact.model_name;
        pipeline.artifact_version = artifact.artifact_version;
        Ok(pipeline)
    }

    /// Assemble a pipeline from individual components, checking that their
    /// dimensions agree.
    pub fn from_parts(
        reconciler: ColumnReconciler,
        winsorizer: Winsorizer,
        scaler: StandardScaler,
        classifier: Arc<dyn Classifier>,
        threshold: f64,
    ) -> Result<Self> {
        let n = reconciler.feature_count();
        if winsorizer.len() != n || scaler.len() != n || classifier.input_dim() != n {
            return Err(PipelineError::load(format!(
                "component dimensions disagree: {} columns, {} clip bounds, {} scaler entries, \
                 classifier expects {}",
                n,
                winsorizer.len(),
                scaler.len(),
                classifier.input_dim()
            )));
        }
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(PipelineError::load(format!(
                "decision threshold must be within [0, 1], got {}",
                threshold
            )));
        }

        Ok(Self {
            model_name: classifier.family().to_string(),
            artifact_version: None,
            reconciler,
            winsorizer,
            scaler,
            classifier,
            threshold,
        })
    }

    /// Clip and standardize a canonical-order vector.
    ///
    /// Non-finite values are rejected before they reach the clip.
    pub fn transform(&self, mut values: Vec<f64>) -> Result<Vec<f64>> {
        if values.len() != self.feature_count() {
            return Err(PipelineError::Validation(format!(
                "expected {} values, got {}",
                self.feature_count(),
                values.len()
            )));
        }

        if let Some((i, &value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(PipelineError::InvalidValue {
                column: self.reconciler.columns()[i].clone(),
                value,
            });
        }

        self.winsorizer.transform(&mut values);
        self.scaler.transform(&mut values);
        Ok(values)
    }

    /// Run a canonical-order vector through clip, scale and classifier.
    pub fn predict_vector(&self, values: Vec<f64>) -> Result<PredictionResult> {
        let standardized = self.transform(values)?;
        self.classifier.decide(&standardized, self.threshold)
    }

    /// Predict a single record.
    pub fn predict(&self, record: &FeatureRecord) -> Result<PredictionResult> {
        let values = self.reconciler.reconcile(record)?;
        let result = self.predict_vector(values)?;

        debug!(
            probability = result.probability,
            label = %result.label,
            "Record scored"
        );

        Ok(result)
    }

    /// Predict every record of a batch, preserving input order.
    ///
    /// The first failing record aborts the batch; its index is carried in
    /// [`PipelineError::BatchRecord`].
    pub fn predict_batch(&self, records: &[FeatureRecord]) -> Result<Vec<PredictionResult>> {
        records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                self.predict(record).map_err(|e| PipelineError::BatchRecord {
                    index,
                    source: Box::new(e),
                })
            })
            .collect()
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn artifact_version(&self) -> Option<&str> {
        self.artifact_version.as_deref()
    }

    pub fn family(&self) -> &'static str {
        self.classifier.family()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn feature_count(&self) -> usize {
        self.reconciler.feature_count()
    }

    pub fn reconciler(&self) -> &ColumnReconciler {
        &self.reconciler
    }

    pub fn winsorizer(&self) -> &Winsorizer {
        &self.winsorizer
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::classifier::LogisticRegression;
    use crate::types::BankruptcyLabel;
    use approx::assert_relative_eq;

    fn columns() -> Vec<String> {
        vec!["Debt ratio %".to_string(), "Cash/Total Assets".to_string()]
    }

    /// Two columns: bounds [0, 10] and [-5, 5], means (5, 0), stds (2, 2.5)
    fn two_column_pipeline(classifier: Arc<dyn Classifier>, threshold: f64) -> InferencePipeline {
        let reconciler =
            ColumnReconciler::new(&columns(), NamingConvention::SnakeCase, None, true).unwrap();
        let winsorizer = Winsorizer::new(vec![0.0, -5.0], vec![10.0, 5.0]).unwrap();
        let scaler = StandardScaler::new(vec![5.0, 0.0], vec![2.0, 2.5]).unwrap();
        InferencePipeline::from_parts(reconciler, winsorizer, scaler, classifier, threshold)
            .unwrap()
    }

    fn logistic() -> Arc<dyn Classifier> {
        Arc::new(LogisticRegression {
            coef: vec![1.0, 1.0],
            intercept: 0.0,
        })
    }

    fn record(debt: f64, cash: f64) -> FeatureRecord {
        [("debt_ratio", debt), ("cash_total_assets", cash)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_fixed_two_column_example() {
        let pipeline = two_column_pipeline(logistic(), 0.5);
        let standardized = pipeline.transform(vec![15.0, -10.0]).unwrap();
        // clipped (10, -5), then ((10 - 5) / 2, (-5 - 0) / 2.5)
        assert_relative_eq!(standardized[0], 2.5);
        assert_relative_eq!(standardized[1], -2.0);

        let result = pipeline.predict(&record(15.0, -10.0)).unwrap();
        let expected = 1.0 / (1.0 + (-0.5f64).exp());
        assert_relative_eq!(result.probability, expected, epsilon = 1e-12);
        assert_eq!(result.label, BankruptcyLabel::Bankrupt);
    }

    #[test]
    fn test_mean_record_standardizes_to_zero() {
        let pipeline = two_column_pipeline(logistic(), 0.5);
        let standardized = pipeline.transform(vec![5.0, 0.0]).unwrap();
        assert_eq!(standardized, vec![0.0, 0.0]);

        let result = pipeline.predict(&record(5.0, 0.0)).unwrap();
        assert_relative_eq!(result.probability, 0.5);
    }

    #[test]
    fn test_transform_is_deterministic() {
        let pipeline = two_column_pipeline(logistic(), 0.5);
        let a = pipeline.transform(vec![3.3, 4.9]).unwrap();
        let b = pipeline.transform(vec![3.3, 4.9]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_finite_value_rejected() {
        let pipeline = two_column_pipeline(logistic(), 0.5);
        match pipeline.predict(&record(1.0, f64::NAN)).unwrap_err() {
            PipelineError::InvalidValue { column, .. } => assert_eq!(column, "Cash/Total Assets"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            pipeline.transform(vec![f64::INFINITY, 0.0]).unwrap_err(),
            PipelineError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_threshold_controls_label() {
        // standardized (0, -0.4) -> z = -0.4 -> p ~ 0.401
        let strict = two_column_pipeline(logistic(), 0.5);
        let lenient = two_column_pipeline(logistic(), 0.4);
        let r = record(5.0, -1.0);
        assert_eq!(strict.predict(&r).unwrap().label, BankruptcyLabel::NotBankrupt);
        assert_eq!(lenient.predict(&r).unwrap().label, BankruptcyLabel::Bankrupt);
    }

    #[test]
    fn test_batch_preserves_order() {
        let pipeline = two_column_pipeline(logistic(), 0.5);
        let records = vec![record(0.0, -5.0), record(10.0, 5.0), record(5.0, 0.0)];
        let results = pipeline.predict_batch(&records).unwrap();

        assert_eq!(results.len(), records.len());
        for (record, result) in records.iter().zip(&results) {
            assert_eq!(*result, pipeline.predict(record).unwrap());
        }
        assert!(results[0].probability < results[2].probability);
        assert!(results[2].probability < results[1].probability);
    }

    #[test]
    fn test_batch_aborts_with_record_index() {
        let pipeline = two_column_pipeline(logistic(), 0.5);
        let mut incomplete = FeatureRecord::new();
        incomplete.insert("debt_ratio", 1.0);
        let records = vec![record(1.0, 1.0), incomplete];

        match pipeline.predict_batch(&records).unwrap_err() {
            PipelineError::BatchRecord { index, source } => {
                assert_eq!(index, 1);
                assert!(matches!(*source, PipelineError::MissingColumns { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_batch() {
        let pipeline = two_column_pipeline(logistic(), 0.5);
        assert!(pipeline.predict_batch(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_from_parts_rejects_dimension_mismatch() {
        let reconciler =
            ColumnReconciler::new(&columns(), NamingConvention::Canonical, None, true).unwrap();
        let winsorizer = Winsorizer::new(vec![0.0], vec![1.0]).unwrap();
        let scaler = StandardScaler::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        let result = InferencePipeline::from_parts(reconciler, winsorizer, scaler, logistic(), 0.5);
        assert!(matches!(result, Err(PipelineError::PipelineLoad(_))));
    }

    /// A stand-in classifier that yields NaN for every input
    struct Broken;

    impl Classifier for Broken {
        fn family(&self) -> &'static str {
            "broken"
        }

        fn input_dim(&self) -> usize {
            2
        }

        fn probability(&self, _features: &[f64]) -> f64 {
            f64::NAN
        }
    }

    #[test]
    fn test_invalid_probability_is_internal_error() {
        let pipeline = two_column_pipeline(Arc::new(Broken), 0.5);
        let err = pipeline.predict(&record(1.0, 1.0)).unwrap_err();
        assert!(matches!(err, PipelineError::Internal(_)));
        assert!(!err.is_client_error());
    }
}
