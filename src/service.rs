//! Transport-independent request handling.
//!
//! HTTP and NATS both hand raw request bodies to [`PredictionService`],
//! which parses, scores and records metrics. Errors come back as
//! [`PipelineError`] for the transport to translate.

use crate::error::{PipelineError, Result};
use crate::metrics::PipelineMetrics;
use crate::models::InferencePipeline;
use crate::reconciler::NamingConvention;
use crate::types::{
    BatchPredictResponse, BatchRequest, FeatureRecord, PredictResponse, PredictionResult,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Operations exposed by the service, published by the info endpoint
pub const OPERATIONS: &[Operation] = &[
    Operation {
        method: "POST",
        path: "/predict",
        description: "Predict bankruptcy for one record",
    },
    Operation {
        method: "POST",
        path: "/predict/batch",
        description: "Predict bankruptcy for an ordered list of records",
    },
    Operation {
        method: "GET",
        path: "/features",
        description: "List the expected request fields in canonical order",
    },
    Operation {
        method: "GET",
        path: "/health",
        description: "Liveness check",
    },
    Operation {
        method: "GET",
        path: "/metrics",
        description: "Service counters and latency statistics",
    },
];

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Operation {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
}

/// Static service metadata
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub model: String,
    pub classifier: &'static str,
    pub artifact_version: Option<String>,
    pub feature_count: usize,
    pub decision_threshold: f64,
    pub naming: &'static str,
    pub strict_fields: bool,
    pub operations: &'static [Operation],
}

/// One expected request field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSpec {
    /// Name to use in requests
    pub field: String,
    /// Canonical column the field maps to
    pub column: String,
    pub lower: f64,
    pub upper: f64,
    pub mean: f64,
}

#[derive(Clone)]
pub struct PredictionService {
    pipeline: Arc<InferencePipeline>,
    metrics: Arc<PipelineMetrics>,
    naming: NamingConvention,
    max_batch_size: usize,
}

impl PredictionService {
    pub fn new(
        pipeline: Arc<InferencePipeline>,
        metrics: Arc<PipelineMetrics>,
        naming: NamingConvention,
        max_batch_size: usize,
    ) -> Self {
        Self {
            pipeline,
            metrics,
            naming,
            max_batch_size,
        }
    }

    pub fn pipeline(&self) -> &InferencePipeline {
        &self.pipeline
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Score a single-record request body.
    pub fn predict_body(&self, request_id: &str, body: &[u8]) -> Result<PredictResponse> {
        let start = Instant::now();
        let outcome = FeatureRecord::from_slice(body).and_then(|r| self.pipeline.predict(&r));

        match outcome {
            Ok(result) => {
                self.metrics
                    .record_success(start.elapsed(), std::slice::from_ref(&result));
                debug!(
                    request_id = %request_id,
                    probability = result.probability,
                    label = %result.label,
                    latency_us = start.elapsed().as_micros() as u64,
                    "Prediction served"
                );
                Ok(PredictResponse::from(&result))
            }
            Err(e) => Err(self.reject(request_id, start, e)),
        }
    }

    /// Score a batch request body; any failing record aborts the batch.
    pub fn predict_batch_body(&self, request_id: &str, body: &[u8]) -> Result<BatchPredictResponse> {
        let start = Instant::now();

        match self.score_batch(body) {
            Ok(results) => {
                self.metrics.record_success(start.elapsed(), &results);
                debug!(
                    request_id = %request_id,
                    records = results.len(),
                    latency_us = start.elapsed().as_micros() as u64,
                    "Batch prediction served"
                );
                Ok(results.iter().collect())
            }
            Err(e) => Err(self.reject(request_id, start, e)),
        }
    }

    fn score_batch(&self, body: &[u8]) -> Result<Vec<PredictionResult>> {
        let batch = BatchRequest::from_slice(body)?;
        if batch.records.len() > self.max_batch_size {
            return Err(PipelineError::Validation(format!(
                "batch of {} records exceeds the limit of {}",
                batch.records.len(),
                self.max_batch_size
            )));
        }

        // One pass: parse and score each record before moving to the next
        batch
            .records
            .iter()
            .enumerate()
            .map(|(index, value)| {
                FeatureRecord::from_json(value)
                    .and_then(|record| self.pipeline.predict(&record))
                    .map_err(|e| PipelineError::BatchRecord {
                        index,
                        source: Box::new(e),
                    })
            })
            .collect()
    }

    fn reject(&self, request_id: &str, start: Instant, err: PipelineError) -> PipelineError {
        self.metrics.record_rejection(start.elapsed(), err.kind());
        if err.is_client_error() {
            warn!(request_id = %request_id, kind = err.kind(), error = %err, "Request rejected");
        } else {
            error!(request_id = %request_id, error = %err, "Prediction failed");
        }
        err
    }

    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            service: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            model: self.pipeline.model_name().to_string(),
            classifier: self.pipeline.family(),
            artifact_version: self.pipeline.artifact_version().map(str::to_string),
            feature_count: self.pipeline.feature_count(),
            decision_threshold: self.pipeline.threshold(),
            naming: self.naming.as_str(),
            strict_fields: self.pipeline.reconciler().is_strict(),
            operations: OPERATIONS,
        }
    }

    /// Expected request fields in canonical order, with training statistics.
    pub fn features(&self) -> Vec<FeatureSpec> {
        let reconciler = self.pipeline.reconciler();
        let winsorizer = self.pipeline.winsorizer();
        let scaler = self.pipeline.scaler();

        reconciler
            .fields()
            .iter()
            .zip(reconciler.columns())
            .enumerate()
            .map(|(i, (field, column))| FeatureSpec {
                field: field.clone(),
                column: column.clone(),
                lower: winsorizer.lower()[i],
                upper: winsorizer.upper()[i],
                mean: scaler.mean()[i],
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::loader::ArtifactLoader;
    use crate::types::BankruptcyLabel;
    use serde_json::{json, Map, Value};
    use std::path::Path;

    pub(crate) fn demo_service() -> PredictionService {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("models/demo_pipeline.json");
        let artifact = ArtifactLoader::new().load(path).unwrap();
        let pipeline = InferencePipeline::from_artifact(
            artifact,
            NamingConvention::SnakeCase,
            None,
            true,
            None,
        )
        .unwrap();
        PredictionService::new(
            Arc::new(pipeline),
            Arc::new(PipelineMetrics::new()),
            NamingConvention::SnakeCase,
            3,
        )
    }

    /// A record with every field at its training mean
    pub(crate) fn mean_record(service: &PredictionService) -> Value {
        let object: Map<String, Value> = service
            .features()
            .into_iter()
            .map(|f| (f.field, json!(f.mean)))
            .collect();
        Value::Object(object)
    }

    /// A record shaped like the bankrupt training cluster
    pub(crate) fn distressed_record() -> Value {
        json!({
            "roa_c_before_interest_and_depreciation_before_interest": 0.3803,
            "operating_gross_margin": 0.5850,
            "debt_ratio": 0.22,
            "net_worth_assets": 0.78,
            "cash_total_assets": 0.02,
            "net_income_to_total_assets": 0.72
        })
    }

    #[test]
    fn test_mean_record_round_trip() {
        let service = demo_service();
        let body = mean_record(&service).to_string();
        let response = service.predict_body("t1", body.as_bytes()).unwrap();
        assert_eq!(response.prediction, 0);
        assert_eq!(response.probability, 0.0);
        assert_eq!(response.prediction_label, "Not Bankrupt");
    }

    #[test]
    fn test_distressed_record_is_bankrupt() {
        let service = demo_service();
        let body = distressed_record().to_string();
        let response = service.predict_body("t2", body.as_bytes()).unwrap();
        assert_eq!(response.prediction, BankruptcyLabel::Bankrupt.as_u8());
        assert_eq!(response.probability, 1.0);
        assert_eq!(response.prediction_label, "Bankrupt");
    }

    #[test]
    fn test_batch_is_index_aligned() {
        let service = demo_service();
        let body = json!({
            "records": [distressed_record(), mean_record(&service), distressed_record()]
        })
        .to_string();

        let response = service.predict_batch_body("t3", body.as_bytes()).unwrap();
        assert_eq!(response.predictions, vec![1, 0, 1]);
        assert_eq!(response.probabilities.len(), 3);
        assert_eq!(
            response.prediction_labels,
            vec!["Bankrupt", "Not Bankrupt", "Bankrupt"]
        );
        assert_eq!(service.metrics().snapshot().predictions, 3);
    }

    #[test]
    fn test_batch_limit_and_bad_record() {
        let service = demo_service();
        let record = mean_record(&service);

        let body = json!({"records": vec![record.clone(); 4]}).to_string();
        let err = service.predict_batch_body("t4", body.as_bytes()).unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));

        let body = json!({"records": [record, "oops"]}).to_string();
        match service.predict_batch_body("t5", body.as_bytes()).unwrap_err() {
            PipelineError::BatchRecord { index, source } => {
                assert_eq!(index, 1);
                assert!(matches!(*source, PipelineError::Validation(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let snapshot = service.metrics().snapshot();
        assert_eq!(snapshot.rejections.get("validation_error"), Some(&2));
    }

    #[test]
    fn test_batch_reports_first_failing_record() {
        let service = demo_service();
        let mut incomplete = mean_record(&service);
        incomplete.as_object_mut().unwrap().remove("debt_ratio");

        let body = json!({"records": [incomplete, "oops"]}).to_string();
        match service.predict_batch_body("t6", body.as_bytes()).unwrap_err() {
            PipelineError::BatchRecord { index, source } => {
                assert_eq!(index, 0);
                match *source {
                    PipelineError::MissingColumns { columns } => {
                        assert_eq!(columns, vec![" Debt ratio %".to_string()]);
                    }
                    other => panic!("unexpected error: {other:?}"),
                }
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_features_are_published_in_canonical_order() {
        let service = demo_service();
        let features = service.features();
        assert_eq!(features.len(), 6);
        assert_eq!(
            features[0].field,
            "roa_c_before_interest_and_depreciation_before_interest"
        );
        assert_eq!(features[2].column, " Debt ratio %");
        assert_eq!(features[2].field, "debt_ratio");
    }

    #[test]
    fn test_info() {
        let service = demo_service();
        let info = service.info();
        assert_eq!(info.model, "knn");
        assert_eq!(info.classifier, "knn");
        assert_eq!(info.feature_count, 6);
        assert_eq!(info.naming, "snake_case");
        assert_eq!(info.decision_threshold, 0.5);
    }
}
