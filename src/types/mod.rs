//! Request and response types for the prediction service

pub mod prediction;
pub mod record;

pub use prediction::{BankruptcyLabel, BatchPredictResponse, PredictResponse, PredictionResult};
pub use record::{BatchRequest, FeatureRecord};
