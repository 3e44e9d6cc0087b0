//! Prediction results and response payloads

use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary outcome of the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankruptcyLabel {
    NotBankrupt,
    Bankrupt,
}

impl BankruptcyLabel {
    /// Label implied by a positive-class probability and decision threshold.
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        if probability >= threshold {
            BankruptcyLabel::Bankrupt
        } else {
            BankruptcyLabel::NotBankrupt
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            BankruptcyLabel::NotBankrupt => 0,
            BankruptcyLabel::Bankrupt => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BankruptcyLabel::NotBankrupt => "Not Bankrupt",
            BankruptcyLabel::Bankrupt => "Bankrupt",
        }
    }
}

impl fmt::Display for BankruptcyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running one record through the pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionResult {
    pub label: BankruptcyLabel,
    /// Probability of the positive (bankrupt) class, in [0, 1]
    pub probability: f64,
}

/// Single prediction response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: u8,
    pub probability: f64,
    pub prediction_label: String,
}

impl From<&PredictionResult> for PredictResponse {
    fn from(result: &PredictionResult) -> Self {
        Self {
            prediction: result.label.as_u8(),
            probability: result.probability,
            prediction_label: result.label.as_str().to_string(),
        }
    }
}

/// Batch response body; index `i` of every list belongs to input record `i`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchPredictResponse {
    pub predictions: Vec<u8>,
    pub probabilities: Vec<f64>,
    pub prediction_labels: Vec<String>,
}

impl BatchPredictResponse {
    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }
}

impl<'a> FromIterator<&'a PredictionResult> for BatchPredictResponse {
    fn from_iter<I: IntoIterator<Item = &'a PredictionResult>>(iter: I) -> Self {
        let mut response = BatchPredictResponse::default();
        for result in iter {
            response.predictions.push(result.label.as_u8());
            response.probabilities.push(result.probability);
            response
                .prediction_labels
                .push(result.label.as_str().to_string());
        }
        response
    }
}
