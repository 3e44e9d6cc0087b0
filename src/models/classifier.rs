//! Classifier decision functions over standardized feature vectors.
//!
//! Every family exposes the same capability: a positive-class probability
//! that is a fixed, deterministic function of the input. The label is
//! derived from that probability and the pipeline's decision threshold.

use crate::error::{PipelineError, Result};
use crate::models::knn::KnnClassifier;
use crate::models::tree::{DecisionTree, GradientBoosting, RandomForest};
use crate::types::{BankruptcyLabel, PredictionResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Decision function shared by all classifier families.
pub trait Classifier: Send + Sync {
    /// Short family identifier, e.g. `knn`
    fn family(&self) -> &'static str;

    /// Number of features the model was fit on
    fn input_dim(&self) -> usize;

    /// Probability of the bankrupt class for a standardized vector
    fn probability(&self, features: &[f64]) -> f64;

    /// Label and probability, `label = Bankrupt` iff `probability >= threshold`.
    fn decide(&self, features: &[f64], threshold: f64) -> Result<PredictionResult> {
        let probability = self.probability(features);
        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(PipelineError::Internal(format!(
                "{} classifier produced invalid probability {}",
                self.family(),
                probability
            )));
        }

        Ok(PredictionResult {
            label: BankruptcyLabel::from_probability(probability, threshold),
            probability,
        })
    }
}

/// Logistic function, stable for large |z|.
pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn check_finite(values: &[f64], what: &str) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(PipelineError::load(format!("{} contains non-finite values", what)))
    }
}

/// Serialized classifier parameters, tagged by family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClassifierModel {
    Knn(KnnClassifier),
    LogisticRegression(LogisticRegression),
    Svm(SvmClassifier),
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
    NeuralNetwork(NeuralNetwork),
}

impl ClassifierModel {
    /// Structural validation, run once at load time.
    pub fn validate(&self) -> Result<()> {
        match self {
            ClassifierModel::Knn(m) => m.validate(),
            ClassifierModel::LogisticRegression(m) => m.validate(),
            ClassifierModel::Svm(m) => m.validate(),
            ClassifierModel::DecisionTree(m) => m.validate_classifier(),
            ClassifierModel::RandomForest(m) => m.validate(),
            ClassifierModel::GradientBoosting(m) => m.validate(),
            ClassifierModel::NeuralNetwork(m) => m.validate(),
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            ClassifierModel::Knn(m) => m,
            ClassifierModel::LogisticRegression(m) => m,
            ClassifierModel::Svm(m) => m,
            ClassifierModel::DecisionTree(m) => m,
            ClassifierModel::RandomForest(m) => m,
            ClassifierModel::GradientBoosting(m) => m,
            ClassifierModel::NeuralNetwork(m) => m,
        }
    }

    pub fn into_shared(self) -> Arc<dyn Classifier> {
        Arc::new(self)
    }
}

impl Classifier for ClassifierModel {
    fn family(&self) -> &'static str {
        self.inner().family()
    }

    fn input_dim(&self) -> usize {
        self.inner().input_dim()
    }

    fn probability(&self, features: &[f64]) -> f64 {
        self.inner().probability(features)
    }
}

/// `sigmoid(w . x + b)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coef: Vec<f64>,
    pub intercept: f64,
}

impl LogisticRegression {
    pub fn validate(&self) -> Result<()> {
        if self.coef.is_empty() {
            return Err(PipelineError::load("logistic regression has no coefficients"));
        }
        check_finite(&self.coef, "logistic regression coefficients")?;
        check_finite(&[self.intercept], "logistic regression intercept")
    }
}

impl Classifier for LogisticRegression {
    fn family(&self) -> &'static str {
        "logistic_regression"
    }

    fn input_dim(&self) -> usize {
        self.coef.len()
    }

    fn probability(&self, features: &[f64]) -> f64 {
        sigmoid(dot(&self.coef, features) + self.intercept)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Kernel {
    Linear,
    Rbf { gamma: f64 },
}

impl Kernel {
    fn eval(&self, a: &[f64], b: &[f64]) -> f64 {
        match *self {
            Kernel::Linear => dot(a, b),
            Kernel::Rbf { gamma } => {
                let sq: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
                (-gamma * sq).exp()
            }
        }
    }
}

/// Support-vector machine with Platt-scaled probabilities.
///
/// Decision value `f = sum(dual_coef[i] * K(sv[i], x)) + intercept`; the
/// positive-class probability is `1 / (1 + exp(platt_a * f + platt_b))`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmClassifier {
    pub kernel: Kernel,
    pub support_vectors: Vec<Vec<f64>>,
    pub dual_coef: Vec<f64>,
    pub intercept: f64,
    pub platt_a: f64,
    pub platt_b: f64,
}

impl SvmClassifier {
    pub fn decision_value(&self, features: &[f64]) -> f64 {
        self.support_vectors
            .iter()
            .zip(&self.dual_coef)
            .map(|(sv, alpha)| alpha * self.kernel.eval(sv, features))
            .sum::<f64>()
            + self.intercept
    }

    pub fn validate(&self) -> Result<()> {
        let dim = self
            .support_vectors
            .first()
            .map(Vec::len)
            .ok_or_else(|| PipelineError::load("svm has no support vectors"))?;
        if dim == 0 {
            return Err(PipelineError::load("svm support vectors are empty"));
        }
        if self.support_vectors.iter().any(|sv| sv.len() != dim) {
            return Err(PipelineError::load("svm support vectors differ in length"));
        }
        if self.dual_coef.len() != self.support_vectors.len() {
            return Err(PipelineError::load(format!(
                "svm has {} dual coefficients for {} support vectors",
                self.dual_coef.len(),
                self.support_vectors.len()
            )));
        }
        for sv in &self.support_vectors {
            check_finite(sv, "svm support vector")?;
        }
        check_finite(&self.dual_coef, "svm dual coefficients")?;
        check_finite(
            &[self.intercept, self.platt_a, self.platt_b],
            "svm intercept/Platt parameters",
        )?;
        if let Kernel::Rbf { gamma } = self.kernel {
            if !gamma.is_finite() || gamma <= 0.0 {
                return Err(PipelineError::load("svm rbf gamma must be positive"));
            }
        }
        Ok(())
    }
}

impl Classifier for SvmClassifier {
    fn family(&self) -> &'static str {
        "svm"
    }

    fn input_dim(&self) -> usize {
        self.support_vectors.first().map(Vec::len).unwrap_or(0)
    }

    fn probability(&self, features: &[f64]) -> f64 {
        let f = self.decision_value(features);
        sigmoid(-(self.platt_a * f + self.platt_b))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Relu,
    Tanh,
    Logistic,
    Identity,
}

impl Activation {
    fn apply(&self, z: f64) -> f64 {
        match self {
            Activation::Relu => z.max(0.0),
            Activation::Tanh => z.tanh(),
            Activation::Logistic => sigmoid(z),
            Activation::Identity => z,
        }
    }
}

/// Fully connected layer; `weights[i][j]` connects input `i` to output `j`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub biases: Vec<f64>,
}

impl DenseLayer {
    fn inputs(&self) -> usize {
        self.weights.len()
    }

    fn outputs(&self) -> usize {
        self.biases.len()
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        let mut out = self.biases.clone();
        for (x, row) in input.iter().zip(&self.weights) {
            for (o, w) in out.iter_mut().zip(row) {
                *o += x * w;
            }
        }
        out
    }
}

/// Multi-layer perceptron with a single logistic output unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralNetwork {
    #[serde(default)]
    pub activation: Activation,
    pub layers: Vec<DenseLayer>,
}

impl NeuralNetwork {
    pub fn validate(&self) -> Result<()> {
        let first = self
            .layers
            .first()
            .ok_or_else(|| PipelineError::load("neural network has no layers"))?;
        if first.inputs() == 0 {
            return Err(PipelineError::load("neural network input layer is empty"));
        }

        let mut expected_inputs = first.inputs();
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.inputs() != expected_inputs {
                return Err(PipelineError::load(format!(
                    "neural network layer {} expects {} inputs, previous layer emits {}",
                    i,
                    layer.inputs(),
                    expected_inputs
                )));
            }
            if layer.weights.iter().any(|row| row.len() != layer.outputs()) {
                return Err(PipelineError::load(format!(
                    "neural network layer {} weight rows do not match its {} biases",
                    i,
                    layer.outputs()
                )));
            }
            for row in &layer.weights {
                check_finite(row, "neural network weights")?;
            }
            check_finite(&layer.biases, "neural network biases")?;
            expected_inputs = layer.outputs();
        }

        if expected_inputs != 1 {
            return Err(PipelineError::load(format!(
                "neural network must end in a single output unit, got {}",
                expected_inputs
            )));
        }
        Ok(())
    }
}

impl Classifier for NeuralNetwork {
    fn family(&self) -> &'static str {
        "neural_network"
    }

    fn input_dim(&self) -> usize {
        self.layers.first().map(DenseLayer::inputs).unwrap_or(0)
    }

    fn probability(&self, features: &[f64]) -> f64 {
        let last = self.layers.len().saturating_sub(1);
        let mut activations = features.to_vec();

        for (i, layer) in self.layers.iter().enumerate() {
            let mut z = layer.forward(&activations);
            if i < last {
                for v in z.iter_mut() {
                    *v = self.activation.apply(*v);
                }
            }
            activations = z;
        }

        activations.first().copied().map(sigmoid).unwrap_or(f64::NAN)
    }
}
