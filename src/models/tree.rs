//! Tree-based classifiers: single decision tree, random forest, gradient boosting.
//!
//! Trees use a flat node array: a split node sends `x[feature] <= threshold`
//! to `left`, everything else to `right`. Children always sit after their
//! parent in the array, which keeps traversal bounded.

use crate::error::{PipelineError, Result};
use crate::models::classifier::{sigmoid, Classifier};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(default)]
    pub left: Option<usize>,
    #[serde(default)]
    pub right: Option<usize>,
    #[serde(default)]
    pub feature: usize,
    #[serde(default)]
    pub threshold: f64,
    /// Class weights `[n_not_bankrupt, n_bankrupt]` for classification
    /// trees, `[output]` for regression trees
    #[serde(default)]
    pub value: Vec<f64>,
}

impl TreeNode {
    fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub n_features: usize,
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Leaf reached by `features`.
    fn leaf(&self, features: &[f64]) -> &TreeNode {
        let mut index = 0;
        loop {
            let node = &self.nodes[index];
            match (node.left, node.right) {
                (Some(left), Some(right)) => {
                    index = if features[node.feature] <= node.threshold {
                        left
                    } else {
                        right
                    };
                }
                _ => return node,
            }
        }
    }

    /// Positive-class fraction at the reached leaf.
    pub fn class_probability(&self, features: &[f64]) -> f64 {
        let value = &self.leaf(features).value;
        let total: f64 = value.iter().sum();
        value.get(1).copied().unwrap_or(0.0) / total
    }

    /// Raw output of a regression tree.
    pub fn leaf_value(&self, features: &[f64]) -> f64 {
        self.leaf(features).value.first().copied().unwrap_or(f64::NAN)
    }

    fn validate_structure(&self) -> Result<()> {
        if self.n_features == 0 {
            return Err(PipelineError::load("tree n_features must be positive"));
        }
        if self.nodes.is_empty() {
            return Err(PipelineError::load("tree has no nodes"));
        }

        for (i, node) in self.nodes.iter().enumerate() {
            match (node.left, node.right) {
                (None, None) => {}
                (Some(left), Some(right)) => {
                    for child in [left, right] {
                        if child <= i || child >= self.nodes.len() {
                            return Err(PipelineError::load(format!(
                                "tree node {} has out-of-order child {}",
                                i, child
                            )));
                        }
                    }
                    if node.feature >= self.n_features {
                        return Err(PipelineError::load(format!(
                            "tree node {} splits on feature {} of {}",
                            i, node.feature, self.n_features
                        )));
                    }
                    if !node.threshold.is_finite() {
                        return Err(PipelineError::load(format!(
                            "tree node {} has a non-finite threshold",
                            i
                        )));
                    }
                }
                _ => {
                    return Err(PipelineError::load(format!(
                        "tree node {} has only one child",
                        i
                    )))
                }
            }
        }
        Ok(())
    }

    /// Validation for trees whose leaves hold class weights.
    pub fn validate_classifier(&self) -> Result<()> {
        self.validate_structure()?;
        for (i, node) in self.nodes.iter().enumerate().filter(|(_, n)| n.is_leaf()) {
            let valid = node.value.len() == 2
                && node.value.iter().all(|v| v.is_finite() && *v >= 0.0)
                && node.value.iter().sum::<f64>() > 0.0;
            if !valid {
                return Err(PipelineError::load(format!(
                    "tree leaf {} must hold two non-negative class weights",
                    i
                )));
            }
        }
        Ok(())
    }

    /// Validation for trees whose leaves hold a single regression output.
    pub fn validate_regressor(&self) -> Result<()> {
        self.validate_structure()?;
        for (i, node) in self.nodes.iter().enumerate().filter(|(_, n)| n.is_leaf()) {
            if node.value.is_empty() || !node.value[0].is_finite() {
                return Err(PipelineError::load(format!(
                    "regression tree leaf {} has no finite output",
                    i
                )));
            }
        }
        Ok(())
    }
}

impl Classifier for DecisionTree {
    fn family(&self) -> &'static str {
        "decision_tree"
    }

    fn input_dim(&self) -> usize {
        self.n_features
    }

    fn probability(&self, features: &[f64]) -> f64 {
        self.class_probability(features)
    }
}

fn check_same_dim(trees: &[DecisionTree], what: &str) -> Result<usize> {
    let dim = trees
        .first()
        .map(|t| t.n_features)
        .ok_or_else(|| PipelineError::load(format!("{} has no trees", what)))?;
    if trees.iter().any(|t| t.n_features != dim) {
        return Err(PipelineError::load(format!(
            "{} trees disagree on n_features",
            what
        )));
    }
    Ok(dim)
}

/// Mean of the member trees' class probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn validate(&self) -> Result<()> {
        check_same_dim(&self.trees, "random forest")?;
        self.trees.iter().try_for_each(DecisionTree::validate_classifier)
    }
}

impl Classifier for RandomForest {
    fn family(&self) -> &'static str {
        "random_forest"
    }

    fn input_dim(&self) -> usize {
        self.trees.first().map(|t| t.n_features).unwrap_or(0)
    }

    fn probability(&self, features: &[f64]) -> f64 {
        let sum: f64 = self
            .trees
            .iter()
            .map(|t| t.class_probability(features))
            .sum();
        sum / self.trees.len() as f64
    }
}

/// Binary log-loss boosting: `sigmoid(init + learning_rate * sum(tree(x)))`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    /// Initial raw prediction (prior log-odds)
    pub init: f64,
    pub learning_rate: f64,
    pub trees: Vec<DecisionTree>,
}

impl GradientBoosting {
    pub fn raw_score(&self, features: &[f64]) -> f64 {
        self.init
            + self.learning_rate
                * self
                    .trees
                    .iter()
                    .map(|t| t.leaf_value(features))
                    .sum::<f64>()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.init.is_finite() || !self.learning_rate.is_finite() || self.learning_rate <= 0.0
        {
            return Err(PipelineError::load(
                "gradient boosting init/learning_rate must be finite, learning_rate positive",
            ));
        }
        check_same_dim(&self.trees, "gradient boosting")?;
        self.trees.iter().try_for_each(DecisionTree::validate_regressor)
    }
}

impl Classifier for GradientBoosting {
    fn family(&self) -> &'static str {
        "gradient_boosting"
    }

    fn input_dim(&self) -> usize {
        self.trees.first().map(|t| t.n_features).unwrap_or(0)
    }

    fn probability(&self, features: &[f64]) -> f64 {
        sigmoid(self.raw_score(features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn split(feature: usize, threshold: f64, left: usize, right: usize) -> TreeNode {
        TreeNode {
            left: Some(left),
            right: Some(right),
            feature,
            threshold,
            value: Vec::new(),
        }
    }

    fn leaf(value: Vec<f64>) -> TreeNode {
        TreeNode {
            left: None,
            right: None,
            feature: 0,
            threshold: 0.0,
            value,
        }
    }

    /// x0 <= 0 -> [9, 1]; else x1 <= 1 -> [2, 2] else [0, 5]
    fn stump_tree() -> DecisionTree {
        DecisionTree {
            n_features: 2,
            nodes: vec![
                split(0, 0.0, 1, 2),
                leaf(vec![9.0, 1.0]),
                split(1, 1.0, 3, 4),
                leaf(vec![2.0, 2.0]),
                leaf(vec![0.0, 5.0]),
            ],
        }
    }

    #[test]
    fn test_decision_tree_paths() {
        let tree = stump_tree();
        tree.validate_classifier().unwrap();

        assert_relative_eq!(tree.probability(&[-1.0, 9.0]), 0.1);
        // threshold is inclusive on the left
        assert_relative_eq!(tree.probability(&[0.0, 9.0]), 0.1);
        assert_relative_eq!(tree.probability(&[0.5, 1.0]), 0.5);
        assert_relative_eq!(tree.probability(&[0.5, 1.5]), 1.0);
    }

    #[test]
    fn test_random_forest_averages() {
        let always_one = DecisionTree {
            n_features: 2,
            nodes: vec![leaf(vec![0.0, 1.0])],
        };
        let forest = RandomForest {
            trees: vec![stump_tree(), always_one],
        };
        forest.validate().unwrap();
        assert_relative_eq!(forest.probability(&[-1.0, 0.0]), (0.1 + 1.0) / 2.0);
    }

    #[test]
    fn test_gradient_boosting() {
        let tree = DecisionTree {
            n_features: 1,
            nodes: vec![split(0, 0.0, 1, 2), leaf(vec![-2.0]), leaf(vec![3.0])],
        };
        let model = GradientBoosting {
            init: -1.0,
            learning_rate: 0.5,
            trees: vec![tree.clone(), tree],
        };
        model.validate().unwrap();

        assert_relative_eq!(model.raw_score(&[1.0]), -1.0 + 0.5 * 6.0);
        assert_relative_eq!(model.probability(&[-1.0]), sigmoid(-3.0));
    }

    #[test]
    fn test_tree_validation_rejects_cycles_and_bad_features() {
        let mut tree = stump_tree();
        tree.nodes[2] = split(1, 1.0, 0, 4);
        assert!(tree.validate_classifier().is_err());

        let mut tree = stump_tree();
        tree.nodes[0] = split(7, 0.0, 1, 2);
        assert!(tree.validate_classifier().is_err());

        let mut tree = stump_tree();
        tree.nodes[1] = leaf(vec![0.0, 0.0]);
        assert!(tree.validate_classifier().is_err());

        let mut tree = stump_tree();
        tree.nodes[0].right = None;
        assert!(tree.validate_classifier().is_err());
    }
}
