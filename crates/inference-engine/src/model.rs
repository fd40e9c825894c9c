//! Gradient-Boosted Tree Ensemble
//!
//! Binary classifier stored as a JSON list of trees. Each tree is a flat
//! node array; node 0 is the root and children always sit after their
//! parent, so a single reverse pass computes subtree expectations.

use crate::InferenceError;
use feature_engine::{ColumnKind, FeatureSchema};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Model artifact file name
pub const MODEL_FILE: &str = "model.json";

/// A tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    /// Numeric split: `value < threshold` goes left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        /// Direction taken when the value is missing
        #[serde(default)]
        default_left: bool,
        /// Training rows reaching this node (hessian sum)
        #[serde(default = "unit_cover")]
        cover: f64,
    },
    /// Categorical split: codes listed in `categories` go left
    CategorySplit {
        feature: usize,
        categories: Vec<u32>,
        left: usize,
        right: usize,
        #[serde(default)]
        default_left: bool,
        #[serde(default = "unit_cover")]
        cover: f64,
    },
    Leaf {
        value: f64,
        #[serde(default = "unit_cover")]
        cover: f64,
    },
}

fn unit_cover() -> f64 {
    1.0
}

impl Node {
    fn cover(&self) -> f64 {
        match self {
            Node::Split { cover, .. } | Node::CategorySplit { cover, .. } | Node::Leaf { cover, .. } => *cover,
        }
    }

    fn children(&self) -> Option<(usize, usize)> {
        match self {
            Node::Split { left, right, .. } | Node::CategorySplit { left, right, .. } => Some((*left, *right)),
            Node::Leaf { .. } => None,
        }
    }

    /// Child index taken for an input row; `None` at a leaf
    fn next(&self, inputs: &[Option<f64>]) -> Option<usize> {
        match self {
            Node::Split { feature, threshold, left, right, default_left, .. } => {
                Some(match inputs.get(*feature).copied().flatten() {
                    Some(v) if v < *threshold => *left,
                    Some(_) => *right,
                    None if *default_left => *left,
                    None => *right,
                })
            }
            Node::CategorySplit { feature, categories, left, right, default_left, .. } => {
                Some(match inputs.get(*feature).copied().flatten() {
                    Some(code) if categories.iter().any(|c| f64::from(*c) == code) => *left,
                    Some(_) => *right,
                    None if *default_left => *left,
                    None => *right,
                })
            }
            Node::Leaf { .. } => None,
        }
    }
}

/// A single decision tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

/// Serialized ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    /// Initial margin (log-odds) before any tree
    pub base_score: f64,
    /// Column order the model was trained on, when exported
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    pub trees: Vec<Tree>,
}

/// Per-feature additive contributions for one row
#[derive(Debug, Clone, PartialEq)]
pub struct Contributions {
    /// Expected margin over the training distribution
    pub base_value: f64,
    /// One entry per model feature, in schema order
    pub values: Vec<f64>,
}

/// Scoring seam between the prediction façade and a concrete model
pub trait RiskModel: Send + Sync {
    /// Number of input columns
    fn num_features(&self) -> usize;

    /// Number of trees (reported by health checks)
    fn num_trees(&self) -> usize;

    /// Raw log-odds for one row of model inputs
    fn margin(&self, inputs: &[Option<f64>]) -> f64;

    /// Additive attributions; `base_value + Σ values == margin`
    fn contributions(&self, inputs: &[Option<f64>]) -> Contributions;
}

struct CompiledTree {
    nodes: Vec<Node>,
    /// Cover-weighted expected leaf value below each node
    expected: Vec<f64>,
}

impl CompiledTree {
    fn leaf_value(&self, inputs: &[Option<f64>]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx].next(inputs) {
                Some(child) => idx = child,
                None => return self.expected[idx],
            }
        }
    }

    fn attribute(&self, inputs: &[Option<f64>], values: &mut [f64]) {
        let mut idx = 0;
        while let Some(child) = self.nodes[idx].next(inputs) {
            if let Node::Split { feature, .. } | Node::CategorySplit { feature, .. } = &self.nodes[idx] {
                values[*feature] += self.expected[child] - self.expected[idx];
            }
            idx = child;
        }
    }
}

/// Validated, ready-to-score ensemble
pub struct GradientBoostedModel {
    base_score: f64,
    num_features: usize,
    trees: Vec<CompiledTree>,
}

impl std::fmt::Debug for GradientBoostedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradientBoostedModel")
            .field("base_score", &self.base_score)
            .field("num_features", &self.num_features)
            .field("num_trees", &self.trees.len())
            .finish()
    }
}

impl GradientBoostedModel {
    /// Load `model.json` and check it against the schema
    pub fn load(path: &Path, schema: &FeatureSchema) -> Result<Self, InferenceError> {
        let file = File::open(path).map_err(|e| {
            InferenceError::ModelLoadError(format!("failed to open {}: {}", path.display(), e))
        })?;
        let ensemble: TreeEnsemble = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            InferenceError::ModelLoadError(format!("failed to parse {}: {}", path.display(), e))
        })?;

        let model = Self::from_ensemble(ensemble, schema)?;
        info!(
            "Loaded tree ensemble from {}: {} trees over {} features",
            path.display(),
            model.trees.len(),
            model.num_features
        );
        Ok(model)
    }

    /// Validate an ensemble against the schema and precompute expectations
    pub fn from_ensemble(ensemble: TreeEnsemble, schema: &FeatureSchema) -> Result<Self, InferenceError> {
        if !ensemble.base_score.is_finite() {
            return Err(invalid("base_score is not finite".to_string()));
        }
        if ensemble.trees.is_empty() {
            return Err(invalid("ensemble has no trees".to_string()));
        }
        if let Some(names) = &ensemble.feature_names {
            if !names.iter().map(String::as_str).eq(schema.names()) {
                return Err(invalid(format!(
                    "feature_names ({} columns) do not match the schema ({} columns) in order",
                    names.len(),
                    schema.len()
                )));
            }
        }

        let mut trees = Vec::with_capacity(ensemble.trees.len());
        for (t, tree) in ensemble.trees.into_iter().enumerate() {
            check_tree(t, &tree, schema)?;
            trees.push(compile(tree));
        }

        Ok(Self {
            base_score: ensemble.base_score,
            num_features: schema.len(),
            trees,
        })
    }
}

impl RiskModel for GradientBoostedModel {
    fn num_features(&self) -> usize {
        self.num_features
    }

    fn num_trees(&self) -> usize {
        self.trees.len()
    }

    fn margin(&self, inputs: &[Option<f64>]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.leaf_value(inputs)).sum::<f64>()
    }

    fn contributions(&self, inputs: &[Option<f64>]) -> Contributions {
        let mut values = vec![0.0; self.num_features];
        for tree in &self.trees {
            tree.attribute(inputs, &mut values);
        }
        Contributions {
            base_value: self.base_score + self.trees.iter().map(|t| t.expected[0]).sum::<f64>(),
            values,
        }
    }
}

fn invalid(reason: String) -> InferenceError {
    InferenceError::ModelLoadError(reason)
}

fn check_tree(t: usize, tree: &Tree, schema: &FeatureSchema) -> Result<(), InferenceError> {
    if tree.nodes.is_empty() {
        return Err(invalid(format!("tree {} has no nodes", t)));
    }

    for (i, node) in tree.nodes.iter().enumerate() {
        let at = |reason: String| invalid(format!("tree {} node {}: {}", t, i, reason));

        let cover = node.cover();
        if !cover.is_finite() || cover < 0.0 {
            return Err(at(format!("cover {} must be finite and non-negative", cover)));
        }
        if let Some((left, right)) = node.children() {
            for child in [left, right] {
                if child <= i || child >= tree.nodes.len() {
                    return Err(at(format!("child index {} out of order or range", child)));
                }
            }
        }

        match node {
            Node::Split { feature, threshold, .. } => {
                let column = schema.columns().get(*feature).ok_or_else(|| at(format!("feature {} out of range", feature)))?;
                if !column.kind.is_numeric() {
                    return Err(at(format!("numeric split on non-numeric column {:?}", column.name)));
                }
                if threshold.is_nan() {
                    return Err(at("threshold is NaN".to_string()));
                }
            }
            Node::CategorySplit { feature, categories, .. } => {
                let column = schema.columns().get(*feature).ok_or_else(|| at(format!("feature {} out of range", feature)))?;
                let ColumnKind::Categorical(set) = &column.kind else {
                    return Err(at(format!("category split on non-categorical column {:?}", column.name)));
                };
                if let Some(code) = categories.iter().find(|c| **c as usize >= set.len()) {
                    return Err(at(format!("category code {} outside {:?}", code, column.name)));
                }
            }
            Node::Leaf { value, .. } => {
                if !value.is_finite() {
                    return Err(at(format!("leaf value {} is not finite", value)));
                }
            }
        }
    }
    Ok(())
}

fn compile(tree: Tree) -> CompiledTree {
    let mut expected = vec![0.0; tree.nodes.len()];
    for i in (0..tree.nodes.len()).rev() {
        expected[i] = match &tree.nodes[i] {
            Node::Leaf { value, .. } => *value,
            node => {
                let Some((left, right)) = node.children() else { continue };
                let (wl, wr) = (tree.nodes[left].cover(), tree.nodes[right].cover());
                if wl + wr > 0.0 {
                    (wl * expected[left] + wr * expected[right]) / (wl + wr)
                } else {
                    (expected[left] + expected[right]) / 2.0
                }
            }
        };
    }
    CompiledTree {
        nodes: tree.nodes,
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feature_engine::DtypeSpec;
    use std::collections::HashMap;

    fn schema() -> FeatureSchema {
        let features = vec!["hb".to_string(), "bucket".to_string()];
        let dtypes = HashMap::from([
            ("hb".to_string(), DtypeSpec::Name("float".to_string())),
            ("bucket".to_string(), DtypeSpec::Name("category".to_string())),
        ]);
        let categories = HashMap::from([(
            "bucket".to_string(),
            vec!["Early".to_string(), "Mid".to_string(), "Late".to_string()],
        )]);
        FeatureSchema::from_parts(features, dtypes, categories).unwrap()
    }

    fn leaf(value: f64, cover: f64) -> Node {
        Node::Leaf { value, cover }
    }

    fn ensemble() -> TreeEnsemble {
        TreeEnsemble {
            base_score: -0.5,
            feature_names: Some(vec!["hb".to_string(), "bucket".to_string()]),
            trees: vec![
                Tree {
                    nodes: vec![
                        Node::Split { feature: 0, threshold: 8.0, left: 1, right: 2, default_left: true, cover: 4.0 },
                        leaf(1.0, 1.0),
                        leaf(-0.2, 3.0),
                    ],
                },
                Tree {
                    nodes: vec![
                        Node::CategorySplit {
                            feature: 1,
                            categories: vec![2],
                            left: 1,
                            right: 2,
                            default_left: false,
                            cover: 2.0,
                        },
                        leaf(0.6, 1.0),
                        leaf(-0.4, 1.0),
                    ],
                },
            ],
        }
    }

    #[test]
    fn test_margin_follows_splits() {
        let model = GradientBoostedModel::from_ensemble(ensemble(), &schema()).unwrap();
        assert!((model.margin(&[Some(7.0), Some(2.0)]) - 1.1).abs() < 1e-12);
        assert!((model.margin(&[Some(8.0), Some(0.0)]) - -1.1).abs() < 1e-12);
    }

    #[test]
    fn test_missing_follows_default_direction() {
        let model = GradientBoostedModel::from_ensemble(ensemble(), &schema()).unwrap();
        // hb missing goes left, bucket missing goes right
        assert!((model.margin(&[None, None]) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_contributions_sum_to_margin() {
        let model = GradientBoostedModel::from_ensemble(ensemble(), &schema()).unwrap();
        for inputs in [[Some(7.0), Some(2.0)], [Some(12.0), Some(1.0)], [None, None]] {
            let c = model.contributions(&inputs);
            let total = c.base_value + c.values.iter().sum::<f64>();
            assert!((total - model.margin(&inputs)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_expected_values_are_cover_weighted() {
        let model = GradientBoostedModel::from_ensemble(ensemble(), &schema()).unwrap();
        let c = model.contributions(&[Some(7.0), Some(2.0)]);
        // tree 0: (1.0 * 1 + -0.2 * 3) / 4 = 0.1; tree 1: 0.1
        assert!((c.base_value - -0.3).abs() < 1e-12);
        assert!((c.values[0] - 0.9).abs() < 1e-12);
        assert!((c.values[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_mismatched_feature_names() {
        let mut bad = ensemble();
        bad.feature_names = Some(vec!["bucket".to_string(), "hb".to_string()]);
        assert!(GradientBoostedModel::from_ensemble(bad, &schema()).is_err());
    }

    #[test]
    fn test_rejects_split_kind_mismatch() {
        let mut bad = ensemble();
        bad.trees[0].nodes[0] = Node::Split {
            feature: 1,
            threshold: 1.0,
            left: 1,
            right: 2,
            default_left: true,
            cover: 4.0,
        };
        assert!(GradientBoostedModel::from_ensemble(bad, &schema()).is_err());

        let mut bad = ensemble();
        if let Node::CategorySplit { categories, .. } = &mut bad.trees[1].nodes[0] {
            categories.push(3);
        }
        assert!(GradientBoostedModel::from_ensemble(bad, &schema()).is_err());
    }

    #[test]
    fn test_rejects_backward_child() {
        let mut bad = ensemble();
        bad.trees[0].nodes[0] = Node::Split {
            feature: 0,
            threshold: 8.0,
            left: 0,
            right: 2,
            default_left: true,
            cover: 4.0,
        };
        assert!(GradientBoostedModel::from_ensemble(bad, &schema()).is_err());
    }

    #[test]
    fn test_parse_json_nodes() {
        let raw = r#"{
            "base_score": 0.0,
            "trees": [{"nodes": [
                {"kind": "split", "feature": 0, "threshold": 6.0, "left": 1, "right": 2, "default_left": true},
                {"kind": "leaf", "value": 0.5},
                {"kind": "leaf", "value": -0.5}
            ]}]
        }"#;
        let ensemble: TreeEnsemble = serde_json::from_str(raw).unwrap();
        assert!(ensemble.feature_names.is_none());
        let model = GradientBoostedModel::from_ensemble(ensemble, &schema()).unwrap();
        assert_eq!(model.num_trees(), 1);
        assert!((model.margin(&[Some(5.0), None]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_load_missing_file() {
        let err = GradientBoostedModel::load(Path::new("/nonexistent/model.json"), &schema()).unwrap_err();
        assert!(matches!(err, InferenceError::ModelLoadError(_)));
    }
}
