use serde::{Deserialize, Serialize};
use std::path::Path;

use super::Classifier;
use crate::error::StartupError;
use crate::features::{FeatureVector, FEATURE_NAMES};

/// One node of an exported decision tree
///
/// Samples with `x[feature] <= threshold` go to `left`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        /// Fraction of class-1 training samples that reached this leaf
        probability: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

/// On-disk format written by the offline trainer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestArtifact {
    pub feature_names: Vec<String>,
    pub trees: Vec<Tree>,
}

/// Random-forest classifier evaluated from an exported artifact
///
/// Probability is the mean of the per-tree leaf probabilities, the same
/// aggregation `predict_proba` uses at training time.
#[derive(Debug, Clone)]
pub struct ForestClassifier {
    trees: Vec<Tree>,
}

impl ForestClassifier {
    /// Load and validate an artifact from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StartupError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| StartupError::ModelRead {
            path: path.to_path_buf(),
            source,
        })?;
        let classifier = Self::from_json(&raw)?;

        tracing::info!(
            "Loaded classifier from {} ({} trees)",
            path.display(),
            classifier.tree_count()
        );
        Ok(classifier)
    }

    pub fn from_json(raw: &str) -> Result<Self, StartupError> {
        let artifact: ForestArtifact = serde_json::from_str(raw)?;
        Self::from_artifact(artifact)
    }

    pub fn from_artifact(artifact: ForestArtifact) -> Result<Self, StartupError> {
        if artifact.feature_names.len() != FEATURE_NAMES.len() {
            return Err(StartupError::IncompatibleModel(format!(
                "expected {} features, artifact has {}",
                FEATURE_NAMES.len(),
                artifact.feature_names.len()
            )));
        }
        for (i, (found, expected)) in artifact
            .feature_names
            .iter()
            .zip(FEATURE_NAMES.iter())
            .enumerate()
        {
            if found != expected {
                return Err(StartupError::IncompatibleModel(format!(
                    "feature {} is '{}', expected '{}'",
                    i, found, expected
                )));
            }
        }

        if artifact.trees.is_empty() {
            return Err(StartupError::IncompatibleModel("forest has no trees".into()));
        }
        for (i, tree) in artifact.trees.iter().enumerate() {
            validate_tree(tree).map_err(|reason| {
                StartupError::IncompatibleModel(format!("tree {}: {}", i, reason))
            })?;
        }

        Ok(Self {
            trees: artifact.trees,
        })
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

/// Children must point forward so every walk terminates at a leaf.
fn validate_tree(tree: &Tree) -> Result<(), String> {
    if tree.nodes.is_empty() {
        return Err("empty tree".into());
    }
    let len = tree.nodes.len();

    for (idx, node) in tree.nodes.iter().enumerate() {
        match *node {
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if feature >= FEATURE_NAMES.len() {
                    return Err(format!("node {} splits on unknown feature {}", idx, feature));
                }
                if !threshold.is_finite() {
                    return Err(format!("node {} has non-finite threshold", idx));
                }
                for child in [left, right] {
                    if child <= idx || child >= len {
                        return Err(format!("node {} has invalid child {}", idx, child));
                    }
                }
            }
            Node::Leaf { probability } => {
                if !(0.0..=1.0).contains(&probability) {
                    return Err(format!("leaf {} probability {} outside [0, 1]", idx, probability));
                }
            }
        }
    }
    Ok(())
}

fn tree_probability(tree: &Tree, x: &[f64; 7]) -> f64 {
    let mut idx = 0;
    loop {
        match tree.nodes[idx] {
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                idx = if x[feature] <= threshold { left } else { right };
            }
            Node::Leaf { probability } => return probability,
        }
    }
}

impl Classifier for ForestClassifier {
    fn predict(&self, features: &FeatureVector) -> f64 {
        let x = features.to_array();
        let total: f64 = self.trees.iter().map(|tree| tree_probability(tree, &x)).sum();
        total / self.trees.len() as f64
    }

    fn name(&self) -> &str {
        "random_forest"
    }
}
