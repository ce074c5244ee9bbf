// Classifier capability: stateless probability of the "take the trade" class
pub mod forest;

use crate::features::FeatureVector;

pub use forest::ForestClassifier;

/// Pretrained binary classifier, loaded once and read-only afterwards
pub trait Classifier: Send + Sync {
    /// Probability in [0, 1] that the setup described by `features` is worth taking
    fn predict(&self, features: &FeatureVector) -> f64;

    fn name(&self) -> &str {
        "classifier"
    }
}
