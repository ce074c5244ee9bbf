use std::sync::Arc;

use crate::classifier::Classifier;
use crate::features::FeatureVector;
use crate::models::Side;

/// Probability at or above which a setup is traded
pub const DEFAULT_THRESHOLD: f64 = 0.45;

/// What the signal generator wants done this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    None,
    Open(Side),
}

/// Probabilities behind a decision, kept for logging
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEvaluation {
    pub buy_probability: f64,
    /// Only queried when the long side did not clear the threshold
    pub sell_probability: Option<f64>,
    pub decision: Decision,
}

/// Turns a feature row into a trade decision using one classifier for both sides
///
/// The long side is scored on the raw features. The short side is scored on
/// the mirrored features (directional returns sign-flipped), relying on the
/// classifier having been trained on sell examples transformed the same way.
/// Nothing checks that symmetry at runtime.
pub struct SignalGenerator {
    classifier: Arc<dyn Classifier>,
    threshold: f64,
}

impl SignalGenerator {
    pub fn new(classifier: Arc<dyn Classifier>, threshold: f64) -> Self {
        Self {
            classifier,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    /// Score the long side first; only fall through to the short side when it misses.
    pub fn evaluate(&self, features: &FeatureVector) -> SignalEvaluation {
        let buy_probability = self.classifier.predict(features);
        if buy_probability >= self.threshold {
            return SignalEvaluation {
                buy_probability,
                sell_probability: None,
                decision: Decision::Open(Side::Long),
            };
        }

        let sell_probability = self.classifier.predict(&features.mirrored());
        let decision = if sell_probability >= self.threshold {
            Decision::Open(Side::Short)
        } else {
            Decision::None
        };

        SignalEvaluation {
            buy_probability,
            sell_probability: Some(sell_probability),
            decision,
        }
    }

    pub fn decide(&self, features: &FeatureVector) -> Decision {
        self.evaluate(features).decision
    }
}
