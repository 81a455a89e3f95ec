//! Classifier port: fixed predict contract over a pre-trained model.

use crate::domain::{PatientFeatureRecord, RiskLabel};

/// Errors raised while evaluating a loaded model.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassifierError {
    #[error("Model produced a non-finite probability")]
    NonFiniteOutput,
}

/// Raw model output before interpretation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: RiskLabel,
    /// Class-1 probability in [0, 1].
    pub probability: f64,
}

impl Prediction {
    /// Build a prediction from a class-1 probability.
    ///
    /// The label follows argmax semantics: high risk only when the class-1
    /// probability is strictly above one half.
    #[must_use]
    pub fn from_probability(probability: f64) -> Self {
        let probability = probability.clamp(0.0, 1.0);
        let label = if probability > 0.5 {
            RiskLabel::HighRisk
        } else {
            RiskLabel::LowRisk
        };
        Self { label, probability }
    }
}

/// Trait for risk classifiers.
///
/// Implementations wrap a model that is loaded once and read-only
/// afterwards, so a single instance can be shared across threads.
/// Identical records must always yield identical predictions.
pub trait Classifier: Send + Sync {
    /// Predict the risk label and probability for a validated record.
    ///
    /// # Errors
    /// Returns [`ClassifierError`] if the model output is unusable.
    fn predict(&self, record: &PatientFeatureRecord) -> Result<Prediction, ClassifierError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_threshold() {
        assert_eq!(Prediction::from_probability(0.5).label, RiskLabel::LowRisk);
        assert_eq!(Prediction::from_probability(0.51).label, RiskLabel::HighRisk);
        assert!((Prediction::from_probability(1.5).probability - 1.0).abs() < f64::EPSILON);
    }
}
