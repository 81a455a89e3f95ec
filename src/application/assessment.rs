//! Assessment service: validate, predict, interpret.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::{
    interpret, reference_comparison, validate, AssessmentResult, PatientFeatureRecord,
    RawPatientInput, ValidationErrors, ValidationPolicy, VitalComparison,
};
use crate::ports::{Classifier, ClassifierError};

#[derive(Debug, thiserror::Error)]
pub enum AssessmentError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// Everything the presentation layer needs for one submission.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub record: PatientFeatureRecord,
    pub result: AssessmentResult,
    pub comparison: [VitalComparison; 3],
}

/// Stateless per request; the classifier is shared read-only.
pub struct AssessmentService<C: Classifier + ?Sized> {
    classifier: Arc<C>,
    policy: ValidationPolicy,
}

impl<C: Classifier + ?Sized> AssessmentService<C> {
    pub fn new(classifier: Arc<C>, policy: ValidationPolicy) -> Self {
        Self { classifier, policy }
    }

    /// Run one form submission through the pipeline.
    ///
    /// # Errors
    /// Returns [`AssessmentError::Validation`] listing every bad field, or
    /// [`AssessmentError::Classifier`] if the model output is unusable.
    pub fn assess(&self, raw: &RawPatientInput) -> Result<Assessment, AssessmentError> {
        let record = validate(raw, self.policy)?;
        self.assess_record(record)
    }

    /// # Errors
    /// Returns [`AssessmentError::Classifier`] if the model output is unusable.
    pub fn assess_record(
        &self,
        record: PatientFeatureRecord,
    ) -> Result<Assessment, AssessmentError> {
        let prediction = self.classifier.predict(&record)?;
        let result = interpret(prediction.label, prediction.probability, &record);

        tracing::info!(
            "Assessment complete: label={}, tier={}, flags={}",
            result.predicted_label,
            result.risk_tier,
            result.triggered_flags().len()
        );

        Ok(Assessment {
            comparison: reference_comparison(&record),
            record,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::patient::tests::{baseline_form, form};
    use crate::domain::{ClinicalFindings, ClinicalFlag, RiskLabel};
    use crate::ports::Prediction;

    struct FixedClassifier(f64);

    impl Classifier for FixedClassifier {
        fn predict(&self, _record: &PatientFeatureRecord) -> Result<Prediction, ClassifierError> {
            if self.0.is_nan() {
                return Err(ClassifierError::NonFiniteOutput);
            }
            Ok(Prediction::from_probability(self.0))
        }
    }

    fn service(p: f64) -> AssessmentService<dyn Classifier> {
        let classifier: Arc<dyn Classifier> = Arc::new(FixedClassifier(p));
        AssessmentService::new(classifier, ValidationPolicy::default())
    }

    #[test]
    fn test_assess_healthy_baseline() {
        let assessment = service(0.12).assess(&baseline_form()).expect("assess");

        assert_eq!(assessment.result.predicted_label, RiskLabel::LowRisk);
        assert!((assessment.result.risk_probability_pct - 12.0).abs() < 1e-9);
        assert_eq!(assessment.result.findings, ClinicalFindings::NoMajorRiskFactors);
        assert_eq!(assessment.comparison[0].patient, 120);
    }

    #[test]
    fn test_assess_flags_hypertension() {
        let mut raw = baseline_form();
        raw.insert("systolic_bp".into(), "150".into());

        let assessment = service(0.81).assess(&raw).expect("assess");
        assert_eq!(assessment.result.predicted_label, RiskLabel::HighRisk);
        assert_eq!(assessment.result.triggered_flags().len(), 1);
        assert!(matches!(
            assessment.result.triggered_flags().into_iter().next(),
            Some(ClinicalFlag::Hypertension(_))
        ));
    }

    #[test]
    fn test_invalid_form_never_reaches_classifier() {
        let err = service(f64::NAN)
            .assess(&form(&[("age", "abc")]))
            .expect_err("invalid form");
        match err {
            AssessmentError::Validation(errors) => assert!(errors.has_field("age")),
            AssessmentError::Classifier(_) => panic!("classifier must not run"),
        }
    }

    #[test]
    fn test_classifier_failure_propagates() {
        let err = service(f64::NAN).assess(&baseline_form()).expect_err("nan");
        assert!(matches!(err, AssessmentError::Classifier(_)));
    }
}
