//! Assessment result types and the risk interpreter.
//!
//! The interpreter turns a classifier output into a display tier and a set
//! of rule-based clinical flags. Flags are derived from the raw vitals and
//! never from the model output.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::patient::{LabLevel, PatientFeatureRecord};

const SYSTOLIC_LIMIT: u16 = 140;
const DIASTOLIC_LIMIT: u16 = 90;
const WEIGHT_LIMIT_KG: u16 = 100;

/// Healthy reference values shown next to the patient's vitals.
const HEALTHY_SYSTOLIC: u16 = 120;
const HEALTHY_DIASTOLIC: u16 = 80;
const HEALTHY_WEIGHT_KG: u16 = 70;

/// Binary model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLabel {
    LowRisk,
    HighRisk,
}

impl RiskLabel {
    #[must_use]
    pub fn headline(self) -> &'static str {
        match self {
            Self::LowRisk => "Low Risk Profile",
            Self::HighRisk => "High Risk Detected",
        }
    }

    #[must_use]
    pub fn recommendation(self) -> &'static str {
        match self {
            Self::LowRisk => {
                "Patient vitals are within stable ranges. Maintain healthy lifestyle."
            }
            Self::HighRisk => {
                "Patient shows significant signs of cardiovascular distress. Refer to cardiologist."
            }
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowRisk => write!(f, "low_risk"),
            Self::HighRisk => write!(f, "high_risk"),
        }
    }
}

/// Display banding of the risk probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Below 30 %
    Low,
    /// 30 % up to 70 %
    Moderate,
    /// 70 % and above
    High,
}

impl RiskTier {
    #[must_use]
    pub fn from_percentage(pct: f64) -> Self {
        if pct < 30.0 {
            Self::Low
        } else if pct < 70.0 {
            Self::Moderate
        } else {
            Self::High
        }
    }

    /// Gauge colour as a hex string.
    #[must_use]
    pub fn color(self) -> &'static str {
        match self {
            Self::Low => "#10B981",
            Self::Moderate => "#F59E0B",
            Self::High => "#EF4444",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BloodPressureComponent {
    Systolic,
    Diastolic,
}

/// Rule-triggered warning derived directly from raw vitals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "component")]
pub enum ClinicalFlag {
    Hypertension(BloodPressureComponent),
    ElevatedCholesterol,
    Obesity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagSeverity {
    Warning,
    Critical,
}

impl ClinicalFlag {
    #[must_use]
    pub fn severity(self) -> FlagSeverity {
        match self {
            Self::Hypertension(_) => FlagSeverity::Critical,
            Self::ElevatedCholesterol | Self::Obesity => FlagSeverity::Warning,
        }
    }

    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Hypertension(BloodPressureComponent::Systolic) => {
                "Hypertension: Systolic > 140 mmHg"
            }
            Self::Hypertension(BloodPressureComponent::Diastolic) => {
                "Hypertension: Diastolic > 90 mmHg"
            }
            Self::ElevatedCholesterol => "Cholesterol: Above normal limits",
            Self::Obesity => "Obesity: High impact on cardiac load",
        }
    }
}

/// Outcome of the flag rules.
///
/// The empty case is its own variant so callers cannot confuse "nothing
/// found" with "not evaluated".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "flags")]
pub enum ClinicalFindings {
    NoMajorRiskFactors,
    Flagged(BTreeSet<ClinicalFlag>),
}

impl ClinicalFindings {
    /// Evaluate every flag rule against the raw record.
    #[must_use]
    pub fn evaluate(record: &PatientFeatureRecord) -> Self {
        let mut flags = BTreeSet::new();

        if record.systolic_bp() > SYSTOLIC_LIMIT {
            flags.insert(ClinicalFlag::Hypertension(BloodPressureComponent::Systolic));
        }
        if record.diastolic_bp() > DIASTOLIC_LIMIT {
            flags.insert(ClinicalFlag::Hypertension(BloodPressureComponent::Diastolic));
        }
        if record.cholesterol() > LabLevel::Normal {
            flags.insert(ClinicalFlag::ElevatedCholesterol);
        }
        if record.weight_kg() > WEIGHT_LIMIT_KG {
            flags.insert(ClinicalFlag::Obesity);
        }

        if flags.is_empty() {
            Self::NoMajorRiskFactors
        } else {
            Self::Flagged(flags)
        }
    }

    #[must_use]
    pub fn flags(&self) -> BTreeSet<ClinicalFlag> {
        match self {
            Self::NoMajorRiskFactors => BTreeSet::new(),
            Self::Flagged(flags) => flags.clone(),
        }
    }

    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::NoMajorRiskFactors => "No major clinical risk factors detected.".to_string(),
            Self::Flagged(flags) => format!("{} risk factor(s) identified", flags.len()),
        }
    }
}

/// Patient value next to its healthy reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VitalComparison {
    pub label: &'static str,
    pub patient: u16,
    pub healthy_reference: u16,
}

/// Compare systolic, diastolic and weight against healthy averages.
#[must_use]
pub fn reference_comparison(record: &PatientFeatureRecord) -> [VitalComparison; 3] {
    [
        VitalComparison {
            label: "Systolic BP",
            patient: record.systolic_bp(),
            healthy_reference: HEALTHY_SYSTOLIC,
        },
        VitalComparison {
            label: "Diastolic BP",
            patient: record.diastolic_bp(),
            healthy_reference: HEALTHY_DIASTOLIC,
        },
        VitalComparison {
            label: "Weight (kg)",
            patient: record.weight_kg(),
            healthy_reference: HEALTHY_WEIGHT_KG,
        },
    ]
}

/// Clinically interpretable result of one assessment. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentResult {
    pub risk_probability_pct: f64,
    pub predicted_label: RiskLabel,
    pub risk_tier: RiskTier,
    pub findings: ClinicalFindings,
}

impl AssessmentResult {
    #[must_use]
    pub fn triggered_flags(&self) -> BTreeSet<ClinicalFlag> {
        self.findings.flags()
    }
}

/// Combine the model output with the rule-based flags.
///
/// `probability` is the class-1 probability in [0, 1]; it is reported as a
/// percentage clamped to [0, 100].
#[must_use]
pub fn interpret(
    label: RiskLabel,
    probability: f64,
    record: &PatientFeatureRecord,
) -> AssessmentResult {
    let pct = if probability.is_finite() {
        (probability * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    AssessmentResult {
        risk_probability_pct: pct,
        predicted_label: label,
        risk_tier: RiskTier::from_percentage(pct),
        findings: ClinicalFindings::evaluate(record),
    }
}
