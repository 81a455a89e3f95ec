//! Patient feature record and the form validator that produces it.
//!
//! Feature layout follows the cardiovascular disease dataset the
//! classifier was trained on (11 features, fixed order and coding).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw form submission: field name to the text the user entered.
pub type RawPatientInput = BTreeMap<String, String>;

/// Number of features in the classifier input vector.
pub const FEATURE_COUNT: usize = 11;

/// Feature names in the exact order the model artifact expects.
pub const FEATURE_ORDER: [&str; FEATURE_COUNT] = [
    "age",
    "gender",
    "height",
    "weight",
    "ap_hi",
    "ap_lo",
    "cholesterol",
    "gluc",
    "smoke",
    "alco",
    "active",
];

/// Form field names accepted by [`validate`].
pub const FORM_FIELDS: [&str; FEATURE_COUNT] = [
    "age",
    "gender",
    "height_cm",
    "weight_kg",
    "systolic_bp",
    "diastolic_bp",
    "cholesterol",
    "glucose",
    "smoker",
    "alcohol_use",
    "physically_active",
];

const AGE_RANGE: (i64, i64) = (18, 100);
const HEIGHT_RANGE: (i64, i64) = (100, 250);
const WEIGHT_RANGE: (i64, i64) = (30, 200);
const SYSTOLIC_RANGE: (i64, i64) = (80, 220);
const DIASTOLIC_RANGE: (i64, i64) = (50, 150);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Female,
    Male,
}

impl Gender {
    /// Model encoding: 1 = female, 2 = male.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Female => 1,
            Self::Male => 2,
        }
    }
}

/// Three-level lab result used for cholesterol and glucose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabLevel {
    Normal,
    AboveNormal,
    WellAboveNormal,
}

impl LabLevel {
    /// Model encoding: 1..=3.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Normal => 1,
            Self::AboveNormal => 2,
            Self::WellAboveNormal => 3,
        }
    }

    fn parse(text: &str) -> Option<Self> {
        let folded: String = text
            .trim()
            .chars()
            .map(|c| match c {
                '_' | '-' => ' ',
                other => other.to_ascii_lowercase(),
            })
            .collect();
        match folded.split_whitespace().collect::<Vec<_>>().join(" ").as_str() {
            "normal" | "1" => Some(Self::Normal),
            "above normal" | "2" => Some(Self::AboveNormal),
            "well above normal" | "3" => Some(Self::WellAboveNormal),
            _ => None,
        }
    }
}

impl fmt::Display for LabLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::AboveNormal => write!(f, "Above Normal"),
            Self::WellAboveNormal => write!(f, "Well Above Normal"),
        }
    }
}

/// Validated clinical inputs for a single assessment.
///
/// Only obtainable through [`validate`], so every instance satisfies the
/// domain ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatientFeatureRecord {
    age: u8,
    gender: Gender,
    height_cm: u16,
    weight_kg: u16,
    systolic_bp: u16,
    diastolic_bp: u16,
    cholesterol: LabLevel,
    glucose: LabLevel,
    smoker: bool,
    alcohol_use: bool,
    physically_active: bool,
}

impl PatientFeatureRecord {
    #[must_use]
    pub fn age(&self) -> u8 {
        self.age
    }

    #[must_use]
    pub fn gender(&self) -> Gender {
        self.gender
    }

    #[must_use]
    pub fn height_cm(&self) -> u16 {
        self.height_cm
    }

    #[must_use]
    pub fn weight_kg(&self) -> u16 {
        self.weight_kg
    }

    #[must_use]
    pub fn systolic_bp(&self) -> u16 {
        self.systolic_bp
    }

    #[must_use]
    pub fn diastolic_bp(&self) -> u16 {
        self.diastolic_bp
    }

    #[must_use]
    pub fn cholesterol(&self) -> LabLevel {
        self.cholesterol
    }

    #[must_use]
    pub fn glucose(&self) -> LabLevel {
        self.glucose
    }

    #[must_use]
    pub fn smoker(&self) -> bool {
        self.smoker
    }

    #[must_use]
    pub fn alcohol_use(&self) -> bool {
        self.alcohol_use
    }

    #[must_use]
    pub fn physically_active(&self) -> bool {
        self.physically_active
    }

    /// Encode into the classifier input vector.
    ///
    /// Order: age, gender, height, weight, ap_hi, ap_lo, cholesterol, gluc,
    /// smoke, alco, active.
    #[must_use]
    pub fn feature_vector(&self) -> [f64; FEATURE_COUNT] {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        [
            f64::from(self.age),
            f64::from(self.gender.code()),
            f64::from(self.height_cm),
            f64::from(self.weight_kg),
            f64::from(self.systolic_bp),
            f64::from(self.diastolic_bp),
            f64::from(self.cholesterol.code()),
            f64::from(self.glucose.code()),
            flag(self.smoker),
            flag(self.alcohol_use),
            flag(self.physically_active),
        ]
    }
}

/// A single rejected form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// All field errors from one form submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", join_errors(.0))]
pub struct ValidationErrors(pub Vec<ValidationError>);

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    /// Whether any error concerns `field`.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }
}

/// Validation switches that go beyond the per-field domain table.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ValidationPolicy {
    /// Reject readings where systolic is below diastolic.
    #[serde(default)]
    pub reject_inverted_bp: bool,
}

struct FieldReader<'a> {
    raw: &'a RawPatientInput,
    errors: Vec<ValidationError>,
}

impl<'a> FieldReader<'a> {
    fn text(&mut self, field: &str) -> Option<&'a str> {
        let raw = self.raw;
        match raw.get(field).map(|v| v.trim()) {
            Some(v) if !v.is_empty() => Some(v),
            _ => {
                self.errors.push(ValidationError::new(field, "missing value"));
                None
            }
        }
    }

    fn integer(&mut self, field: &str, (min, max): (i64, i64)) -> Option<i64> {
        let text = self.text(field)?;
        let Ok(value) = text.parse::<i64>() else {
            self.errors.push(ValidationError::new(
                field,
                format!("'{text}' is not a whole number"),
            ));
            return None;
        };
        if !(min..=max).contains(&value) {
            self.errors.push(ValidationError::new(
                field,
                format!("{value} out of range [{min}, {max}]"),
            ));
            return None;
        }
        Some(value)
    }

    fn gender(&mut self, field: &str) -> Option<Gender> {
        let text = self.text(field)?;
        match text.to_ascii_lowercase().as_str() {
            "female" | "f" | "1" => Some(Gender::Female),
            "male" | "m" | "2" => Some(Gender::Male),
            _ => {
                self.errors.push(ValidationError::new(
                    field,
                    format!("'{text}' is not one of female, male"),
                ));
                None
            }
        }
    }

    fn lab_level(&mut self, field: &str) -> Option<LabLevel> {
        let text = self.text(field)?;
        let level = LabLevel::parse(text);
        if level.is_none() {
            self.errors.push(ValidationError::new(
                field,
                format!("'{text}' is not one of normal, above normal, well above normal"),
            ));
        }
        level
    }

    fn boolean(&mut self, field: &str) -> Option<bool> {
        let text = self.text(field)?;
        match text.to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "on" => Some(true),
            "false" | "no" | "n" | "0" | "off" => Some(false),
            _ => {
                self.errors.push(ValidationError::new(
                    field,
                    format!("'{text}' is not a yes/no value"),
                ));
                None
            }
        }
    }
}

/// Validate a raw form submission into a [`PatientFeatureRecord`].
///
/// Every field is checked; all failures are reported together.
///
/// # Errors
/// Returns [`ValidationErrors`] if any field is missing, unknown, malformed
/// or out of range.
pub fn validate(
    raw: &RawPatientInput,
    policy: ValidationPolicy,
) -> Result<PatientFeatureRecord, ValidationErrors> {
    let mut reader = FieldReader {
        raw,
        errors: Vec::new(),
    };

    for key in raw.keys() {
        if !FORM_FIELDS.contains(&key.as_str()) {
            reader
                .errors
                .push(ValidationError::new(key, "unknown field"));
        }
    }

    let age = reader.integer("age", AGE_RANGE);
    let gender = reader.gender("gender");
    let height_cm = reader.integer("height_cm", HEIGHT_RANGE);
    let weight_kg = reader.integer("weight_kg", WEIGHT_RANGE);
    let systolic_bp = reader.integer("systolic_bp", SYSTOLIC_RANGE);
    let diastolic_bp = reader.integer("diastolic_bp", DIASTOLIC_RANGE);
    let cholesterol = reader.lab_level("cholesterol");
    let glucose = reader.lab_level("glucose");
    let smoker = reader.boolean("smoker");
    let alcohol_use = reader.boolean("alcohol_use");
    let physically_active = reader.boolean("physically_active");

    if policy.reject_inverted_bp {
        if let (Some(sys), Some(dia)) = (systolic_bp, diastolic_bp) {
            if sys < dia {
                reader.errors.push(ValidationError::new(
                    "systolic_bp",
                    format!("systolic {sys} is below diastolic {dia}"),
                ));
            }
        }
    }

    match (
        age,
        gender,
        height_cm,
        weight_kg,
        systolic_bp,
        diastolic_bp,
        cholesterol,
        glucose,
        smoker,
        alcohol_use,
        physically_active,
    ) {
        (
            Some(age),
            Some(gender),
            Some(height_cm),
            Some(weight_kg),
            Some(systolic_bp),
            Some(diastolic_bp),
            Some(cholesterol),
            Some(glucose),
            Some(smoker),
            Some(alcohol_use),
            Some(physically_active),
        ) if reader.errors.is_empty() => Ok(PatientFeatureRecord {
            // Ranges were checked above, so the narrowing casts are lossless.
            age: age as u8,
            gender,
            height_cm: height_cm as u16,
            weight_kg: weight_kg as u16,
            systolic_bp: systolic_bp as u16,
            diastolic_bp: diastolic_bp as u16,
            cholesterol,
            glucose,
            smoker,
            alcohol_use,
            physically_active,
        }),
        _ => Err(ValidationErrors(reader.errors)),
    }
}
