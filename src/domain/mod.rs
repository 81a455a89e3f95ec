//! Domain layer: Core types and pure logic.
//!
//! Nothing here performs I/O. Validation, interpretation and hashing are
//! deterministic functions of their inputs (apart from salt and code
//! generation).

mod account;
mod assessment;
pub mod otp;
pub mod password;
pub mod patient;

pub use account::{AuthenticatedUser, Identifier, IdentifierError, PasswordHash, UserAccount};
pub use assessment::{
    interpret, reference_comparison, AssessmentResult, BloodPressureComponent, ClinicalFindings,
    ClinicalFlag, FlagSeverity, RiskLabel, RiskTier, VitalComparison,
};
pub use otp::OneTimeCode;
pub use password::{CredentialHasher, HashingError, HashingParams};
pub use patient::{
    validate, Gender, LabLevel, PatientFeatureRecord, RawPatientInput, ValidationError,
    ValidationErrors, ValidationPolicy, FEATURE_COUNT, FEATURE_ORDER,
};
