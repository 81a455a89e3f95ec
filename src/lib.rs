//! # CardioRisk
//!
//! Cardiovascular risk assessment with account management.
//!
//! This crate provides:
//! - Validation of patient vitals into a fixed 11-feature record
//! - Risk prediction from a signed, pre-trained model artifact
//! - Rule-based clinical flags alongside the model output
//! - Credential storage over SQLite or a Google Sheets worksheet, with
//!   Argon2id hashing and a one-time-code password reset flow
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types and pure logic (patient record, assessment, accounts)
//! - `ports`: Trait definitions for the classifier, credential store and notifier
//! - `adapters`: Concrete implementations (model artifact, SQLite, Sheets, log sanitizer)
//! - `application`: Use cases orchestrating domain and ports
//! - `config`: Runtime settings

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use application::{
    Assessment, AssessmentService, AuthService, PasswordResetService, ResetState,
};
pub use config::Settings;
pub use domain::{AssessmentResult, PatientFeatureRecord, RiskLabel, RiskTier};

/// Result type for CardioRisk operations
pub type Result<T> = std::result::Result<T, CardioRiskError>;

/// Main error type for CardioRisk
#[derive(Debug, thiserror::Error)]
pub enum CardioRiskError {
    #[error("Invalid patient data: {0}")]
    Validation(#[from] domain::ValidationErrors),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(#[from] adapters::ModelError),

    #[error("Prediction failed: {0}")]
    Prediction(#[from] ports::ClassifierError),

    #[error("Credential store error: {0}")]
    Store(#[from] ports::StoreError),

    #[error(transparent)]
    Auth(#[from] application::AuthError),

    #[error(transparent)]
    Reset(#[from] application::ResetError),

    #[error("Password hashing unavailable: {0}")]
    Hashing(#[from] domain::HashingError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(#[from] domain::IdentifierError),
}

impl From<application::AssessmentError> for CardioRiskError {
    fn from(e: application::AssessmentError) -> Self {
        match e {
            application::AssessmentError::Validation(v) => Self::Validation(v),
            application::AssessmentError::Classifier(c) => Self::Prediction(c),
        }
    }
}
