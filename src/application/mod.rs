//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the core use cases of the application.

mod assessment;
mod auth;
mod reset;

pub use assessment::{Assessment, AssessmentError, AssessmentService};
pub use auth::{AuthError, AuthService};
pub use reset::{PasswordResetService, PendingReset, ResetError, ResetState};
