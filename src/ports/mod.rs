//! Ports layer: Trait definitions for external collaborators.
//!
//! These traits are the boundaries between the application and the model
//! artifact, the credential backends, and the code delivery channel.

mod classifier;
mod credentials;
mod notifier;

pub use classifier::{Classifier, ClassifierError, Prediction};
pub use credentials::{CredentialStore, StoreError};
pub use notifier::{CodeNotifier, NotifyError};
