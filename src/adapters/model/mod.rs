//! Model adapter: Implementation of Classifier over a JSON model artifact.
//!
//! The artifact is exported once by the training pipeline and never
//! modified here. Two estimator kinds are supported:
//! - `random_forest`: flattened decision trees, probability averaged over trees
//! - `logistic`: linear model with optional standard scaling
//!
//! # Security
//!
//! - `manifest.json` binds `model.json` by SHA-256
//! - `model.sig` is an Ed25519 signature over the manifest bytes
//! - The manifest must carry a `serial` (at least `min_serial`), a
//!   `created_at` no later than now plus clock skew, and a 16-byte nonce
//! - Unsigned models load only with `allow_unsigned`, and only in debug builds
//!
//! # Artifact layout
//!
//! ```text
//! <model_dir>/model.json
//! <model_dir>/manifest.json   (optional unless a public key is configured)
//! <model_dir>/model.sig
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ModelSettings;
use crate::domain::otp::constant_time_eq;
use crate::domain::{PatientFeatureRecord, FEATURE_COUNT, FEATURE_ORDER};
use crate::ports::{Classifier, ClassifierError, Prediction};

pub const MODEL_FILE: &str = "model.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const SIGNATURE_FILE: &str = "model.sig";

const SUPPORTED_FORMAT_VERSION: u32 = 1;
const SUPPORTED_MANIFEST_VERSION: u32 = 1;
const MANIFEST_NONCE_LEN: usize = 16;
/// Allowed clock skew for `created_at`, in seconds.
const MANIFEST_MAX_SKEW_SECS: i64 = 300;

/// Error type for model loading. Any of these is fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model artifact not found at {0:?}")]
    NotFound(PathBuf),

    #[error("Failed to read model artifact: {0}")]
    Io(String),

    #[error("Model signature verification failed: {0}")]
    Signature(String),

    #[error("Invalid model artifact: {0}")]
    Invalid(String),
}

/// Model metadata shown alongside predictions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelCard {
    pub algorithm: String,
    #[serde(default)]
    pub n_estimators: Option<u32>,
    #[serde(default)]
    pub dataset: Option<String>,
    /// Held-out validation metrics (accuracy, precision, recall, auc_roc, ...).
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// Impurity-based importance per feature, keyed by feature name.
    #[serde(default)]
    pub feature_importances: BTreeMap<String, f64>,
}

impl ModelCard {
    /// Feature importances, most important first.
    #[must_use]
    pub fn ranked_importances(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .feature_importances
            .iter()
            .map(|(name, value)| (name.as_str(), *value))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }
}

/// On-disk artifact, as exported by the training pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub feature_names: Vec<String>,
    pub estimator: Estimator,
    #[serde(default)]
    pub card: Option<ModelCard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Estimator {
    RandomForest {
        trees: Vec<DecisionTree>,
    },
    Logistic {
        intercept: f64,
        coefficients: Vec<f64>,
        #[serde(default)]
        scaler_mean: Option<Vec<f64>>,
        #[serde(default)]
        scaler_scale: Option<Vec<f64>>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

/// Flattened tree node. Samples go left when `x[feature] <= threshold`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Per-class weights (counts or fractions) for classes 0 and 1.
    Leaf { value: Vec<f64> },
}

#[derive(Debug, Deserialize, Serialize)]
struct SignedManifest {
    version: u32,
    #[serde(default)]
    serial: Option<u64>,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    nonce_b64: Option<String>,
    files: BTreeMap<String, String>,
}

impl SignedManifest {
    /// Freshness fields: serial floor, creation time and nonce shape.
    fn check_freshness(&self, min_serial: u64, now: i64) -> Result<(), ModelError> {
        let serial = self.serial.ok_or_else(|| {
            ModelError::Signature("manifest missing required field serial".into())
        })?;
        if serial < min_serial {
            return Err(ModelError::Signature(format!(
                "manifest serial {serial} is below the minimum {min_serial}"
            )));
        }

        let created_at = self.created_at.ok_or_else(|| {
            ModelError::Signature("manifest missing required field created_at".into())
        })?;
        if created_at > now.saturating_add(MANIFEST_MAX_SKEW_SECS) {
            return Err(ModelError::Signature("manifest created_at is in the future".into()));
        }

        let nonce_b64 = self.nonce_b64.as_deref().ok_or_else(|| {
            ModelError::Signature("manifest missing required field nonce_b64".into())
        })?;
        let nonce = base64::engine::general_purpose::STANDARD
            .decode(nonce_b64.trim())
            .map_err(|_| ModelError::Signature("manifest nonce is not valid base64".into()))?;
        if nonce.len() != MANIFEST_NONCE_LEN {
            return Err(ModelError::Signature(format!(
                "manifest nonce must decode to exactly {MANIFEST_NONCE_LEN} bytes"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum CompiledNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Class-1 fraction at this leaf.
    Leaf(f64),
}

#[derive(Debug, Clone)]
enum CompiledEstimator {
    Forest(Vec<Vec<CompiledNode>>),
    Logistic {
        intercept: f64,
        weights: [f64; FEATURE_COUNT],
        mean: [f64; FEATURE_COUNT],
        scale: [f64; FEATURE_COUNT],
    },
}

/// Classifier backed by a verified, read-only model artifact.
#[derive(Debug, Clone)]
pub struct ModelClassifier {
    estimator: CompiledEstimator,
    card: Option<ModelCard>,
    fingerprint: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

impl ModelClassifier {
    /// Locate, verify and load the model artifact.
    ///
    /// # Errors
    /// Returns [`ModelError`] if the artifact is missing, fails signature
    /// checks, or is structurally invalid.
    pub fn load(settings: &ModelSettings) -> Result<Self, ModelError> {
        let (base_dir, model_path) = if settings.dir.is_file() {
            let parent = settings
                .dir
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            (parent, settings.dir.clone())
        } else {
            (settings.dir.clone(), settings.dir.join(MODEL_FILE))
        };

        if !model_path.exists() {
            tracing::error!("Model artifact missing at {:?}", model_path);
            return Err(ModelError::NotFound(model_path));
        }

        let model_name = model_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(MODEL_FILE)
            .to_string();
        Self::verify_signature(settings, &base_dir, &model_name)?;

        let bytes = fs::read(&model_path).map_err(|e| ModelError::Io(e.to_string()))?;
        let classifier = Self::from_json_bytes(&bytes)?;

        tracing::info!(
            "Loaded model from {:?} (fingerprint={}, algorithm={})",
            model_path,
            classifier.fingerprint.get(..16).unwrap_or_default(),
            classifier
                .card
                .as_ref()
                .map_or("unspecified", |c| c.algorithm.as_str())
        );
        Ok(classifier)
    }

    /// Parse and compile an artifact without any signature checks.
    ///
    /// # Errors
    /// Returns [`ModelError::Invalid`] if the JSON or its structure is invalid.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        let artifact: ModelArtifact =
            serde_json::from_slice(bytes).map_err(|e| ModelError::Invalid(e.to_string()))?;
        let mut classifier = Self::from_artifact(artifact)?;
        classifier.fingerprint = sha256_hex(bytes);
        Ok(classifier)
    }

    /// Compile an in-memory artifact.
    ///
    /// # Errors
    /// Returns [`ModelError::Invalid`] if the structure is invalid.
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ModelError> {
        if artifact.format_version != SUPPORTED_FORMAT_VERSION {
            return Err(ModelError::Invalid(format!(
                "Unsupported format_version {} (expected {SUPPORTED_FORMAT_VERSION})",
                artifact.format_version
            )));
        }

        let names: Vec<&str> = artifact.feature_names.iter().map(String::as_str).collect();
        if names != FEATURE_ORDER {
            return Err(ModelError::Invalid(format!(
                "feature_names {names:?} do not match expected order {FEATURE_ORDER:?}"
            )));
        }

        let estimator = match artifact.estimator {
            Estimator::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err(ModelError::Invalid("random_forest has no trees".into()));
                }
                let compiled = trees
                    .iter()
                    .enumerate()
                    .map(|(i, tree)| {
                        compile_tree(tree)
                            .map_err(|e| ModelError::Invalid(format!("tree {i}: {e}")))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                CompiledEstimator::Forest(compiled)
            }
            Estimator::Logistic {
                intercept,
                coefficients,
                scaler_mean,
                scaler_scale,
            } => {
                let weights = to_feature_array("coefficients", &coefficients)?;
                let mean = match scaler_mean {
                    Some(m) => to_feature_array("scaler_mean", &m)?,
                    None => [0.0; FEATURE_COUNT],
                };
                let scale = match scaler_scale {
                    Some(s) => to_feature_array("scaler_scale", &s)?,
                    None => [1.0; FEATURE_COUNT],
                };
                if scale.iter().any(|s| *s == 0.0) {
                    return Err(ModelError::Invalid("scaler_scale contains zero".into()));
                }
                if !intercept.is_finite() {
                    return Err(ModelError::Invalid("intercept is not finite".into()));
                }
                CompiledEstimator::Logistic {
                    intercept,
                    weights,
                    mean,
                    scale,
                }
            }
        };

        if let Some(card) = &artifact.card {
            for (name, value) in &card.feature_importances {
                if !FEATURE_ORDER.contains(&name.as_str()) {
                    return Err(ModelError::Invalid(format!(
                        "feature_importances names unknown feature {name:?}"
                    )));
                }
                if !value.is_finite() || *value < 0.0 {
                    return Err(ModelError::Invalid(format!(
                        "feature_importances[{name}] must be finite and non-negative"
                    )));
                }
            }
        }

        Ok(Self {
            estimator,
            card: artifact.card,
            fingerprint: String::new(),
        })
    }

    #[must_use]
    pub fn card(&self) -> Option<&ModelCard> {
        self.card.as_ref()
    }

    /// SHA-256 of the loaded `model.json` (empty for in-memory artifacts).
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Class-1 probability for an encoded feature vector.
    fn probability(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        match &self.estimator {
            CompiledEstimator::Forest(trees) => {
                let sum: f64 = trees.iter().map(|nodes| eval_tree(nodes, x)).sum();
                sum / trees.len() as f64
            }
            CompiledEstimator::Logistic {
                intercept,
                weights,
                mean,
                scale,
            } => {
                let z = (0..FEATURE_COUNT).fold(*intercept, |acc, i| {
                    acc + weights[i] * (x[i] - mean[i]) / scale[i]
                });
                1.0 / (1.0 + (-z).exp())
            }
        }
    }

    /// Verify `manifest.json` + `model.sig` and the hash binding of the model file.
    fn verify_signature(
        settings: &ModelSettings,
        base_dir: &Path,
        model_name: &str,
    ) -> Result<(), ModelError> {
        let sig_path = base_dir.join(SIGNATURE_FILE);
        let manifest_path = base_dir.join(MANIFEST_FILE);
        let signed = sig_path.exists() && manifest_path.exists();

        let key = match (&settings.public_key_b64, signed) {
            (Some(b64), true) => verifying_key_from_b64(b64)?,
            (public_key, _) => {
                if settings.allow_unsigned && cfg!(debug_assertions) {
                    tracing::warn!(
                        "Loading model WITHOUT signature verification (allow_unsigned=true). \
                         This is only honoured in debug builds."
                    );
                    return Ok(());
                }
                let reason = if public_key.is_none() {
                    "no trusted public key configured"
                } else {
                    "manifest.json or model.sig missing"
                };
                tracing::error!("Refusing to load unsigned model: {reason}");
                return Err(ModelError::Signature(reason.to_string()));
            }
        };

        let sig_bytes = fs::read(&sig_path)
            .map_err(|e| ModelError::Io(format!("Failed to read signature: {e}")))?;
        let sig_array: [u8; 64] = sig_bytes
            .as_slice()
            .try_into()
            .map_err(|_| ModelError::Signature("signature must be 64 bytes".into()))?;
        let signature = Signature::from_bytes(&sig_array);

        let manifest_bytes = fs::read(&manifest_path)
            .map_err(|e| ModelError::Io(format!("Failed to read manifest: {e}")))?;
        key.verify(&manifest_bytes, &signature)
            .map_err(|_| ModelError::Signature("invalid manifest signature".into()))?;

        let manifest: SignedManifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| ModelError::Signature(format!("invalid manifest format: {e}")))?;
        if manifest.version != SUPPORTED_MANIFEST_VERSION {
            return Err(ModelError::Signature(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }
        manifest.check_freshness(settings.min_serial, chrono::Utc::now().timestamp())?;
        if !manifest.files.contains_key(model_name) {
            return Err(ModelError::Signature(format!(
                "manifest does not bind {model_name}"
            )));
        }

        for (rel, expected_hex) in &manifest.files {
            let bytes = fs::read(base_dir.join(rel)).map_err(|e| {
                ModelError::Signature(format!("manifest references unreadable file {rel}: {e}"))
            })?;
            let actual_hex = sha256_hex(&bytes);
            let expected_hex = expected_hex.to_ascii_lowercase();
            if !constant_time_eq(actual_hex.as_bytes(), expected_hex.as_bytes()) {
                return Err(ModelError::Signature(format!("hash mismatch for {rel}")));
            }
        }

        tracing::info!(
            "Model signature verified (manifest serial={:?}, created_at={:?})",
            manifest.serial,
            manifest.created_at
        );
        Ok(())
    }
}

fn verifying_key_from_b64(b64: &str) -> Result<VerifyingKey, ModelError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|_| ModelError::Signature("public key is not valid base64".into()))?;
    let key: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| ModelError::Signature("public key must be 32 bytes".into()))?;
    VerifyingKey::from_bytes(&key)
        .map_err(|_| ModelError::Signature("invalid Ed25519 public key".into()))
}

fn to_feature_array(name: &str, values: &[f64]) -> Result<[f64; FEATURE_COUNT], ModelError> {
    let arr: [f64; FEATURE_COUNT] = values.try_into().map_err(|_| {
        ModelError::Invalid(format!(
            "{name} has {} entries, expected {FEATURE_COUNT}",
            values.len()
        ))
    })?;
    if arr.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::Invalid(format!("{name} contains non-finite values")));
    }
    Ok(arr)
}

fn compile_tree(tree: &DecisionTree) -> Result<Vec<CompiledNode>, String> {
    let n = tree.nodes.len();
    if n == 0 {
        return Err("tree has no nodes".into());
    }

    tree.nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| match node {
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if *feature >= FEATURE_COUNT {
                    return Err(format!("node {idx}: feature index {feature} out of range"));
                }
                if !threshold.is_finite() {
                    return Err(format!("node {idx}: threshold is not finite"));
                }
                // Children must point forward; this rules out cycles.
                for child in [*left, *right] {
                    if child <= idx || child >= n {
                        return Err(format!("node {idx}: invalid child index {child}"));
                    }
                }
                Ok(CompiledNode::Split {
                    feature: *feature,
                    threshold: *threshold,
                    left: *left,
                    right: *right,
                })
            }
            TreeNode::Leaf { value } => {
                if value.len() != 2 {
                    return Err(format!("node {idx}: leaf must carry 2 class weights"));
                }
                if value.iter().any(|v| !v.is_finite() || *v < 0.0) {
                    return Err(format!("node {idx}: leaf weights must be finite and >= 0"));
                }
                let total = value[0] + value[1];
                if total <= 0.0 {
                    return Err(format!("node {idx}: leaf weights sum to zero"));
                }
                Ok(CompiledNode::Leaf(value[1] / total))
            }
        })
        .collect()
}

fn eval_tree(nodes: &[CompiledNode], x: &[f64; FEATURE_COUNT]) -> f64 {
    let mut idx = 0;
    loop {
        match &nodes[idx] {
            CompiledNode::Leaf(p) => return *p,
            CompiledNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                idx = if x[*feature] <= *threshold { *left } else { *right };
            }
        }
    }
}

impl Classifier for ModelClassifier {
    fn predict(&self, record: &PatientFeatureRecord) -> Result<Prediction, ClassifierError> {
        let x = record.feature_vector();
        let p = self.probability(&x);
        if !p.is_finite() {
            return Err(ClassifierError::NonFiniteOutput);
        }
        Ok(Prediction::from_probability(p))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::patient::tests::record_with;
    use crate::domain::RiskLabel;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::RngCore;
    use tempfile::tempdir;

    fn split(feature: usize, threshold: f64, left: usize, right: usize) -> TreeNode {
        TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        }
    }

    fn leaf(neg: f64, pos: f64) -> TreeNode {
        TreeNode::Leaf {
            value: vec![neg, pos],
        }
    }

    /// Two stumps on systolic BP and age.
    pub(crate) fn forest_artifact() -> ModelArtifact {
        ModelArtifact {
            format_version: 1,
            feature_names: FEATURE_ORDER.iter().map(|s| (*s).to_string()).collect(),
            estimator: Estimator::RandomForest {
                trees: vec![
                    DecisionTree {
                        nodes: vec![split(4, 129.5, 1, 2), leaf(80.0, 20.0), leaf(20.0, 80.0)],
                    },
                    DecisionTree {
                        nodes: vec![split(0, 55.5, 1, 2), leaf(0.8, 0.2), leaf(0.2, 0.8)],
                    },
                ],
            },
            card: Some(ModelCard {
                algorithm: "Random Forest".into(),
                n_estimators: Some(2),
                dataset: None,
                metrics: BTreeMap::from([("accuracy".to_string(), 0.734)]),
                feature_importances: BTreeMap::from([
                    ("age".to_string(), 0.4),
                    ("ap_hi".to_string(), 0.6),
                ]),
            }),
        }
    }

    fn write_model(dir: &Path, artifact: &ModelArtifact) -> Vec<u8> {
        let bytes = serde_json::to_vec(artifact).expect("serialize model");
        fs::write(dir.join(MODEL_FILE), &bytes).expect("write model");
        bytes
    }

    fn manifest_for(files: &[(&str, &[u8])]) -> SignedManifest {
        SignedManifest {
            version: 1,
            serial: Some(7),
            created_at: Some(1_700_000_000),
            nonce_b64: Some(base64::engine::general_purpose::STANDARD.encode([9u8; 16])),
            files: files
                .iter()
                .map(|(name, bytes)| ((*name).to_string(), sha256_hex(bytes)))
                .collect(),
        }
    }

    fn sign_dir(dir: &Path, key: &SigningKey, files: &[(&str, &[u8])]) {
        sign_manifest(dir, key, &manifest_for(files));
    }

    fn sign_manifest(dir: &Path, key: &SigningKey, manifest: &SignedManifest) {
        let manifest_bytes = serde_json::to_vec(&manifest).expect("serialize manifest");
        fs::write(dir.join(MANIFEST_FILE), &manifest_bytes).expect("write manifest");
        let signature: Signature = key.sign(&manifest_bytes);
        fs::write(dir.join(SIGNATURE_FILE), signature.to_bytes()).expect("write sig");
    }

    fn signing_key() -> SigningKey {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        SigningKey::from_bytes(&seed)
    }

    fn settings_for(dir: &Path, key: Option<&SigningKey>) -> ModelSettings {
        ModelSettings {
            dir: dir.to_path_buf(),
            public_key_b64: key.map(|k| {
                base64::engine::general_purpose::STANDARD.encode(k.verifying_key().to_bytes())
            }),
            allow_unsigned: false,
            min_serial: 0,
        }
    }

    #[test]
    fn test_forest_probability_is_mean_of_leaf_fractions() {
        let model = ModelClassifier::from_artifact(forest_artifact()).expect("compile");

        let low = record_with(&[("systolic_bp", "120"), ("age", "40")]);
        let p = model.predict(&low).expect("predict");
        assert!((p.probability - 0.2).abs() < 1e-12);
        assert_eq!(p.label, RiskLabel::LowRisk);

        let high = record_with(&[("systolic_bp", "150"), ("age", "60")]);
        let p = model.predict(&high).expect("predict");
        assert!((p.probability - 0.8).abs() < 1e-12);
        assert_eq!(p.label, RiskLabel::HighRisk);

        // 0.8 and 0.2 average to exactly one half: argmax tie goes to class 0.
        let tie = record_with(&[("systolic_bp", "150"), ("age", "40")]);
        assert_eq!(model.predict(&tie).expect("predict").label, RiskLabel::LowRisk);
    }

    #[test]
    fn test_predict_is_deterministic() {
        let model = ModelClassifier::from_artifact(forest_artifact()).expect("compile");
        let record = record_with(&[("systolic_bp", "133"), ("age", "57")]);

        let first = model.predict(&record).expect("predict");
        for _ in 0..20 {
            assert_eq!(model.predict(&record).expect("predict"), first);
        }
    }

    #[test]
    fn test_logistic_estimator() {
        let mut coefficients = vec![0.0; FEATURE_COUNT];
        coefficients[4] = 1.0;
        let mut mean = vec![0.0; FEATURE_COUNT];
        mean[4] = 120.0;
        let mut scale = vec![1.0; FEATURE_COUNT];
        scale[4] = 10.0;

        let artifact = ModelArtifact {
            format_version: 1,
            feature_names: FEATURE_ORDER.iter().map(|s| (*s).to_string()).collect(),
            estimator: Estimator::Logistic {
                intercept: 0.0,
                coefficients,
                scaler_mean: Some(mean),
                scaler_scale: Some(scale),
            },
            card: None,
        };
        let model = ModelClassifier::from_artifact(artifact).expect("compile");

        let at_mean = model
            .predict(&record_with(&[("systolic_bp", "120")]))
            .expect("predict");
        assert!((at_mean.probability - 0.5).abs() < 1e-12);

        let above = model
            .predict(&record_with(&[("systolic_bp", "140")]))
            .expect("predict");
        let expected = 1.0 / (1.0 + (-2.0f64).exp());
        assert!((above.probability - expected).abs() < 1e-12);
        assert_eq!(above.label, RiskLabel::HighRisk);
    }

    #[test]
    fn test_structural_validation() {
        let mut artifact = forest_artifact();
        artifact.feature_names.swap(0, 1);
        assert!(matches!(
            ModelClassifier::from_artifact(artifact),
            Err(ModelError::Invalid(_))
        ));

        let mut artifact = forest_artifact();
        artifact.estimator = Estimator::RandomForest {
            trees: vec![DecisionTree {
                nodes: vec![split(4, 120.0, 0, 1), leaf(1.0, 0.0)],
            }],
        };
        let err = ModelClassifier::from_artifact(artifact).expect_err("cycle must fail");
        assert!(err.to_string().contains("invalid child index"));

        let mut artifact = forest_artifact();
        artifact.estimator = Estimator::RandomForest {
            trees: vec![DecisionTree {
                nodes: vec![split(11, 1.0, 1, 2), leaf(1.0, 0.0), leaf(0.0, 1.0)],
            }],
        };
        assert!(ModelClassifier::from_artifact(artifact).is_err());

        let mut artifact = forest_artifact();
        artifact.estimator = Estimator::RandomForest {
            trees: vec![DecisionTree {
                nodes: vec![leaf(0.0, 0.0)],
            }],
        };
        assert!(ModelClassifier::from_artifact(artifact).is_err());
    }

    #[test]
    fn test_feature_importances_ranked_and_checked() {
        let model = ModelClassifier::from_artifact(forest_artifact()).expect("compile");
        let card = model.card().expect("card");
        assert_eq!(card.ranked_importances(), vec![("ap_hi", 0.6), ("age", 0.4)]);

        let mut artifact = forest_artifact();
        if let Some(card) = artifact.card.as_mut() {
            card.feature_importances.insert("bmi".into(), 0.1);
        }
        let err = ModelClassifier::from_artifact(artifact).expect_err("unknown feature");
        assert!(err.to_string().contains("bmi"));

        let mut artifact = forest_artifact();
        if let Some(card) = artifact.card.as_mut() {
            card.feature_importances.insert("gluc".into(), f64::NAN);
        }
        assert!(ModelClassifier::from_artifact(artifact).is_err());
    }

    #[test]
    fn test_load_signed_model() {
        let temp = tempdir().expect("tempdir");
        let key = signing_key();
        let bytes = write_model(temp.path(), &forest_artifact());
        sign_dir(temp.path(), &key, &[(MODEL_FILE, &bytes)]);

        let model = ModelClassifier::load(&settings_for(temp.path(), Some(&key)))
            .expect("signed model loads");
        assert_eq!(model.fingerprint(), sha256_hex(&bytes));
        assert_eq!(model.card().map(|c| c.algorithm.as_str()), Some("Random Forest"));
    }

    #[test]
    fn test_tampered_model_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let key = signing_key();
        let bytes = write_model(temp.path(), &forest_artifact());
        sign_dir(temp.path(), &key, &[(MODEL_FILE, &bytes)]);

        let mut tampered = forest_artifact();
        tampered.card = None;
        write_model(temp.path(), &tampered);

        let err = ModelClassifier::load(&settings_for(temp.path(), Some(&key)))
            .expect_err("tampered model must fail");
        assert!(matches!(err, ModelError::Signature(_)));
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let bytes = write_model(temp.path(), &forest_artifact());
        sign_dir(temp.path(), &signing_key(), &[(MODEL_FILE, &bytes)]);

        let other = signing_key();
        let err = ModelClassifier::load(&settings_for(temp.path(), Some(&other)))
            .expect_err("wrong key must fail");
        assert!(err.to_string().contains("invalid manifest signature"));
    }

    #[test]
    fn test_manifest_without_nonce_or_serial_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let key = signing_key();
        let bytes = write_model(temp.path(), &forest_artifact());
        let settings = settings_for(temp.path(), Some(&key));

        let mut manifest = manifest_for(&[(MODEL_FILE, &bytes)]);
        manifest.nonce_b64 = None;
        sign_manifest(temp.path(), &key, &manifest);
        let err = ModelClassifier::load(&settings).expect_err("nonce is required");
        assert!(err.to_string().contains("nonce_b64"));

        let mut manifest = manifest_for(&[(MODEL_FILE, &bytes)]);
        manifest.nonce_b64 = Some(base64::engine::general_purpose::STANDARD.encode([1u8; 8]));
        sign_manifest(temp.path(), &key, &manifest);
        let err = ModelClassifier::load(&settings).expect_err("short nonce must fail");
        assert!(err.to_string().contains("exactly 16 bytes"));

        let mut manifest = manifest_for(&[(MODEL_FILE, &bytes)]);
        manifest.nonce_b64 = Some("not base64!".into());
        sign_manifest(temp.path(), &key, &manifest);
        assert!(matches!(
            ModelClassifier::load(&settings),
            Err(ModelError::Signature(_))
        ));

        let mut manifest = manifest_for(&[(MODEL_FILE, &bytes)]);
        manifest.serial = None;
        sign_manifest(temp.path(), &key, &manifest);
        let err = ModelClassifier::load(&settings).expect_err("serial is required");
        assert!(err.to_string().contains("serial"));
    }

    #[test]
    fn test_manifest_serial_floor_and_future_timestamp() {
        let temp = tempdir().expect("tempdir");
        let key = signing_key();
        let bytes = write_model(temp.path(), &forest_artifact());
        sign_dir(temp.path(), &key, &[(MODEL_FILE, &bytes)]);

        let mut settings = settings_for(temp.path(), Some(&key));
        settings.min_serial = 7;
        assert!(ModelClassifier::load(&settings).is_ok());

        settings.min_serial = 8;
        let err = ModelClassifier::load(&settings).expect_err("older serial must fail");
        assert!(err.to_string().contains("below the minimum"));

        let manifest = manifest_for(&[(MODEL_FILE, &bytes)]);
        assert!(manifest.check_freshness(0, 1_700_000_000 - 300).is_ok());
        let err = manifest
            .check_freshness(0, 1_700_000_000 - 301)
            .expect_err("future manifest must fail");
        assert!(err.to_string().contains("in the future"));
    }

    #[test]
    fn test_missing_artifact_and_unsigned_model() {
        let temp = tempdir().expect("tempdir");
        let err = ModelClassifier::load(&settings_for(temp.path(), None))
            .expect_err("missing model must fail");
        assert!(matches!(err, ModelError::NotFound(_)));

        write_model(temp.path(), &forest_artifact());
        let err = ModelClassifier::load(&settings_for(temp.path(), None))
            .expect_err("unsigned model must fail without allow_unsigned");
        assert!(matches!(err, ModelError::Signature(_)));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_unsigned_model_allowed_in_debug() {
        let temp = tempdir().expect("tempdir");
        write_model(temp.path(), &forest_artifact());
        let mut settings = settings_for(temp.path(), None);
        settings.allow_unsigned = true;

        assert!(ModelClassifier::load(&settings).is_ok());
    }

    #[test]
    fn test_bundled_demo_model_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("models")
            .join(MODEL_FILE);
        let bytes = fs::read(path).expect("demo model present");
        let model = ModelClassifier::from_json_bytes(&bytes).expect("demo model compiles");

        let p = model.predict(&record_with(&[])).expect("predict");
        assert!((0.0..=1.0).contains(&p.probability));
    }
}
