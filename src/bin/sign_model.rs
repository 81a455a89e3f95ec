//! Model signing utility for CardioRisk classifier artifacts.
//!
//! Writes a manifest (`manifest.json`) binding `model.json` by SHA-256, and
//! an Ed25519 signature over the manifest (`model.sig`). The service
//! verifies both at startup against `model.public_key_b64`.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin sign_model -- <model_dir> [--key-file <path>] [--serial <n>]
//! ```
//!
//! # Security
//!
//! - Signing seed sourced from a file or Docker secret (env var in debug builds only)
//! - Private key material zeroized after use

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const KEY_FILE_ENV: &str = "CARDIORISK_MODEL_SIGNING_KEY_FILE";
const DOCKER_SECRET_PATH: &str = "/run/secrets/cardiorisk_model_signing_key";
const KEY_ENV_DEV: &str = "CARDIORISK_MODEL_SIGNING_KEY";

const BOUND_FILES: [&str; 1] = ["model.json"];

#[derive(Debug, Serialize)]
struct ModelManifest {
    version: u32,
    /// Build number checked against `model.min_serial` at load; defaults to `created_at`.
    serial: u64,
    /// Unix timestamp (seconds).
    created_at: i64,
    /// Random 16 bytes, base64.
    nonce_b64: String,
    files: BTreeMap<String, String>,
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct Seed([u8; 32]);

struct Args {
    model_dir: PathBuf,
    key_file: Option<PathBuf>,
    serial: Option<u64>,
}

fn usage() -> &'static str {
    "Usage: sign_model <model_dir> [--key-file <path>] [--serial <u64>]"
}

fn parse_args() -> Result<Args> {
    let mut args = env::args().skip(1);
    let mut model_dir = None;
    let mut key_file = None;
    let mut serial = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--key-file" => {
                let v = args.next().context(usage())?;
                key_file = Some(PathBuf::from(v));
            }
            "--serial" => {
                let v = args.next().context(usage())?;
                serial = Some(v.trim().parse::<u64>().context("--serial must be a u64")?);
            }
            "-h" | "--help" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            _ if model_dir.is_none() => model_dir = Some(PathBuf::from(arg)),
            _ => bail!("{}", usage()),
        }
    }

    Ok(Args {
        model_dir: model_dir.context(usage())?,
        key_file,
        serial,
    })
}

fn read_seed_b64(explicit: Option<&Path>) -> Result<Zeroizing<String>> {
    let from_file = |path: &Path| -> Result<Zeroizing<String>> {
        let content = Zeroizing::new(
            fs::read_to_string(path).with_context(|| format!("Failed to read {path:?}"))?,
        );
        let secret = content.trim().to_string();
        if secret.is_empty() {
            bail!("Empty signing key in {path:?}");
        }
        Ok(Zeroizing::new(secret))
    };

    if let Some(path) = explicit {
        return from_file(path);
    }
    if let Ok(path) = env::var(KEY_FILE_ENV) {
        return from_file(Path::new(path.trim()));
    }
    if Path::new(DOCKER_SECRET_PATH).exists() {
        return from_file(Path::new(DOCKER_SECRET_PATH));
    }
    if cfg!(debug_assertions) {
        if let Ok(v) = env::var(KEY_ENV_DEV) {
            let secret = v.trim().to_string();
            if !secret.is_empty() {
                return Ok(Zeroizing::new(secret));
            }
        }
    }

    bail!(
        "Missing signing key. Provide --key-file, {KEY_FILE_ENV}, or mount {DOCKER_SECRET_PATH} \
         (env var fallback only in debug builds)."
    )
}

fn read_seed(explicit: Option<&Path>) -> Result<Seed> {
    let b64 = read_seed_b64(explicit)?;
    let raw = Zeroizing::new(
        general_purpose::STANDARD
            .decode(b64.trim())
            .context("Invalid base64 in signing key")?,
    );
    let bytes: [u8; 32] = raw.as_slice().try_into().map_err(|_| {
        anyhow::anyhow!(
            "Signing key seed must be 32 bytes after base64 decode (got {})",
            raw.len()
        )
    })?;
    Ok(Seed(bytes))
}

fn sha256_hex(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {path:?}"))?;
    Ok(Sha256::digest(&bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect())
}

fn main() -> Result<()> {
    let args = parse_args()?;

    let model_dir = if args.model_dir.is_file() {
        args.model_dir
            .parent()
            .context("Model path has no parent directory")?
            .to_path_buf()
    } else {
        args.model_dir
    };

    let mut files = BTreeMap::new();
    for rel in BOUND_FILES {
        let path = model_dir.join(rel);
        if path.exists() {
            files.insert(rel.to_string(), sha256_hex(&path)?);
        }
    }
    if files.is_empty() {
        bail!("No model.json found in {model_dir:?}");
    }

    let seed = read_seed(args.key_file.as_deref())?;
    let signing_key = SigningKey::from_bytes(&seed.0);
    drop(seed);

    let created_at = chrono::Utc::now().timestamp();
    let mut nonce = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let manifest = ModelManifest {
        version: 1,
        serial: args
            .serial
            .unwrap_or_else(|| u64::try_from(created_at).unwrap_or(1)),
        created_at,
        nonce_b64: general_purpose::STANDARD.encode(nonce),
        files,
    };
    let manifest_bytes =
        serde_json::to_vec_pretty(&manifest).context("Failed to serialize manifest.json")?;

    let manifest_path = model_dir.join("manifest.json");
    fs::write(&manifest_path, &manifest_bytes)
        .with_context(|| format!("Failed to write {manifest_path:?}"))?;

    let sig: Signature = signing_key.sign(&manifest_bytes);
    let sig_path = model_dir.join("model.sig");
    fs::write(&sig_path, sig.to_bytes())
        .with_context(|| format!("Failed to write {sig_path:?}"))?;

    println!("Signed manifest: {manifest_path:?}");
    println!("Wrote signature: {sig_path:?}");
    println!(
        "CARDIORISK_MODEL_PUBLIC_KEY={}",
        general_purpose::STANDARD.encode(signing_key.verifying_key().as_bytes())
    );

    Ok(())
}
