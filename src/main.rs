//! CardioRisk: cardiovascular risk assessment CLI.
//!
//! Main entry point. Passwords and reset codes are read from stdin, one
//! per line, so they never appear in the process arguments.

use std::io::{BufRead, IsTerminal, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use zeroize::Zeroizing;

use cardiorisk::adapters::sanitize::SanitizingMakeWriter;
use cardiorisk::adapters::{self, ModelClassifier};
use cardiorisk::application::ResetError;
use cardiorisk::domain::patient::FORM_FIELDS;
use cardiorisk::domain::{CredentialHasher, RawPatientInput};
use cardiorisk::{
    Assessment, AssessmentService, AuthService, CardioRiskError, PasswordResetService,
    ResetState, Settings,
};

const USAGE: &str = "\
Usage: cardiorisk <command> [args]

Commands:
  assess [--json] field=value...   Assess one patient
  register <identifier>            Create an account (password on stdin)
  login <identifier>               Check credentials (password on stdin)
  reset <identifier>               Reset a password with a one-time code
  users                            List registered identifiers
  model-info                       Show the loaded model card";

fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    // Logs never share stdout with command output.
    // - interactive TTY: log to a file
    // - non-interactive: log to stderr
    let log_mode = std::env::var("CARDIORISK_LOG_MODE").unwrap_or_else(|_| "auto".to_string());

    let use_file = match log_mode.as_str() {
        "file" => true,
        "stderr" | "stdout" => false,
        // auto
        _ => std::io::stdout().is_terminal(),
    };

    let (writer, guard) = if use_file {
        let log_file = std::env::var("CARDIORISK_LOG_FILE")
            .unwrap_or_else(|_| "data/cardiorisk.log".to_string());

        if let Some(parent) = std::path::Path::new(&log_file).parent() {
            // Best-effort; the open below reports the real failure.
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("Failed to open log file {log_file}"))?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stderr())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    Ok(guard)
}

fn main() -> Result<()> {
    let _guard = init_logging()?;

    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else {
        println!("{USAGE}");
        return Ok(());
    };
    let rest: Vec<String> = args.collect();

    let settings = Settings::load().context("Failed to load configuration")?;
    tracing::info!("Starting CardioRisk ({command})...");

    match command.as_str() {
        "assess" => assess(&settings, &rest)?,
        "register" => register(&settings, single_arg(&rest)?)?,
        "login" => login(&settings, single_arg(&rest)?)?,
        "reset" => reset(&settings, single_arg(&rest)?)?,
        "users" => users(&settings)?,
        "model-info" => model_info(&settings)?,
        "-h" | "--help" | "help" => println!("{USAGE}"),
        other => bail!("Unknown command: {other}\n\n{USAGE}"),
    }

    tracing::info!("CardioRisk finished.");
    Ok(())
}

fn single_arg(rest: &[String]) -> Result<&str> {
    match rest {
        [one] => Ok(one.as_str()),
        _ => bail!("Expected exactly one identifier\n\n{USAGE}"),
    }
}

/// Read one line from stdin with the prompt on stderr.
fn prompt_secret(prompt: &str) -> Result<Zeroizing<String>> {
    eprint!("{prompt}: ");
    std::io::stderr().flush()?;
    let mut line = Zeroizing::new(String::new());
    let read = std::io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        bail!("Unexpected end of input");
    }
    let trimmed = Zeroizing::new(line.trim_end_matches(['\n', '\r']).to_string());
    Ok(trimmed)
}

fn hasher(settings: &Settings) -> cardiorisk::Result<Arc<CredentialHasher>> {
    Ok(Arc::new(CredentialHasher::new(settings.auth.hashing)?))
}

fn auth_service(settings: &Settings) -> cardiorisk::Result<AuthService> {
    let store = adapters::open_store(&settings.store)?;
    Ok(AuthService::new(
        store,
        hasher(settings)?,
        settings.auth.min_password_len,
    ))
}

fn parse_form(args: &[String]) -> Result<(RawPatientInput, bool)> {
    let mut json = false;
    let mut raw = RawPatientInput::new();
    for arg in args {
        if arg == "--json" {
            json = true;
            continue;
        }
        let (field, value) = arg.split_once('=').with_context(|| {
            format!(
                "Expected field=value, got {arg:?}. Fields: {}",
                FORM_FIELDS.join(", ")
            )
        })?;
        raw.insert(field.trim().to_string(), value.trim().to_string());
    }
    Ok((raw, json))
}

fn assess(settings: &Settings, args: &[String]) -> Result<()> {
    let (raw, json) = parse_form(args)?;
    let model = ModelClassifier::load(&settings.model).map_err(CardioRiskError::from)?;
    let classifier = Arc::new(model);
    let service = AssessmentService::new(classifier, settings.validation);

    let assessment = service.assess(&raw).map_err(CardioRiskError::from)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&assessment)?);
    } else {
        print_assessment(&assessment);
    }
    Ok(())
}

fn print_assessment(assessment: &Assessment) {
    let result = &assessment.result;
    println!("{}", result.predicted_label.headline());
    println!(
        "Risk probability: {:.1}% ({} risk)",
        result.risk_probability_pct, result.risk_tier
    );
    println!("Recommendation: {}", result.predicted_label.recommendation());
    println!();
    println!("Clinical findings: {}", result.findings.summary());
    for flag in result.triggered_flags() {
        println!("  - [{:?}] {}", flag.severity(), flag.message());
    }
    println!();
    println!("Compared with healthy averages:");
    for vital in &assessment.comparison {
        println!(
            "  {:<14} {:>4}  (healthy {})",
            vital.label, vital.patient, vital.healthy_reference
        );
    }
}

fn register(settings: &Settings, identifier: &str) -> Result<()> {
    let auth = auth_service(settings)?;
    let password = prompt_secret("Password")?;
    let confirmation = prompt_secret("Confirm password")?;

    let id = auth
        .register(identifier, &password, &confirmation)
        .map_err(CardioRiskError::from)?;
    println!("Account created for {id}. You can now log in.");
    Ok(())
}

fn login(settings: &Settings, identifier: &str) -> Result<()> {
    let auth = auth_service(settings)?;
    let password = prompt_secret("Password")?;

    let user = auth
        .login(identifier, &password)
        .map_err(CardioRiskError::from)?;
    println!(
        "Welcome, {} (authenticated at {})",
        user.identifier,
        user.authenticated_at.to_rfc3339()
    );
    Ok(())
}

fn reset(settings: &Settings, identifier: &str) -> Result<()> {
    let store = adapters::open_store(&settings.store).map_err(CardioRiskError::from)?;
    let notifier = adapters::open_notifier(&settings.notify);
    let service = PasswordResetService::new(
        store,
        notifier,
        hasher(settings)?,
        settings.reset,
        settings.auth.min_password_len,
    );

    let mut state = ResetState::default();
    service
        .begin(&mut state, identifier)
        .map_err(CardioRiskError::from)?;
    println!("If an account exists for this identifier, a reset code has been sent.");

    while state.is_code_issued() {
        let code = prompt_secret("Reset code")?;
        let password = prompt_secret("New password")?;
        let confirmation = prompt_secret("Confirm new password")?;

        match service.complete(&mut state, &code, &password, &confirmation) {
            Ok(()) => println!("Password updated. You can now log in."),
            Err(
                e @ (ResetError::PasswordMismatch
                | ResetError::CodeMismatch { .. }
                | ResetError::WeakPassword { .. }),
            ) => eprintln!("{e}"),
            Err(e) => {
                service.cancel(&mut state);
                return Err(CardioRiskError::from(e).into());
            }
        }
    }
    Ok(())
}

fn users(settings: &Settings) -> Result<()> {
    let store = adapters::open_store(&settings.store).map_err(CardioRiskError::from)?;
    let ids = store.list_identifiers().map_err(CardioRiskError::from)?;
    println!("Registered users ({}):", ids.len());
    for id in ids {
        println!("  {id}");
    }
    Ok(())
}

fn model_info(settings: &Settings) -> Result<()> {
    let model = ModelClassifier::load(&settings.model).map_err(CardioRiskError::from)?;
    println!("Model fingerprint (sha256): {}", model.fingerprint());
    match model.card() {
        Some(card) => {
            println!("Algorithm: {}", card.algorithm);
            if let Some(n) = card.n_estimators {
                println!("Estimators: {n}");
            }
            if let Some(dataset) = &card.dataset {
                println!("Dataset: {dataset}");
            }
            for (metric, value) in &card.metrics {
                println!("  {metric:<10} {value:.3}");
            }
            let ranked = card.ranked_importances();
            if !ranked.is_empty() {
                println!("Feature importances:");
                for (feature, value) in ranked {
                    println!("  {feature:<12} {value:.3}");
                }
            }
        }
        None => println!("No model card bundled with this artifact."),
    }
    Ok(())
}
