// CLI commands over the verification engine
use anyhow::{Context, Result};
use codeproof_common::Config;
use codeproof_engine::{Engine, EngineError, VerificationOutcome};
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", rendered);
    Ok(())
}

/// Errors from the engine are results, not crashes: print them as `{"error": ...}`
fn print_error(err: &EngineError) -> Result<bool> {
    warn!(error = %err, "Request failed");
    print_json(&json!({ "error": err.to_string() }))?;
    Ok(false)
}

/// The Docker client connects lazily, so listing works without a daemon
fn connect(config: &Config) -> Result<Engine> {
    Engine::from_config(config).context("Failed to configure Docker client")
}

pub fn list_languages(config: &Config, as_json: bool) -> Result<bool> {
    let engine = connect(config)?;
    let languages = engine.list_languages();

    if as_json {
        print_json(&languages)?;
        return Ok(true);
    }

    println!("📋 Supported Languages:\n");
    println!("{:<12} {}", "Name", "Versions");
    println!("{}", "─".repeat(40));
    for language in &languages {
        let versions = engine.list_versions(language).unwrap_or_default();
        println!("{:<12} {}", language, versions.join(", "));
    }
    println!("\n✅ Total: {} language(s)", languages.len());

    Ok(true)
}

pub fn list_versions(config: &Config, language: &str, as_json: bool) -> Result<bool> {
    let engine = connect(config)?;

    match engine.list_versions(language) {
        Ok(versions) if as_json => {
            print_json(&json!({ "language": language, "versions": versions }))?;
            Ok(true)
        }
        Ok(versions) => {
            println!("{}: {}", language, versions.join(", "));
            Ok(true)
        }
        Err(e) => print_error(&e),
    }
}

pub async fn run(
    config: &Config,
    code: &Path,
    tests: &Path,
    language: &str,
    version: Option<&str>,
) -> Result<bool> {
    let implementation = read_source(code)?;
    let tests = read_source(tests)?;
    let engine = connect(config)?;

    match engine.run(&implementation, &tests, language, version).await {
        Ok(report) => {
            info!(
                passed = report.summary.passed,
                total = report.summary.total,
                total_ms = report.total_ms,
                "Run complete"
            );
            print_json(&report)?;
            Ok(report.all_passed())
        }
        Err(e) => print_error(&e),
    }
}

pub async fn verify(config: &Config, tests: &Path, language: &str, version: Option<&str>) -> Result<bool> {
    let tests = read_source(tests)?;
    let engine = connect(config)?;

    match engine.verify(&tests, language, version).await {
        Ok(outcome) => {
            match &outcome {
                VerificationOutcome::Passed { rounds, .. } => {
                    info!(rounds, "Verification passed")
                }
                VerificationOutcome::Exhausted { rounds, .. } => {
                    warn!(rounds, "Gave up after exhausting the round budget")
                }
                VerificationOutcome::Unrepairable { judgment, .. } => {
                    warn!(message = %judgment.message, "Input cannot be repaired")
                }
            }
            print_json(&outcome)?;
            Ok(outcome.passed())
        }
        Err(e) => print_error(&e),
    }
}
