/// Result Normalizer - Runtime-Agnostic Report Reduction
///
/// **Core Responsibility:**
/// Reduce a runtime's raw report bytes to the uniform `ExecutionReport`.
///
/// **Critical Properties:**
/// - Knows nothing about Docker
/// - Knows nothing about generation or retries
/// - Pure function: (raw bytes, report format) → report
///
/// **Reduction Rules:**
/// - Any outcome other than the runtime's "passed" marker is a failure
/// - Failure message is the first line of the failure narrative, detail is the rest
/// - Test order is the runtime's reported order
/// - `summary.passed + failed == summary.total` and both agree with the
///   per-test outcomes; a raw report breaking this is rejected, never propagated

mod junit;
mod pytest;

use crate::error::{Result, SandboxError};
use codeproof_common::{ExecutionReport, ReportFormat, Summary, TestOutcome};
use tracing::debug;

/// Report bytes as retrieved from a terminated execution unit
#[derive(Debug, Clone)]
pub struct RawReport {
    pub bytes: Vec<u8>,
    pub build_ms: u64,
    pub run_ms: u64,
}

/// Output of a single format adapter, before validation
#[derive(Debug)]
pub(crate) struct ParsedReport {
    pub summary: Summary,
    pub tests: Vec<TestOutcome>,
}

pub fn normalize(raw: &RawReport, format: ReportFormat) -> Result<ExecutionReport> {
    let parsed = match format {
        ReportFormat::PytestJson => pytest::parse(&raw.bytes)?,
        ReportFormat::JunitXml => junit::parse(&raw.bytes)?,
    };

    check_consistency(&parsed)?;

    debug!(
        format = ?format,
        total = parsed.summary.total,
        passed = parsed.summary.passed,
        "Normalized test report"
    );

    Ok(ExecutionReport {
        summary: parsed.summary,
        tests: parsed.tests,
        build_ms: raw.build_ms,
        run_ms: raw.run_ms,
        total_ms: raw.build_ms + raw.run_ms,
    })
}

fn check_consistency(parsed: &ParsedReport) -> Result<()> {
    let summary = parsed.summary;
    if summary.passed > summary.total {
        return Err(SandboxError::MalformedReport(format!(
            "summary claims {} passed of {} total",
            summary.passed, summary.total
        )));
    }

    if parsed.tests.len() != summary.total as usize {
        return Err(SandboxError::MalformedReport(format!(
            "summary total {} does not match {} reported tests",
            summary.total,
            parsed.tests.len()
        )));
    }

    let passed = parsed.tests.iter().filter(|t| t.passed()).count();
    if passed != summary.passed as usize {
        return Err(SandboxError::MalformedReport(format!(
            "summary claims {} passed but {} tests passed",
            summary.passed, passed
        )));
    }

    Ok(())
}
