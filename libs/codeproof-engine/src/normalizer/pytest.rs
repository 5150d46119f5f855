//! pytest-json-report adapter.
//!
//! Zero counts are omitted from the plugin's summary, so every count
//! defaults to 0. Collection errors (e.g. a syntax error in the candidate)
//! appear under `collectors` rather than `tests`; each failed collector is
//! reported as one errored outcome so a broken module never reads as a pass.
//!
//! When pytest records a structured crash, its message is the short failure
//! message and the whole longrepr is the detail; otherwise the longrepr is
//! split at its first line.

use super::ParsedReport;
use crate::error::{Result, SandboxError};
use codeproof_common::types::{FailureDetail, SourceLocation};
use codeproof_common::{Summary, TestOutcome, TestVerdict};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PytestReport {
    summary: PytestSummary,
    #[serde(default)]
    tests: Vec<PytestTest>,
    #[serde(default)]
    collectors: Vec<PytestCollector>,
}

#[derive(Debug, Deserialize)]
struct PytestSummary {
    #[serde(default)]
    passed: u32,
    #[serde(default)]
    total: u32,
}

#[derive(Debug, Deserialize)]
struct PytestTest {
    nodeid: String,
    outcome: String,
    setup: Option<PytestStage>,
    call: Option<PytestStage>,
    teardown: Option<PytestStage>,
}

#[derive(Debug, Deserialize)]
struct PytestStage {
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    outcome: String,
    longrepr: Option<String>,
    crash: Option<PytestCrash>,
}

#[derive(Debug, Deserialize)]
struct PytestCrash {
    path: String,
    lineno: Option<u32>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct PytestCollector {
    nodeid: String,
    outcome: String,
    longrepr: Option<String>,
}

pub(crate) fn parse(bytes: &[u8]) -> Result<ParsedReport> {
    let report: PytestReport = serde_json::from_slice(bytes)
        .map_err(|e| SandboxError::MalformedReport(format!("pytest json: {}", e)))?;

    let mut tests: Vec<TestOutcome> = report.tests.into_iter().map(outcome).collect();
    let mut summary = Summary {
        total: report.summary.total,
        passed: report.summary.passed,
    };

    for collector in report
        .collectors
        .into_iter()
        .filter(|c| c.outcome == "failed")
    {
        let narrative = collector
            .longrepr
            .unwrap_or_else(|| "collection failed".to_string());
        tests.push(TestOutcome {
            name: collector.nodeid,
            verdict: TestVerdict::Errored,
            duration_secs: 0.0,
            failure: Some(FailureDetail::from_narrative(&narrative)),
        });
        summary.total += 1;
    }

    Ok(ParsedReport { summary, tests })
}

fn outcome(test: PytestTest) -> TestOutcome {
    let verdict = match test.outcome.as_str() {
        "passed" => TestVerdict::Passed,
        "error" => TestVerdict::Errored,
        _ => TestVerdict::Failed,
    };

    let duration_secs = test.call.as_ref().map(|c| c.duration).unwrap_or(0.0);

    let failure = if verdict == TestVerdict::Passed {
        None
    } else {
        // The first stage that did not pass carries the narrative
        let stage = [&test.setup, &test.call, &test.teardown]
            .into_iter()
            .flatten()
            .find(|s| s.outcome != "passed");
        Some(failure_detail(stage, &test.outcome))
    };

    TestOutcome {
        name: test.nodeid,
        verdict,
        duration_secs,
        failure,
    }
}

fn failure_detail(stage: Option<&PytestStage>, outcome: &str) -> FailureDetail {
    let Some(stage) = stage else {
        return FailureDetail::from_narrative(&format!("test {}", outcome));
    };

    let longrepr = stage.longrepr.as_deref().map(str::trim).unwrap_or("");
    let mut detail = match &stage.crash {
        Some(crash) if !crash.message.trim().is_empty() => {
            let mut detail = FailureDetail::from_narrative(&crash.message);
            detail.detail = longrepr.to_string();
            detail
        }
        _ if !longrepr.is_empty() => FailureDetail::from_narrative(longrepr),
        _ => FailureDetail::from_narrative(&format!("test {}", outcome)),
    };

    detail.location = stage.crash.as_ref().map(|crash| SourceLocation {
        path: crash.path.clone(),
        line: crash.lineno,
    });
    detail
}
