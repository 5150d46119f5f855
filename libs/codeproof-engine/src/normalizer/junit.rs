//! Surefire / JUnit XML adapter.
//!
//! The `<failure>`/`<error>` `type` attribute is exposed separately as the
//! failure kind; the element text is the narrative. The source location is
//! the first stack frame in the test class's own file.

use super::ParsedReport;
use crate::error::{Result, SandboxError};
use codeproof_common::types::{FailureDetail, SourceLocation};
use codeproof_common::{Summary, TestOutcome, TestVerdict};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

#[derive(Debug, Deserialize)]
struct TestSuite {
    #[serde(rename = "@tests")]
    tests: u32,
    #[serde(rename = "@failures", default)]
    failures: u32,
    #[serde(rename = "@errors", default)]
    errors: u32,
    #[serde(rename = "@skipped", default)]
    skipped: u32,
    #[serde(rename = "testcase", default)]
    cases: Vec<TestCase>,
}

#[derive(Debug, Deserialize)]
struct TestCase {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@classname", default)]
    classname: String,
    #[serde(rename = "@time", default)]
    time: Option<String>,
    failure: Option<Problem>,
    error: Option<Problem>,
    skipped: Option<Problem>,
}

#[derive(Debug, Default, Deserialize)]
struct Problem {
    #[serde(rename = "@message", default)]
    message: Option<String>,
    #[serde(rename = "@type", default)]
    kind: Option<String>,
    #[serde(rename = "$text", default)]
    text: String,
}

fn frame_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\(([\w$]+\.java):(\d+)\)").expect("valid frame pattern"))
}

pub(crate) fn parse(bytes: &[u8]) -> Result<ParsedReport> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| SandboxError::MalformedReport(format!("junit xml is not utf-8: {}", e)))?;
    let suite: TestSuite = quick_xml::de::from_str(text)
        .map_err(|e| SandboxError::MalformedReport(format!("junit xml: {}", e)))?;

    let passed = suite
        .failures
        .checked_add(suite.errors)
        .and_then(|n| n.checked_add(suite.skipped))
        .and_then(|not_passed| suite.tests.checked_sub(not_passed))
        .ok_or_else(|| {
            SandboxError::MalformedReport(format!(
                "{} failures, {} errors and {} skipped exceed {} tests",
                suite.failures, suite.errors, suite.skipped, suite.tests
            ))
        })?;

    Ok(ParsedReport {
        summary: Summary {
            total: suite.tests,
            passed,
        },
        tests: suite.cases.into_iter().map(outcome).collect(),
    })
}

fn outcome(case: TestCase) -> TestOutcome {
    let duration_secs = case
        .time
        .as_deref()
        .and_then(|t| t.replace(',', "").trim().parse().ok())
        .unwrap_or(0.0);

    let (verdict, problem) = if let Some(problem) = case.failure {
        (TestVerdict::Failed, Some(problem))
    } else if let Some(problem) = case.error {
        (TestVerdict::Errored, Some(problem))
    } else if let Some(problem) = case.skipped {
        (TestVerdict::Failed, Some(problem))
    } else {
        (TestVerdict::Passed, None)
    };

    let name = if case.classname.is_empty() {
        case.name
    } else {
        format!("{}::{}", case.classname, case.name)
    };

    TestOutcome {
        name,
        verdict,
        duration_secs,
        failure: problem.map(|p| failure_detail(p, &case.classname)),
    }
}

fn failure_detail(problem: Problem, classname: &str) -> FailureDetail {
    let narrative = if problem.text.trim().is_empty() {
        problem.message.clone().unwrap_or_else(|| "test did not pass".to_string())
    } else {
        problem.text.clone()
    };

    let mut detail = FailureDetail::from_narrative(&narrative);
    detail.kind = problem.kind.filter(|k| !k.is_empty());
    detail.location = locate(&problem.text, classname);
    detail
}

fn locate(trace: &str, classname: &str) -> Option<SourceLocation> {
    let simple_class = classname.rsplit('.').next().unwrap_or(classname);
    let own_file = format!("{}.java", simple_class);

    frame_pattern()
        .captures_iter(trace)
        .find(|c| c[1] == own_file)
        .map(|c| SourceLocation {
            path: c[1].to_string(),
            line: c[2].parse().ok(),
        })
}
