use serde::{Deserialize, Serialize};

/// Execution Request (Immutable)
/// One verification attempt: candidate code, the tests it must pass and
/// the runtime to judge it with. Built per attempt, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub implementation: String,
    pub tests: String,
    pub language: String,
    pub version: String,
}

impl ExecutionRequest {
    pub fn new(
        implementation: impl Into<String>,
        tests: impl Into<String>,
        language: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            implementation: implementation.into(),
            tests: tests.into(),
            language: language.into(),
            version: version.into(),
        }
    }
}

/// Per-Test Verdict
/// Anything the runtime does not report as passed is a failure;
/// `Errored` marks setup/collection problems rather than assertion failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestVerdict {
    Passed,
    Failed,
    Errored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Failure detail for a single test.
/// `message` is the first line of the runtime's failure narrative,
/// `detail` is everything after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub message: String,
    pub detail: String,
    /// Structured failure type, for runtimes that report one separately
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl FailureDetail {
    /// Split a failure narrative into first-line message and remaining detail
    pub fn from_narrative(text: &str) -> Self {
        let text = text.trim();
        let (first, rest) = match text.split_once('\n') {
            Some((first, rest)) => (first, rest),
            None => (text, ""),
        };
        Self {
            message: first.trim().to_string(),
            detail: rest.trim().to_string(),
            kind: None,
            location: None,
        }
    }
}

/// Per-Test Outcome
/// Ordering follows the runtime's reported order; never reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Qualified name, path segments joined by `::`
    pub name: String,
    pub verdict: TestVerdict,
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetail>,
}

impl TestOutcome {
    /// Last path segment of the qualified name
    pub fn short_name(&self) -> &str {
        self.name.rsplit("::").next().unwrap_or(&self.name)
    }

    pub fn passed(&self) -> bool {
        self.verdict == TestVerdict::Passed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: u32,
    pub passed: u32,
}

impl Summary {
    pub fn failed(&self) -> u32 {
        self.total.saturating_sub(self.passed)
    }
}

/// Execution Report
/// Language-agnostic result of one sandbox run.
///
/// ## Invariant
/// `summary.passed + summary.failed() == summary.total`, and the counts
/// agree with `tests`. The normalizer rejects raw reports that break it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub summary: Summary,
    pub tests: Vec<TestOutcome>,
    pub build_ms: u64,
    pub run_ms: u64,
    pub total_ms: u64,
}

impl ExecutionReport {
    /// An empty run proves nothing, so it never counts as a pass
    pub fn all_passed(&self) -> bool {
        self.summary.total > 0 && self.summary.passed == self.summary.total
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestOutcome> {
        self.tests.iter().filter(|t| !t.passed())
    }
}

/// One (testcase, implementation) pair produced by the generation backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPair {
    pub testcase: String,
    pub implementation: String,
}

/// Where a judged error originates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JudgmentSource {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "testcases", alias = "testcase")]
    Testcase,
    #[serde(rename = "implementation")]
    Implementation,
    /// The sandbox run itself (build failure, timeout, failing tests)
    #[serde(rename = "docker", alias = "sandbox")]
    Sandbox,
    #[serde(rename = "other")]
    #[serde(other)]
    Other,
}

impl JudgmentSource {
    /// Sources the controller may keep revising against
    pub fn is_repairable(&self) -> bool {
        matches!(
            self,
            JudgmentSource::None | JudgmentSource::Implementation | JudgmentSource::Sandbox
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JudgmentKind {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "syntaxError")]
    Syntax,
    #[serde(rename = "dependencyError")]
    Dependency,
    #[serde(rename = "invalidInput", alias = "noValidCode")]
    InvalidInput,
    #[serde(rename = "logicError")]
    Logic,
    #[serde(rename = "unknownError")]
    #[serde(other)]
    Unknown,
}

/// Structured error judgment attached to every generation result
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorJudgment {
    #[serde(default)]
    pub source: JudgmentSource,
    #[serde(rename = "type", default)]
    pub kind: JudgmentKind,
    #[serde(default)]
    pub message: String,
}

impl ErrorJudgment {
    pub fn new(source: JudgmentSource, kind: JudgmentKind, message: impl Into<String>) -> Self {
        Self {
            source,
            kind,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind != JudgmentKind::None
    }

    /// The input tests themselves are broken; no revision can help
    pub fn blames_testcase(&self) -> bool {
        self.is_error() && self.source == JudgmentSource::Testcase
    }
}

/// Generation Result
/// Produced only by the generation backend. All pairs share one namespace,
/// so they are executed together as a single artifact.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenerationResult {
    #[serde(rename = "test2code", default)]
    pub pairs: Vec<TestPair>,
    #[serde(default)]
    pub error: ErrorJudgment,
}

impl GenerationResult {
    /// All implementations in order, joined with a blank line
    pub fn implementation(&self) -> String {
        self.pairs
            .iter()
            .map(|p| p.implementation.trim_end())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// All testcases in order, joined with a blank line
    pub fn testcases(&self) -> String {
        self.pairs
            .iter()
            .map(|p| p.testcase.trim_end())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
