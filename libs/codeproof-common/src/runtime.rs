use crate::types::JudgmentKind;
use regex::Regex;
use rustpython_parser::{ast, Parse};
use serde::Serialize;
use thiserror::Error;

/// Raw report shape a runtime adapter emits inside the execution unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportFormat {
    /// pytest-json-report output
    PytestJson,
    /// Surefire / JUnit XML testsuite
    JunitXml,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeVersion {
    pub version: String,
    pub base_image: String,
}

impl RuntimeVersion {
    pub fn new(version: impl Into<String>, base_image: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            base_image: base_image.into(),
        }
    }
}

/// Parser run over source text before anything is staged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxCheck {
    Python,
}

impl SyntaxCheck {
    /// Parser message on failure
    pub fn check(self, source: &str) -> Result<(), String> {
        match self {
            SyntaxCheck::Python => ast::Suite::parse(source, "<source>")
                .map(|_| ())
                .map_err(|e| e.to_string()),
        }
    }
}

/// Why test text was turned away before generation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TestRejection {
    #[error("Test code is empty.")]
    Empty,
    #[error("Syntax error: {0}")]
    Syntax(String),
    #[error("No test functions found. {0}")]
    NoTests(String),
}

impl TestRejection {
    pub fn kind(&self) -> JudgmentKind {
        match self {
            TestRejection::Syntax(_) => JudgmentKind::Syntax,
            TestRejection::Empty | TestRejection::NoTests(_) => JudgmentKind::InvalidInput,
        }
    }
}

/// A file rendered into the build context next to the source artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestTemplate {
    pub filename: String,
    pub template: String,
}

impl ManifestTemplate {
    pub fn new(filename: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            template: template.into(),
        }
    }
}

/// Language Runtime (Immutable)
///
/// A runtime adapter expressed as data. Every template is a handlebars
/// template rendered against the same variables:
/// `token`, `artifact`, `version`, `base_image`, `report_path`,
/// plus `implementation` and `tests` for the source template.
///
/// ## Adapter contract
/// `run_command` must write the report to `report_path` even when tests
/// fail, otherwise the executor reports `ReportMissing`.
#[derive(Debug, Clone)]
pub struct LanguageRuntime {
    pub id: String,
    /// Ordered, oldest first
    pub versions: Vec<RuntimeVersion>,
    pub default_version: String,
    pub extension: String,
    pub artifact_template: String,
    /// Implementation first, tests after, exactly once
    pub source_template: String,
    pub manifests: Vec<ManifestTemplate>,
    pub run_command: Vec<String>,
    pub report_path: String,
    pub report_format: ReportFormat,
    /// At least one match required in the test text
    pub test_pattern: Regex,
    pub test_hint: String,
    /// Run the execution unit with networking disabled
    pub offline: bool,
    /// Checked before staging; `None` leaves syntax to the build
    pub syntax: Option<SyntaxCheck>,
    /// The image build compiles the sources, so a build failure is the
    /// candidate's syntax rather than the environment
    pub compiles_in_build: bool,
}

impl LanguageRuntime {
    pub fn version(&self, version: &str) -> Option<&RuntimeVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    pub fn version_names(&self) -> Vec<&str> {
        self.versions.iter().map(|v| v.version.as_str()).collect()
    }

    /// Pre-flight check of test text before anything is generated or built
    pub fn check_tests(&self, tests: &str) -> Result<(), TestRejection> {
        if tests.trim().is_empty() {
            return Err(TestRejection::Empty);
        }
        self.check_source(tests).map_err(TestRejection::Syntax)?;
        if !self.test_pattern.is_match(tests) {
            return Err(TestRejection::NoTests(self.test_hint.clone()));
        }
        Ok(())
    }

    pub fn check_source(&self, source: &str) -> Result<(), String> {
        match self.syntax {
            Some(check) => check.check(source),
            None => Ok(()),
        }
    }
}
