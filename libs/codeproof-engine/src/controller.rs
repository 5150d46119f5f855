/// Retry-Refinement Controller
///
/// One verification session, as an explicit state machine:
///
/// ```text
/// Generating ─► Executing ─► Evaluating ─┬─► Done(Passed)
///      │            ▲                    ├─► Done(Exhausted)     (budget spent)
///      │            └──── Revising ◄─────┘
///      │                     └─────────────► Done(Unrepairable)  (judgment not repairable)
///      └───────────────────────────────────► Done(Unrepairable)  (tests judged invalid)
/// ```
///
/// **Session rules:**
/// - The round counter advances once per Executing pass; Exhausted after
///   `max_rounds` passes, never revising after the last one
/// - Testcase text is pinned from the initial generation; revisions only
///   replace implementations. Generated tests that fail the runtime's
///   pre-flight check are dropped in favour of the caller's
/// - Every round stages a fresh context through the executor
/// - Candidate faults (unparsable source, build failure, timeout) are a
///   failed round; any other
///   sandbox error or a generation transport error aborts the session

use crate::error::{EngineError, SandboxError};
use crate::executor::SandboxExecutor;
use crate::generation::GenerationBackend;
use codeproof_common::{
    ErrorJudgment, ExecutionReport, ExecutionRequest, GenerationResult, JudgmentKind,
    JudgmentSource, ResolvedRuntime,
};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Terminal state of one verification session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// Every test passed in the last executed round
    Passed {
        result: GenerationResult,
        report: ExecutionReport,
        rounds: u32,
    },
    /// Round budget spent; the last attempt and its failure are attached
    Exhausted {
        result: GenerationResult,
        #[serde(skip_serializing_if = "Option::is_none")]
        report: Option<ExecutionReport>,
        digest: String,
        rounds: u32,
    },
    /// The input tests, or a revision's judgment, rule out repair
    Unrepairable {
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<GenerationResult>,
        judgment: ErrorJudgment,
        rounds: u32,
    },
}

impl VerificationOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, VerificationOutcome::Passed { .. })
    }

    pub fn rounds(&self) -> u32 {
        match self {
            VerificationOutcome::Passed { rounds, .. }
            | VerificationOutcome::Exhausted { rounds, .. }
            | VerificationOutcome::Unrepairable { rounds, .. } => *rounds,
        }
    }
}

/// Result of one Executing pass
#[derive(Debug)]
enum Attempt {
    Report(ExecutionReport),
    /// The candidate broke the build or ran past the timeout
    Fault(SandboxError),
}

#[derive(Debug)]
enum Phase {
    Generating,
    Executing(GenerationResult),
    Evaluating(GenerationResult, Attempt),
    Revising(GenerationResult, String),
    Done(VerificationOutcome),
}

/// `"Test {short name}: {message} "` for every failing test, in report order
pub fn failure_digest(report: &ExecutionReport) -> String {
    let digest: String = report
        .failures()
        .map(|t| {
            let message = t.failure.as_ref().map(|f| f.message.as_str()).unwrap_or("");
            format!("Test {}: {} ", t.short_name(), message)
        })
        .collect();

    if digest.is_empty() && report.summary.total == 0 {
        return "No tests were collected. ".to_string();
    }
    digest
}

/// Judgment attached to a result whose round failed in the sandbox itself.
/// A build failure only points at the candidate when the build compiles it;
/// otherwise the build is installing dependencies.
fn sandbox_judgment(error: &SandboxError, runtime: &ResolvedRuntime) -> ErrorJudgment {
    let kind = match error {
        SandboxError::InvalidSource(_) => JudgmentKind::Syntax,
        SandboxError::BuildFailure(_) if runtime.runtime.compiles_in_build => JudgmentKind::Syntax,
        SandboxError::BuildFailure(_) => JudgmentKind::Dependency,
        SandboxError::ExecutionTimeout(_) => JudgmentKind::Logic,
        _ => JudgmentKind::Unknown,
    };
    ErrorJudgment::new(JudgmentSource::Sandbox, kind, error.to_string())
}

pub struct Controller<'a> {
    executor: &'a SandboxExecutor,
    generator: &'a dyn GenerationBackend,
    max_rounds: u32,
}

impl<'a> Controller<'a> {
    pub fn new(
        executor: &'a SandboxExecutor,
        generator: &'a dyn GenerationBackend,
        max_rounds: u32,
    ) -> Self {
        Self {
            executor,
            generator,
            max_rounds: max_rounds.max(1),
        }
    }

    /// Run a full session for `tests` against `runtime`
    pub async fn verify(
        &self,
        tests: &str,
        runtime: &ResolvedRuntime,
    ) -> Result<VerificationOutcome, EngineError> {
        let span = info_span!(
            "verify",
            session = %Uuid::new_v4(),
            language = %runtime.id(),
            version = %runtime.version.version,
        );
        self.session(tests, runtime).instrument(span).await
    }

    async fn session(
        &self,
        tests: &str,
        runtime: &ResolvedRuntime,
    ) -> Result<VerificationOutcome, EngineError> {
        if let Err(rejection) = runtime.runtime.check_tests(tests) {
            info!(reason = %rejection, "Test text rejected before generation");
            return Ok(VerificationOutcome::Unrepairable {
                result: None,
                judgment: ErrorJudgment::new(
                    JudgmentSource::Testcase,
                    rejection.kind(),
                    rejection.to_string(),
                ),
                rounds: 0,
            });
        }

        let language = runtime.id();
        let mut pinned_tests = tests.to_string();
        let mut round = 0u32;
        let mut phase = Phase::Generating;

        loop {
            phase = match phase {
                Phase::Generating => {
                    let result = self.generator.generate(language, tests).await?;
                    if result.error.blames_testcase() {
                        info!(kind = ?result.error.kind, "Tests judged invalid");
                        Phase::Done(VerificationOutcome::Unrepairable {
                            judgment: result.error.clone(),
                            result: Some(result),
                            rounds: round,
                        })
                    } else {
                        let generated = result.testcases();
                        if !generated.trim().is_empty() {
                            match runtime.runtime.check_tests(&generated) {
                                Ok(()) => pinned_tests = generated,
                                Err(rejection) => warn!(
                                    reason = %rejection,
                                    "Keeping caller tests over generated ones"
                                ),
                            }
                        }
                        info!(pairs = result.pairs.len(), "Initial candidate generated");
                        Phase::Executing(result)
                    }
                }

                Phase::Executing(result) => {
                    round += 1;
                    let request = ExecutionRequest::new(
                        result.implementation(),
                        pinned_tests.clone(),
                        language,
                        runtime.version.version.clone(),
                    );

                    let attempt = match self.executor.run(&request, runtime).await {
                        Ok(report) => Attempt::Report(report),
                        Err(e) if e.is_candidate_fault() => Attempt::Fault(e),
                        Err(e) => {
                            warn!(round, error = %e, "Aborting session on infrastructure error");
                            return Err(e.into());
                        }
                    };
                    Phase::Evaluating(result, attempt)
                }

                Phase::Evaluating(mut result, attempt) => {
                    let (report, digest) = match attempt {
                        Attempt::Report(report) if report.all_passed() => {
                            info!(round, total = report.summary.total, "All tests passed");
                            return Ok(VerificationOutcome::Passed {
                                result,
                                report,
                                rounds: round,
                            });
                        }
                        Attempt::Report(report) => {
                            let digest = failure_digest(&report);
                            info!(
                                round,
                                passed = report.summary.passed,
                                total = report.summary.total,
                                "Round failed"
                            );
                            (Some(report), digest)
                        }
                        Attempt::Fault(error) => {
                            info!(round, error = %error, "Candidate failed in the sandbox");
                            result.error = sandbox_judgment(&error, runtime);
                            (None, error.to_string())
                        }
                    };

                    if round >= self.max_rounds {
                        info!(rounds = round, "Round budget exhausted");
                        Phase::Done(VerificationOutcome::Exhausted {
                            result,
                            report,
                            digest,
                            rounds: round,
                        })
                    } else {
                        Phase::Revising(result, digest)
                    }
                }

                Phase::Revising(result, digest) => {
                    let revised = self
                        .generator
                        .revise(language, &pinned_tests, &result.implementation(), &digest)
                        .await?;

                    if revised.error.is_error() && !revised.error.source.is_repairable() {
                        info!(
                            round,
                            source = ?revised.error.source,
                            kind = ?revised.error.kind,
                            "Revision judged unrepairable"
                        );
                        Phase::Done(VerificationOutcome::Unrepairable {
                            judgment: revised.error.clone(),
                            result: Some(revised),
                            rounds: round,
                        })
                    } else {
                        Phase::Executing(revised)
                    }
                }

                Phase::Done(outcome) => return Ok(outcome),
            };
        }
    }
}
