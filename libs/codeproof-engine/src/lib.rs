//! Sandboxed verification engine.
//!
//! Stages candidate code next to its tests, runs it in a disposable
//! container, normalizes the runtime's report and drives bounded repair
//! rounds against a generation backend.

pub mod controller;
pub mod docker;
pub mod engine;
pub mod error;
pub mod executor;
pub mod generation;
pub mod normalizer;
pub mod staging;

#[cfg(test)]
mod fakes;

pub use controller::{failure_digest, Controller, VerificationOutcome};
pub use docker::DockerEngine;
pub use engine::ExecutionBackend;
pub use error::{EngineError, GenerationError, SandboxError};
pub use executor::SandboxExecutor;
pub use generation::{ChatCompletionsBackend, GenerationBackend};

use codeproof_common::{Config, ExecutionReport, ExecutionRequest, Registry};
use std::sync::Arc;
use tracing::info;

/// Public surface for front ends.
///
/// Holds only read-only state, so one `Engine` serves concurrent requests;
/// every request stages its own contexts.
pub struct Engine {
    registry: Arc<Registry>,
    executor: SandboxExecutor,
    generator: Arc<dyn GenerationBackend>,
    max_rounds: u32,
}

impl Engine {
    pub fn new(
        registry: Arc<Registry>,
        backend: Arc<dyn ExecutionBackend>,
        generator: Arc<dyn GenerationBackend>,
        config: &Config,
    ) -> Self {
        Self {
            registry,
            executor: SandboxExecutor::new(backend, config),
            generator,
            max_rounds: config.max_rounds.max(1),
        }
    }

    /// Builtin runtimes, Docker on local defaults and the chat completions client
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let backend = DockerEngine::connect()?;
        Ok(Self::new(
            Arc::new(Registry::builtin()),
            Arc::new(backend),
            Arc::new(ChatCompletionsBackend::from_config(config)),
            config,
        ))
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn list_languages(&self) -> Vec<String> {
        self.registry
            .list_languages()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn list_versions(&self, language: &str) -> Result<Vec<String>, EngineError> {
        Ok(self
            .registry
            .list_versions(language)?
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Full generate → execute → revise session for `tests`
    pub async fn verify(
        &self,
        tests: &str,
        language: &str,
        version: Option<&str>,
    ) -> Result<VerificationOutcome, EngineError> {
        let runtime = self.registry.resolve_or_default(language, version)?;
        Controller::new(&self.executor, self.generator.as_ref(), self.max_rounds)
            .verify(tests, &runtime)
            .await
    }

    /// One sandbox round for a given implementation, without generation
    pub async fn run(
        &self,
        implementation: &str,
        tests: &str,
        language: &str,
        version: Option<&str>,
    ) -> Result<ExecutionReport, EngineError> {
        let runtime = self.registry.resolve_or_default(language, version)?;
        runtime.runtime.check_tests(tests)?;
        let request = ExecutionRequest::new(
            implementation,
            tests,
            runtime.id(),
            runtime.version.version.clone(),
        );

        info!(
            language = %runtime.id(),
            version = %runtime.version.version,
            backend = self.executor.backend_name(),
            "Running candidate"
        );
        Ok(self.executor.run(&request, &runtime).await?)
    }
}
