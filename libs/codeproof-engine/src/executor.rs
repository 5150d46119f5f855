/// Sandbox Executor
///
/// Drives one staged context through the execution backend:
/// build → run → wait (bounded) → read report.
/// Candidate source that fails the runtime's syntax check is refused before
/// anything is staged.
///
/// ## Teardown Rules
/// - Unit removal then image removal, exactly once each, on every exit path
/// - Handles are fixed by the context, so a failed build still tears down
/// - Teardown failures are logged, never surfaced over the round's own result
/// - Teardown runs as its own task, so dropping the calling future mid-flight
///   (before or during removal) never skips a step
///
/// The staging directory belongs to the `ExecutionContext` and goes away
/// with it.

use crate::engine::{ExecutionBackend, ImageHandle, UnitHandle, UnitLimits};
use crate::error::{Result, SandboxError};
use crate::normalizer::{normalize, RawReport};
use crate::staging::{ExecutionContext, ImageBuilder};
use codeproof_common::{Config, ExecutionReport, ExecutionRequest, ResolvedRuntime};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct SandboxExecutor {
    backend: Arc<dyn ExecutionBackend>,
    builder: ImageBuilder,
    timeout: Duration,
    memory_bytes: i64,
    nano_cpus: i64,
}

impl SandboxExecutor {
    pub fn new(backend: Arc<dyn ExecutionBackend>, config: &Config) -> Self {
        Self {
            backend,
            builder: ImageBuilder::new(config.staging_dir.clone()),
            timeout: config.execution_timeout(),
            memory_bytes: (config.sandbox_memory_mb as i64).saturating_mul(1024 * 1024),
            nano_cpus: config.sandbox_nano_cpus,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn limits_for(&self, ctx: &ExecutionContext) -> UnitLimits {
        UnitLimits {
            memory_bytes: self.memory_bytes,
            nano_cpus: self.nano_cpus,
            network_disabled: ctx.offline(),
        }
    }

    /// Stage, execute and normalize one request in a fresh context
    pub async fn run(
        &self,
        request: &ExecutionRequest,
        runtime: &ResolvedRuntime,
    ) -> Result<ExecutionReport> {
        runtime
            .runtime
            .check_source(&request.implementation)
            .map_err(SandboxError::InvalidSource)?;

        let ctx = self.builder.prepare(request, runtime)?;
        let raw = self.execute(&ctx).await?;
        let report = normalize(&raw, runtime.runtime.report_format)?;

        info!(
            context_id = %ctx.token(),
            language = %runtime.id(),
            version = %runtime.version.version,
            total = report.summary.total,
            passed = report.summary.passed,
            build_ms = report.build_ms,
            run_ms = report.run_ms,
            "Execution finished"
        );

        Ok(report)
    }

    /// Run a staged context and return the raw report bytes.
    /// The unit and image are always torn down before this returns.
    pub async fn execute(&self, ctx: &ExecutionContext) -> Result<RawReport> {
        let teardown = Teardown::new(Arc::clone(&self.backend), ctx);
        let result = self.attempt(ctx).await;

        if let Err(e) = &result {
            warn!(context_id = %ctx.token(), error = %e, "Execution attempt failed");
        }

        teardown.release().await;
        result
    }

    async fn attempt(&self, ctx: &ExecutionContext) -> Result<RawReport> {
        let build_started = Instant::now();
        let image = self.backend.build(ctx).await?;
        let build_ms = build_started.elapsed().as_millis() as u64;
        debug!(context_id = %ctx.token(), image = %image.tag, build_ms, "Image built");

        let run_started = Instant::now();
        let unit = self.backend.run(&image, ctx, self.limits_for(ctx)).await?;
        let state = self.backend.wait(&unit, self.timeout).await?;
        let run_ms = run_started.elapsed().as_millis() as u64;

        // Failing tests exit non-zero; only the report decides the verdict
        debug!(
            context_id = %ctx.token(),
            unit = %unit.name,
            exit_code = state.exit_code,
            run_ms,
            "Execution unit stopped"
        );

        let bytes = self.backend.read_file(&unit, ctx.report_path()).await?;

        Ok(RawReport {
            bytes,
            build_ms,
            run_ms,
        })
    }
}

/// Scoped release of one context's unit and image
struct Teardown {
    backend: Arc<dyn ExecutionBackend>,
    unit: UnitHandle,
    image: ImageHandle,
    armed: bool,
}

impl Teardown {
    fn new(backend: Arc<dyn ExecutionBackend>, ctx: &ExecutionContext) -> Self {
        Self {
            backend,
            unit: UnitHandle::for_context(ctx),
            image: ImageHandle::for_context(ctx),
            armed: true,
        }
    }

    /// Hand both removals to a task of their own; once spawned they run to
    /// completion whether or not anyone awaits the handle.
    fn detach(&mut self) -> Option<JoinHandle<()>> {
        self.armed = false;

        let backend = Arc::clone(&self.backend);
        let unit = self.unit.clone();
        let image = self.image.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(async move {
                remove_all(backend.as_ref(), &unit, &image).await;
            })),
            Err(_) => {
                warn!(
                    unit = %unit.name,
                    image = %image.tag,
                    "No async runtime left to tear down execution unit"
                );
                None
            }
        }
    }

    async fn release(mut self) {
        if let Some(task) = self.detach() {
            if let Err(e) = task.await {
                warn!(unit = %self.unit.name, error = %e, "Teardown task did not finish");
            }
        }
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if self.armed {
            warn!(unit = %self.unit.name, "Execution cancelled, tearing down in background");
            self.detach();
        }
    }
}

async fn remove_all(backend: &dyn ExecutionBackend, unit: &UnitHandle, image: &ImageHandle) {
    if let Err(e) = backend.remove(unit).await {
        warn!(unit = %unit.name, error = %e, "Failed to remove execution unit");
    }
    if let Err(e) = backend.remove_image(image).await {
        warn!(image = %image.tag, error = %e, "Failed to remove image");
    }
}
