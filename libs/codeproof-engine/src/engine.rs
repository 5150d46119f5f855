/// Execution Backend - Abstraction for Sandboxed Execution
///
/// **Core Responsibility:**
/// Build an image from a staged context, run one execution unit from it,
/// and hand back files left in the unit's filesystem.
///
/// **Critical Architectural Boundary:**
/// - Backend knows HOW to execute (Docker, or a fake in tests)
/// - Backend does NOT parse reports
/// - Backend does NOT decide when to tear down; the executor does
///
/// **Why This Exists:**
/// The executor's teardown guarantees are tested against a recording
/// fake, and production runs against `DockerEngine`, without either
/// side knowing about the other.

use crate::error::Result;
use crate::staging::ExecutionContext;
use async_trait::async_trait;
use std::time::Duration;

/// Image, identified by its unique tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageHandle {
    pub tag: String,
}

/// Execution unit, identified by its unique name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitHandle {
    pub name: String,
}

impl ImageHandle {
    /// Handles are fixed by the context before anything is built, so
    /// teardown can name them even when build or run never happened.
    pub fn for_context(ctx: &ExecutionContext) -> Self {
        Self {
            tag: ctx.image_tag().to_string(),
        }
    }
}

impl UnitHandle {
    pub fn for_context(ctx: &ExecutionContext) -> Self {
        Self {
            name: ctx.unit_name().to_string(),
        }
    }
}

/// Terminal state of an execution unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalState {
    pub exit_code: i64,
}

/// Resource envelope applied to every execution unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitLimits {
    pub memory_bytes: i64,
    pub nano_cpus: i64,
    pub network_disabled: bool,
}

/// Execution backend capability
///
/// Implementations must guarantee:
/// 1. `build` tags the image with `ctx.image_tag()` so concurrent builds never collide
/// 2. `run` starts exactly one non-interactive unit named `ctx.unit_name()`
/// 3. `wait` returns `ExecutionTimeout` once `timeout` elapses
/// 4. `remove` / `remove_image` succeed when the unit or image does not
///    exist (a failed build or run leaves nothing behind to remove)
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Human-readable backend name for logs
    fn name(&self) -> &'static str;

    async fn build(&self, ctx: &ExecutionContext) -> Result<ImageHandle>;

    async fn run(
        &self,
        image: &ImageHandle,
        ctx: &ExecutionContext,
        limits: UnitLimits,
    ) -> Result<UnitHandle>;

    async fn wait(&self, unit: &UnitHandle, timeout: Duration) -> Result<TerminalState>;

    async fn read_file(&self, unit: &UnitHandle, path: &str) -> Result<Vec<u8>>;

    async fn remove(&self, unit: &UnitHandle) -> Result<()>;

    async fn remove_image(&self, image: &ImageHandle) -> Result<()>;
}
