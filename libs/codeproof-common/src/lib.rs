pub mod catalog;
pub mod config;
pub mod registry;
pub mod runtime;
pub mod types;

// Re-export commonly used types for convenience
pub use config::Config;
pub use registry::{Registry, RegistryError, ResolvedRuntime};
pub use runtime::{LanguageRuntime, ReportFormat, RuntimeVersion, SyntaxCheck, TestRejection};
pub use types::{
    ErrorJudgment, ExecutionReport, ExecutionRequest, GenerationResult, JudgmentKind,
    JudgmentSource, Summary, TestOutcome, TestPair, TestVerdict,
};
