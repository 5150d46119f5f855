/// Sandbox Image Builder - Build Context Staging
///
/// **Responsibility:**
/// Materialize a minimal build context for one execution request:
/// the source artifact (implementation, then tests) and the runtime's
/// rendered manifests, in a uniquely-named staging directory.
///
/// **Never executes anything.** Pure filesystem staging.
///
/// **Lifetime:**
/// The staging directory is owned by the returned `ExecutionContext` and
/// deleted when the context is dropped, on every exit path.

use crate::error::{Result, SandboxError};
use codeproof_common::{ExecutionRequest, ResolvedRuntime};
use handlebars::Handlebars;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use uuid::Uuid;

/// Ephemeral staged build+run artifact for exactly one attempt
#[derive(Debug)]
pub struct ExecutionContext {
    token: String,
    dir: TempDir,
    artifact: String,
    image_tag: String,
    unit_name: String,
    run_command: Vec<String>,
    report_path: String,
    offline: bool,
}

impl ExecutionContext {
    /// Globally unique token shared by the image tag and unit name
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.dir.path().join(&self.artifact)
    }

    pub fn image_tag(&self) -> &str {
        &self.image_tag
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    pub fn run_command(&self) -> &[String] {
        &self.run_command
    }

    pub fn report_path(&self) -> &str {
        &self.report_path
    }

    pub fn offline(&self) -> bool {
        self.offline
    }
}

pub struct ImageBuilder {
    templates: Handlebars<'static>,
    staging_root: Option<PathBuf>,
}

impl ImageBuilder {
    pub fn new(staging_root: Option<PathBuf>) -> Self {
        let mut templates = Handlebars::new();
        templates.set_strict_mode(true);
        // Source code and manifests are not HTML
        templates.register_escape_fn(handlebars::no_escape);

        Self {
            templates,
            staging_root,
        }
    }

    /// Stage `request` for `runtime` into a fresh context
    pub fn prepare(
        &self,
        request: &ExecutionRequest,
        runtime: &ResolvedRuntime,
    ) -> Result<ExecutionContext> {
        let adapter = &runtime.runtime;
        let token = Uuid::new_v4().simple().to_string();

        let mut vars = json!({
            "token": token,
            "version": runtime.version.version,
            "base_image": runtime.version.base_image,
            "report_path": adapter.report_path,
        });

        let artifact = self.render("artifact name", &adapter.artifact_template, &vars)?;
        vars["artifact"] = Value::String(artifact.clone());

        let dir = self.staging_dir(&token)?;

        let mut source_vars = vars.clone();
        source_vars["implementation"] = Value::String(request.implementation.clone());
        source_vars["tests"] = Value::String(request.tests.clone());
        let source = self.render("source artifact", &adapter.source_template, &source_vars)?;
        fs::write(dir.path().join(&artifact), source)?;

        for manifest in &adapter.manifests {
            let rendered = self.render(&manifest.filename, &manifest.template, &vars)?;
            fs::write(dir.path().join(&manifest.filename), rendered)?;
        }

        let run_command = adapter
            .run_command
            .iter()
            .map(|arg| self.render("run command", arg, &vars))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            context_id = %token,
            language = %adapter.id,
            version = %runtime.version.version,
            artifact = %artifact,
            staging = %dir.path().display(),
            "Staged build context"
        );

        Ok(ExecutionContext {
            image_tag: format!("codeproof-{}:{}", adapter.id.to_lowercase(), token),
            unit_name: format!("codeproof-{}", token),
            token,
            dir,
            artifact,
            run_command,
            report_path: adapter.report_path.clone(),
            offline: adapter.offline,
        })
    }

    fn staging_dir(&self, token: &str) -> Result<TempDir> {
        let prefix = format!("codeproof-{}-", token);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match &self.staging_root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    fn render(&self, name: &str, template: &str, vars: &Value) -> Result<String> {
        self.templates
            .render_template(template, vars)
            .map_err(|e| SandboxError::Template {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeproof_common::Registry;

    const IMPL: &str = "def add(a, b):\n    return a + b";
    const TESTS: &str = "def test_add():\n    assert add(1, 2) == 3";

    fn python() -> ResolvedRuntime {
        Registry::builtin().resolve("python", "3.11").unwrap()
    }

    #[test]
    fn test_python_context_layout() {
        let builder = ImageBuilder::default();
        let request = ExecutionRequest::new(IMPL, TESTS, "python", "3.11");
        let ctx = builder.prepare(&request, &python()).unwrap();

        assert!(ctx.artifact().starts_with("code_"));
        assert!(ctx.artifact().ends_with(".py"));
        assert!(ctx.artifact_path().exists());
        assert!(ctx.path().join("Dockerfile").exists());

        let dockerfile = fs::read_to_string(ctx.path().join("Dockerfile")).unwrap();
        assert!(dockerfile.starts_with("FROM python:3.11"));
        assert!(dockerfile.contains(&format!("COPY {} /app/{}", ctx.artifact(), ctx.artifact())));

        assert_eq!(ctx.run_command()[0], "pytest");
        assert_eq!(ctx.run_command()[1], format!("/app/{}", ctx.artifact()));
        assert!(ctx
            .run_command()
            .contains(&"--json-report-file=/app/test_results.json".to_string()));
        assert!(ctx.offline());
    }

    #[test]
    fn test_implementation_precedes_tests_exactly_once() {
        let builder = ImageBuilder::default();
        let request = ExecutionRequest::new(IMPL, TESTS, "python", "3.11");
        let ctx = builder.prepare(&request, &python()).unwrap();

        let source = fs::read_to_string(ctx.artifact_path()).unwrap();
        let impl_at = source.find(IMPL).unwrap();
        let tests_at = source.find(TESTS).unwrap();
        assert!(impl_at < tests_at);
        assert_eq!(source.matches(TESTS).count(), 1);
        assert_eq!(source.matches(IMPL).count(), 1);
    }

    #[test]
    fn test_source_is_not_html_escaped() {
        let builder = ImageBuilder::default();
        let request = ExecutionRequest::new(
            "def cmp(a, b):\n    return a < b and b > 0 and '&' != \"x\"",
            "def test_cmp():\n    assert cmp(1, 2)",
            "python",
            "3.11",
        );
        let ctx = builder.prepare(&request, &python()).unwrap();

        let source = fs::read_to_string(ctx.artifact_path()).unwrap();
        assert!(source.contains("a < b and b > 0 and '&' != \"x\""));
    }

    #[test]
    fn test_java_context_renders_pom_and_class() {
        let runtime = Registry::builtin().resolve("java", "17").unwrap();
        let builder = ImageBuilder::default();
        let request = ExecutionRequest::new(
            "int add(int a, int b) { return a + b; }",
            "@Test\nvoid testAdd() { assertEquals(3, add(1, 2)); }",
            "java",
            "17",
        );
        let ctx = builder.prepare(&request, &runtime).unwrap();

        assert_eq!(ctx.artifact(), "TestClass.java");
        let pom = fs::read_to_string(ctx.path().join("pom.xml")).unwrap();
        assert!(pom.contains("<maven.compiler.source>17</maven.compiler.source>"));
        assert!(pom.contains(&format!("sandbox-{}", ctx.token())));

        let dockerfile = fs::read_to_string(ctx.path().join("Dockerfile")).unwrap();
        assert!(dockerfile.starts_with("FROM maven:3.8.1-openjdk-17-slim"));

        let class = fs::read_to_string(ctx.artifact_path()).unwrap();
        assert!(class.contains("public class TestClass {"));
        assert!(class.find("int add").unwrap() < class.find("@Test").unwrap());
        assert!(!ctx.offline());
    }

    #[test]
    fn test_contexts_never_collide() {
        let builder = ImageBuilder::default();
        let request = ExecutionRequest::new(IMPL, TESTS, "python", "3.11");
        let a = builder.prepare(&request, &python()).unwrap();
        let b = builder.prepare(&request, &python()).unwrap();

        assert_ne!(a.token(), b.token());
        assert_ne!(a.image_tag(), b.image_tag());
        assert_ne!(a.unit_name(), b.unit_name());
        assert_ne!(a.path(), b.path());
        assert!(a.image_tag().starts_with("codeproof-python:"));
    }

    #[test]
    fn test_staging_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let builder = ImageBuilder::new(Some(root.path().to_path_buf()));
        let request = ExecutionRequest::new(IMPL, TESTS, "python", "3.11");

        let ctx = builder.prepare(&request, &python()).unwrap();
        let staged = ctx.path().to_path_buf();
        assert!(staged.starts_with(root.path()));
        assert!(staged.exists());

        drop(ctx);
        assert!(!staged.exists());
    }

    #[test]
    fn test_unwritable_root_is_staging_error() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("not-a-dir");
        fs::write(&blocker, "file").unwrap();

        let builder = ImageBuilder::new(Some(blocker));
        let request = ExecutionRequest::new(IMPL, TESTS, "python", "3.11");
        let err = builder.prepare(&request, &python()).unwrap_err();
        assert!(matches!(err, SandboxError::Staging(_)));
    }
}
