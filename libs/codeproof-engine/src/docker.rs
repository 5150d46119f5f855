/// Docker-based execution backend
///
/// **Docker Execution Rules:**
/// 1. Builds a throwaway image from the staged context (tar-streamed to the daemon)
/// 2. Creates one container with the runtime's test command:
///    - Network disabled for offline runtimes
///    - CPU/memory limits enforced
///    - No TTY, no stdin
/// 3. Waits for the container to stop, bounded by the execution timeout
/// 4. Copies the report file out of the stopped container's filesystem
/// 5. Removes container and image on request; missing ones are not errors

use crate::engine::{ExecutionBackend, ImageHandle, TerminalState, UnitHandle, UnitLimits};
use crate::error::{Result, SandboxError};
use crate::staging::ExecutionContext;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, KillContainerOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::{BuildImageOptions, RemoveImageOptions};
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect using DOCKER_HOST or the platform's default socket
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::InfrastructureUnavailable(e.to_string()))?;
        Ok(Self { docker })
    }

    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    /// Fails with `InfrastructureUnavailable` when the daemon is unreachable
    pub async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| SandboxError::InfrastructureUnavailable(e.to_string()))
    }
}

fn is_unreachable(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::IOError { .. }
            | DockerError::HyperResponseError { .. }
            | DockerError::SocketNotFoundError { .. }
            | DockerError::RequestTimeoutError { .. }
    )
}

fn is_not_found(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn backend_error(err: DockerError) -> SandboxError {
    if is_unreachable(&err) {
        SandboxError::InfrastructureUnavailable(err.to_string())
    } else {
        SandboxError::Backend(err.to_string())
    }
}

/// Tar the staging directory as the daemon's build context
fn context_archive(dir: &Path) -> std::io::Result<Vec<u8>> {
    let mut archive = tar::Builder::new(Vec::new());
    archive.append_dir_all(".", dir)?;
    archive.into_inner()
}

/// The archive API wraps a single copied file in a tar stream
fn extract_single_file(archive: &[u8]) -> std::io::Result<Option<Vec<u8>>> {
    let mut archive = tar::Archive::new(Cursor::new(archive));
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_file() {
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            return Ok(Some(content));
        }
    }
    Ok(None)
}

#[async_trait]
impl ExecutionBackend for DockerEngine {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn build(&self, ctx: &ExecutionContext) -> Result<ImageHandle> {
        let image = ImageHandle::for_context(ctx);
        let archive = context_archive(ctx.path())?;

        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: image.tag.clone(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let mut stream = self.docker.build_image(options, None, Some(archive.into()));
        while let Some(item) = stream.next().await {
            match item {
                Ok(info) => {
                    if let Some(error) = info.error {
                        return Err(SandboxError::BuildFailure(error.trim().to_string()));
                    }
                    if let Some(line) = info.stream {
                        let line = line.trim();
                        if !line.is_empty() {
                            debug!(context_id = %ctx.token(), "{}", line);
                        }
                    }
                }
                Err(e) if is_unreachable(&e) => {
                    return Err(SandboxError::InfrastructureUnavailable(e.to_string()));
                }
                Err(e) => return Err(SandboxError::BuildFailure(e.to_string())),
            }
        }

        Ok(image)
    }

    async fn run(
        &self,
        image: &ImageHandle,
        ctx: &ExecutionContext,
        limits: UnitLimits,
    ) -> Result<UnitHandle> {
        let unit = UnitHandle::for_context(ctx);

        let config = Config {
            image: Some(image.tag.clone()),
            cmd: Some(ctx.run_command().to_vec()),
            working_dir: Some("/app".to_string()),
            tty: Some(false),
            open_stdin: Some(false),
            attach_stdin: Some(false),
            network_disabled: Some(limits.network_disabled),
            host_config: Some(HostConfig {
                memory: Some(limits.memory_bytes),
                nano_cpus: Some(limits.nano_cpus),
                network_mode: limits.network_disabled.then(|| "none".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: unit.name.as_str(),
            platform: None,
        };

        self.docker
            .create_container(Some(create_options), config)
            .await
            .map_err(backend_error)?;

        self.docker
            .start_container(&unit.name, None::<StartContainerOptions<String>>)
            .await
            .map_err(backend_error)?;

        Ok(unit)
    }

    async fn wait(&self, unit: &UnitHandle, timeout: Duration) -> Result<TerminalState> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut stream = self.docker.wait_container(&unit.name, Some(options));

        match tokio::time::timeout(timeout, stream.next()).await {
            Err(_) => {
                if let Err(e) = self
                    .docker
                    .kill_container(&unit.name, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(unit = %unit.name, error = %e, "Failed to kill timed out container");
                }
                Err(SandboxError::ExecutionTimeout(timeout))
            }
            Ok(Some(Ok(response))) => Ok(TerminalState {
                exit_code: response.status_code,
            }),
            // Non-zero exits surface as an error item; failing tests are not a backend failure
            Ok(Some(Err(DockerError::DockerContainerWaitError { code, .. }))) => {
                Ok(TerminalState { exit_code: code })
            }
            Ok(Some(Err(e))) => Err(backend_error(e)),
            Ok(None) => Err(SandboxError::Backend(format!(
                "wait stream for {} ended without a terminal state",
                unit.name
            ))),
        }
    }

    async fn read_file(&self, unit: &UnitHandle, path: &str) -> Result<Vec<u8>> {
        let options = DownloadFromContainerOptions {
            path: path.to_string(),
        };
        let mut stream = self.docker.download_from_container(&unit.name, Some(options));

        let mut archive = Vec::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => archive.extend_from_slice(&bytes),
                Err(e) if is_not_found(&e) => {
                    return Err(SandboxError::ReportMissing {
                        path: path.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(backend_error(e)),
            }
        }

        match extract_single_file(&archive) {
            Ok(Some(content)) => Ok(content),
            Ok(None) => Err(SandboxError::ReportMissing {
                path: path.to_string(),
                reason: "archive contained no regular file".to_string(),
            }),
            Err(e) => Err(SandboxError::ReportMissing {
                path: path.to_string(),
                reason: format!("unreadable archive: {}", e),
            }),
        }
    }

    async fn remove(&self, unit: &UnitHandle) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        match self.docker.remove_container(&unit.name, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(backend_error(e)),
        }
    }

    async fn remove_image(&self, image: &ImageHandle) -> Result<()> {
        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };

        match self.docker.remove_image(&image.tag, Some(options), None).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(backend_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::ImageBuilder;
    use codeproof_common::{ExecutionRequest, Registry};

    fn tar_with(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_extract_single_file() {
        let archive = tar_with(&[("test_results.json", br#"{"summary": {}}"#)]);
        let content = extract_single_file(&archive).unwrap().unwrap();
        assert_eq!(content, br#"{"summary": {}}"#);
    }

    #[test]
    fn test_extract_from_empty_archive() {
        let archive = tar_with(&[]);
        assert!(extract_single_file(&archive).unwrap().is_none());
    }

    #[test]
    fn test_context_archive_contains_staged_files() {
        let runtime = Registry::builtin().resolve("python", "3.11").unwrap();
        let request = ExecutionRequest::new(
            "def add(a, b):\n    return a + b",
            "def test_add():\n    assert add(1, 2) == 3",
            "python",
            "3.11",
        );
        let ctx = ImageBuilder::default().prepare(&request, &runtime).unwrap();

        let archive = context_archive(ctx.path()).unwrap();
        let mut names: Vec<String> = tar::Archive::new(Cursor::new(archive))
            .entries()
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.header().entry_type().is_file())
            .map(|e| e.path().unwrap().display().to_string())
            .collect();
        names.sort();

        assert!(names.iter().any(|n| n.ends_with("Dockerfile")));
        assert!(names.iter().any(|n| n.ends_with(ctx.artifact())));
    }

    #[test]
    fn test_not_found_classification() {
        let missing = DockerError::DockerResponseServerError {
            status_code: 404,
            message: "No such container".to_string(),
        };
        assert!(is_not_found(&missing));
        assert!(matches!(backend_error(missing), SandboxError::Backend(_)));

        let conflict = DockerError::DockerResponseServerError {
            status_code: 409,
            message: "conflict".to_string(),
        };
        assert!(!is_not_found(&conflict));
    }

    #[tokio::test]
    #[ignore] // Requires a running Docker daemon
    async fn docker_removal_of_unknown_handles_is_ok() {
        let engine = DockerEngine::connect().unwrap();
        engine.ping().await.unwrap();

        let unit = UnitHandle {
            name: format!("codeproof-{}", uuid::Uuid::new_v4().simple()),
        };
        let image = ImageHandle {
            tag: format!("codeproof-python:{}", uuid::Uuid::new_v4().simple()),
        };
        engine.remove(&unit).await.unwrap();
        engine.remove_image(&image).await.unwrap();
    }
}
