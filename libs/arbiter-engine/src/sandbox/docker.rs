/// Docker-based sandbox runtime
///
/// **Docker Execution Rules:**
/// 1. Pulls the language image if not present
/// 2. Creates one container per stage with:
///    - Network disabled
///    - Memory ceiling (swap included), CPU quota, pids limit
///    - CPU-time ulimit, wall-clock enforced by `timeout -s KILL` in the container
///    - Read-only root filesystem, tmpfs /tmp, no capabilities
/// 3. Bind-mounts only the job's source, build and input paths
/// 4. Captures stdout/stderr separately
/// 5. Reads the exit code and the OOM-killed flag
/// 6. Removes the container on every path via a drop guard

use super::{Invocation, RawExit, SandboxError, SandboxRuntime};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, ResourcesUlimits};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

const PIDS_LIMIT: i64 = 128;
const TMPFS_OPTIONS: &str = "rw,exec,nosuid,size=64m";

/// Container cleanup guard - guarantees container removal on drop
/// This ensures containers are cleaned up even if execution panics or is cancelled
struct ContainerGuard<'a> {
    docker: &'a Docker,
    container_id: String,
}

impl<'a> ContainerGuard<'a> {
    fn new(docker: &'a Docker, container_id: String) -> Self {
        Self { docker, container_id }
    }
}

impl<'a> Drop for ContainerGuard<'a> {
    fn drop(&mut self) {
        // Cannot await in Drop; removal runs on the runtime in the background
        let container_id = self.container_id.clone();
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };

            if let Err(e) = docker.remove_container(&container_id, Some(remove_options)).await {
                warn!(container_id = %container_id, error = %e, "Failed to remove container");
            }
        });
    }
}

/// Byte sink that keeps at most `limit` bytes and drops the rest.
struct CappedBuffer {
    bytes: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl CappedBuffer {
    fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            truncated: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn into_string(self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            text.push_str("\n[output truncated]");
        }
        text
    }
}

pub struct DockerRuntime {
    docker: Docker,
    max_output_bytes: usize,
}

impl DockerRuntime {
    /// Connects to the local Docker daemon (socket or DOCKER_HOST).
    pub fn connect(max_output_bytes: usize) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::Unavailable(e.to_string()))?;
        Ok(Self {
            docker,
            max_output_bytes,
        })
    }

    /// Fails fast when the daemon is unreachable.
    pub async fn ping(&self) -> Result<(), SandboxError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| SandboxError::Unavailable(e.to_string()))
    }

    /// Ensure Docker image is available (pull if needed)
    ///
    /// **Image Cache Health Check:**
    /// - Verifies image exists locally before execution
    /// - Pulls synchronously if missing
    /// - Logs cache hits/misses for observability
    pub async fn ensure_image(&self, image: &str) -> Result<(), SandboxError> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image = %image, "Image cache hit");
            return Ok(());
        }

        warn!(image = %image, "Image cache miss, pulling");

        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| SandboxError::Image {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
        }

        info!(image = %image, "Image pulled");
        Ok(())
    }

    fn container_config(invocation: &Invocation) -> Config<String> {
        let limits = &invocation.limits;
        let wall_secs = limits.wall_time.as_secs_f64();
        // Soft CPU rlimit raises SIGXCPU, the hard one SIGKILL one second later
        let cpu_secs = limits.wall_time.as_secs().max(1) as i64;

        let stdin = invocation.stdin.as_deref().unwrap_or("/dev/null");
        let script = format!("exec timeout -s KILL {:.3} \"$@\" < {}", wall_secs, stdin);
        let mut cmd = vec!["/bin/sh".to_string(), "-c".to_string(), script, "sh".to_string()];
        cmd.extend(invocation.command.iter().cloned());

        let binds = invocation
            .mounts
            .iter()
            .map(|m| {
                format!(
                    "{}:{}:{}",
                    m.host_path.display(),
                    m.sandbox_path,
                    if m.read_only { "ro" } else { "rw" }
                )
            })
            .collect();

        let memory = limits.memory_bytes as i64;

        Config {
            image: Some(invocation.image.clone()),
            cmd: Some(cmd),
            entrypoint: Some(vec![]),
            working_dir: Some("/tmp".to_string()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true), // SECURITY: No network access
            host_config: Some(HostConfig {
                memory: Some(memory),
                memory_swap: Some(memory),
                nano_cpus: Some((limits.cpus * 1_000_000_000.0) as i64),
                pids_limit: Some(PIDS_LIMIT),
                network_mode: Some("none".to_string()),
                readonly_rootfs: Some(true),
                tmpfs: Some(HashMap::from([("/tmp".to_string(), TMPFS_OPTIONS.to_string())])),
                binds: Some(binds),
                ulimits: Some(vec![ResourcesUlimits {
                    name: Some("cpu".to_string()),
                    soft: Some(cpu_secs),
                    hard: Some(cpu_secs + 1),
                }]),
                cap_drop: Some(vec!["ALL".to_string()]),
                security_opt: Some(vec!["no-new-privileges".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    async fn wait_exit_code(&self, container_id: &str) -> Result<i64, DockerError> {
        let wait_options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut wait_stream = self.docker.wait_container(container_id, Some(wait_options));
        match wait_stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports non-zero exits as an error carrying the code
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e),
            None => Ok(-1),
        }
    }
}

#[async_trait]
impl SandboxRuntime for DockerRuntime {
    async fn execute(&self, invocation: &Invocation) -> Result<RawExit, SandboxError> {
        let stage = invocation.stage;
        let container_err = |reason: String| SandboxError::Container { stage, reason };

        self.ensure_image(&invocation.image).await?;

        let container_name = format!("arbiter-{}-{}", stage, uuid::Uuid::new_v4().simple());
        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_options), Self::container_config(invocation))
            .await
            .map_err(|e| container_err(format!("create: {}", e)))?;

        let container_id = container.id.clone();

        // CRITICAL: guard right after creation so every later exit removes it
        let _guard = ContainerGuard::new(&self.docker, container_id.clone());

        let start_time = Instant::now();

        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| container_err(format!("start: {}", e)))?;

        let logs_options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: true,
            ..Default::default()
        });

        let mut stdout = CappedBuffer::new(self.max_output_bytes);
        let mut stderr = CappedBuffer::new(self.max_output_bytes);
        let mut logs_stream = self.docker.logs(&container_id, logs_options);

        // Follow ends when the container stops
        while let Some(output) = logs_stream.next().await {
            match output {
                Ok(LogOutput::StdOut { message }) => stdout.push(&message),
                Ok(LogOutput::StdErr { message }) => stderr.push(&message),
                Ok(_) => {}
                Err(e) => return Err(container_err(format!("logs: {}", e))),
            }
        }

        let exit_code = self
            .wait_exit_code(&container_id)
            .await
            .map_err(|e| container_err(format!("wait: {}", e)))?;

        let inspect = self
            .docker
            .inspect_container(&container_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| container_err(format!("inspect: {}", e)))?;
        let oom_killed = inspect
            .state
            .as_ref()
            .and_then(|s| s.oom_killed)
            .unwrap_or(false);

        debug!(
            container = %container_name,
            stage = %stage,
            exit_code,
            oom_killed,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Container finished"
        );

        Ok(RawExit {
            exit_code,
            oom_killed,
            stdout: stdout.into_string(),
            stderr: stderr.into_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{Mount, ResourceLimits, Stage};
    use std::time::Duration;

    fn invocation() -> Invocation {
        Invocation {
            stage: Stage::Run,
            image: "python:3.12-slim".to_string(),
            command: vec!["python3".to_string(), "-u".to_string(), "/sandbox/src/a.py".to_string()],
            mounts: vec![
                Mount::read_only("/scratch/sources/abc", "/sandbox/src"),
                Mount::read_only("/scratch/inputs/abc_0.txt", "/sandbox/input.txt"),
            ],
            stdin: Some("/sandbox/input.txt".to_string()),
            limits: ResourceLimits {
                wall_time: Duration::from_millis(2500),
                memory_bytes: 256 * 1024 * 1024,
                cpus: 1.0,
            },
        }
    }

    #[test]
    fn test_container_config_limits() {
        let config = DockerRuntime::container_config(&invocation());
        let host = config.host_config.unwrap();
        assert_eq!(host.memory, Some(256 * 1024 * 1024));
        assert_eq!(host.memory_swap, host.memory);
        assert_eq!(host.nano_cpus, Some(1_000_000_000));
        assert_eq!(host.network_mode.as_deref(), Some("none"));
        assert_eq!(host.readonly_rootfs, Some(true));
        let ulimit = &host.ulimits.unwrap()[0];
        assert_eq!(ulimit.soft, Some(2));
        assert_eq!(ulimit.hard, Some(3));
        assert_eq!(
            host.binds.unwrap(),
            vec![
                "/scratch/sources/abc:/sandbox/src:ro".to_string(),
                "/scratch/inputs/abc_0.txt:/sandbox/input.txt:ro".to_string(),
            ]
        );
        assert_eq!(config.network_disabled, Some(true));
    }

    #[test]
    fn test_command_is_wrapped_with_wall_clock_timeout() {
        let config = DockerRuntime::container_config(&invocation());
        let cmd = config.cmd.unwrap();
        assert_eq!(cmd[0], "/bin/sh");
        assert_eq!(cmd[2], "exec timeout -s KILL 2.500 \"$@\" < /sandbox/input.txt");
        assert_eq!(&cmd[4..], &["python3", "-u", "/sandbox/src/a.py"]);
    }

    #[test]
    fn test_no_stdin_reads_dev_null() {
        let mut inv = invocation();
        inv.stdin = None;
        let cmd = DockerRuntime::container_config(&inv).cmd.unwrap();
        assert!(cmd[2].ends_with("< /dev/null"));
    }

    #[test]
    fn test_capped_buffer() {
        let mut buf = CappedBuffer::new(4);
        buf.push(b"ab");
        buf.push(b"cdef");
        assert_eq!(buf.into_string(), "abcd\n[output truncated]");

        let mut buf = CappedBuffer::new(16);
        buf.push(b"hello\n");
        assert_eq!(buf.into_string(), "hello\n");
    }
}
