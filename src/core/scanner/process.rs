// src/core/scanner/process.rs

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::core::config::RuntimeConfig;
use crate::core::error::{AdapterError, ReportParseError};

/// Captured result of one external process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Classifies the exit code against the tool's own success set. On failure
    /// the message is the captured stderr, or a description of the exit code.
    pub fn into_success(self, tool: &str, success_codes: &[i32]) -> Result<Self, AdapterError> {
        match self.exit_code {
            Some(code) if success_codes.contains(&code) => Ok(self),
            exit_code => {
                let stderr = self.stderr.trim();
                let message = if !stderr.is_empty() {
                    stderr.to_string()
                } else if let Some(code) = exit_code {
                    format!("{tool} exited with code {code}")
                } else {
                    format!("{tool} was terminated by a signal")
                };
                Err(AdapterError::ProcessFailed { tool: tool.to_string(), exit_code, message })
            }
        }
    }
}

/// Launches tool containers through the configured runtime CLI.
///
/// Every launch takes a permit from a shared semaphore, which bounds the number
/// of containers alive at once across all scans using this runtime. The
/// per-tool timeout starts once the permit is held, so queueing does not eat
/// into a tool's budget.
///
/// Each container gets a unique `--name`. When a run times out, or its future
/// is dropped, the container is removed with `<program> rm -f <name>`; killing
/// the runtime client alone leaves a daemon-owned container running. The
/// permit is held until that removal has finished.
#[derive(Debug)]
pub struct ContainerRuntime {
    program: String,
    args: Vec<String>,
    limiter: Arc<Semaphore>,
    timeout: Duration,
}

impl ContainerRuntime {
    pub fn new(config: &RuntimeConfig, max_processes: usize, timeout: Duration) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            limiter: Arc::new(Semaphore::new(max_processes.max(1))),
            timeout,
        }
    }

    /// Runs `<program> <args..> run --name <name> <container_args..>` and
    /// captures its output.
    pub async fn run_container(
        &self,
        tool: &str,
        scan_id: &str,
        container_args: &[String],
    ) -> Result<ProcessOutput, AdapterError> {
        let permit = self.limiter.clone().acquire_owned().await.map_err(|e| AdapterError::Launch {
            tool: tool.to_string(),
            source: std::io::Error::other(e),
        })?;

        let name = container_name(tool, scan_id);
        debug!(tool, scan_id, container = %name, program = %self.program, args = ?container_args, "Launching tool container.");
        let child = Command::new(&self.program)
            .args(&self.args)
            .args(["run", "--name", name.as_str()])
            .args(container_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                warn!(tool, program = %self.program, error = %source, "Failed to launch tool container.");
                AdapterError::Launch { tool: tool.to_string(), source }
            })?;

        let guard = ContainerGuard {
            program: self.program.clone(),
            args: self.args.clone(),
            name,
            permit: Some(permit),
            armed: true,
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                guard.disarm();
                output
            }
            Ok(Err(source)) => {
                guard.remove().await;
                return Err(AdapterError::Launch { tool: tool.to_string(), source });
            }
            Err(_) => {
                warn!(tool, scan_id, container = %guard.name, after = ?self.timeout, "Tool container timed out.");
                guard.remove().await;
                return Err(AdapterError::Timeout { tool: tool.to_string(), after: self.timeout });
            }
        };

        let output = ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        info!(tool, scan_id, exit_code = ?output.exit_code, stdout_bytes = output.stdout.len(), "Tool container exited.");
        Ok(output)
    }
}

/// Removes a container that did not exit on its own, then releases its permit.
#[derive(Debug)]
struct ContainerGuard {
    program: String,
    args: Vec<String>,
    name: String,
    permit: Option<OwnedSemaphorePermit>,
    armed: bool,
}

impl ContainerGuard {
    fn disarm(mut self) {
        self.armed = false;
    }

    async fn remove(mut self) {
        self.armed = false;
        remove_container(&self.program, &self.args, &self.name).await;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let (program, args, name) = (self.program.clone(), self.args.clone(), self.name.clone());
        let permit = self.permit.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    remove_container(&program, &args, &name).await;
                    drop(permit);
                });
            }
            Err(_) => {
                let status = std::process::Command::new(&program)
                    .args(&args)
                    .args(["rm", "-f", name.as_str()])
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status();
                if let Err(e) = status {
                    error!(container = %name, error = %e, "Failed to remove tool container.");
                }
            }
        }
    }
}

async fn remove_container(program: &str, args: &[String], name: &str) {
    let status = Command::new(program)
        .args(args)
        .args(["rm", "-f", name])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) if status.success() => info!(container = %name, "Tool container removed."),
        Ok(status) => warn!(container = %name, exit_code = ?status.code(), "Container removal reported failure."),
        Err(e) => error!(container = %name, error = %e, "Failed to remove tool container."),
    }
}

static CONTAINER_SEQ: AtomicU64 = AtomicU64::new(0);

/// `<tool>-<scan id>-<pid><seq><nanos>`, valid as a container name.
fn container_name(tool: &str, scan_id: &str) -> String {
    let seq = CONTAINER_SEQ.fetch_add(1, Ordering::Relaxed);
    let nanos = Utc::now().timestamp_subsec_nanos();
    format!("{tool}-{}-{:x}{seq:x}{nanos:x}", sanitize(scan_id), std::process::id())
}

/// A private temporary directory a tool writes its report into, mounted into
/// the container. Removed when dropped, on every exit path.
#[derive(Debug)]
pub struct ReportWorkspace {
    dir: TempDir,
    file_name: String,
}

impl ReportWorkspace {
    pub fn create(tool: &str, scan_id: &str) -> Result<Self, AdapterError> {
        let workspace_error = |source| AdapterError::Workspace { tool: tool.to_string(), source };
        let dir = tempfile::Builder::new()
            .prefix(&format!("{tool}-{}-", sanitize(scan_id)))
            .tempdir()
            .map_err(workspace_error)?;

        // Tool images run as their own users; the mount must be writable by them.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o777)).map_err(workspace_error)?;
        }

        Ok(Self { dir, file_name: format!("{tool}_report.json") })
    }

    pub fn host_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.path().join(&self.file_name)
    }

    /// `<host dir>:<container dir>` for `docker run -v`.
    pub fn volume(&self, container_dir: &str) -> String {
        format!("{}:{container_dir}", self.dir.path().display())
    }

    pub async fn read_report(&self) -> Result<String, ReportParseError> {
        let path = self.report_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ReportParseError::Missing(path)),
            Err(e) => Err(ReportParseError::Unreadable(e)),
        }
    }
}

fn sanitize(scan_id: &str) -> String {
    scan_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .take(32)
        .collect()
}
