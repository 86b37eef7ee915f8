//! Builder for container tool invocations.
//!
//! Every podman call goes through [`ContainerCommand`] so that logging and failure
//! mapping behave the same for image builds, image inspection and recipe runs.
//! Output is echoed line by line under the `container` log target as the tool
//! produces it, and captured for error reports.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::core::BuildError;

/// A single invocation of the container tool.
///
/// # Examples
///
/// ```rust,no_run
/// use qbuild::container::ContainerCommand;
///
/// # async fn example() -> anyhow::Result<()> {
/// let id = ContainerCommand::new("podman")
///     .args(["image", "inspect", "--format", "{{.Id}}", "localhost/tools"])
///     .with_context("inspect localhost/tools")
///     .execute_stdout()
///     .await?;
/// println!("{id}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ContainerCommand {
    program: PathBuf,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env_vars: Vec<(String, String)>,
    /// Short description used in logs and error messages
    context: Option<String>,
}

impl ContainerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env_vars: Vec::new(),
            context: None,
        }
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable of the tool process itself.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn operation(&self) -> String {
        self.context
            .clone()
            .or_else(|| self.args.first().cloned())
            .unwrap_or_else(|| "command".to_string())
    }

    /// Run to completion.
    ///
    /// # Errors
    ///
    /// [`BuildError::ContainerToolFailed`] with the combined output when the tool
    /// exits unsuccessfully, or an I/O error when it cannot be spawned.
    pub async fn execute(self) -> Result<ContainerCommandOutput> {
        let start = std::time::Instant::now();
        let program = self.program.display().to_string();
        let operation = self.operation();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env_vars {
            tracing::trace!(target: "container", "Setting env var: {}={}", key, value);
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!(
            target: "container",
            "({}) Executing command: {} {}",
            operation,
            program,
            self.args.join(" ")
        );

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to execute {program} {}", self.args.join(" ")))?;
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let (stdout, stderr, status) = tokio::try_join!(
            forward_lines(stdout_pipe, &operation),
            forward_lines(stderr_pipe, &operation),
            async {
                child
                    .wait()
                    .await
                    .with_context(|| format!("Failed to wait for {program}"))
            },
        )?;

        if !status.success() {
            tracing::debug!(
                target: "container",
                "Command failed with exit code: {:?}",
                status.code()
            );
            return Err(BuildError::ContainerToolFailed {
                operation,
                status: status.to_string(),
                output: combine(&stdout, &stderr),
            }
            .into());
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(
                target: "container",
                "({}) took {:.2}s",
                operation,
                elapsed.as_secs_f64()
            );
        }

        Ok(ContainerCommandOutput {
            stdout,
            stderr,
        })
    }

    /// Run and return trimmed stdout.
    pub async fn execute_stdout(self) -> Result<String> {
        let output = self.execute().await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Run and report whether the tool exited successfully, without treating
    /// failure as an error. Spawn failures are still errors.
    pub async fn succeeds(self) -> Result<bool> {
        match self.execute().await {
            Ok(_) => Ok(true),
            Err(err) if matches!(
                err.downcast_ref::<BuildError>(),
                Some(BuildError::ContainerToolFailed { .. })
            ) =>
            {
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default)]
pub struct ContainerCommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ContainerCommandOutput {
    /// Stdout followed by stderr.
    #[must_use]
    pub fn combined(&self) -> String {
        combine(&self.stdout, &self.stderr)
    }
}

fn combine(stdout: &str, stderr: &str) -> String {
    match (stdout.is_empty(), stderr.is_empty()) {
        (_, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) => format!("{}\n{stderr}", stdout.trim_end_matches('\n')),
    }
}

// Log each line of a child pipe as it arrives and return everything read.
async fn forward_lines<R>(pipe: Option<R>, operation: &str) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return Ok(String::new());
    };

    let mut reader = BufReader::new(pipe);
    let mut captured = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .context("Failed to read container tool output")?;
        if read == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        tracing::debug!(target: "container", "({}) {}", operation, line);
        captured.push_str(line);
        captured.push('\n');
    }
    Ok(captured)
}
