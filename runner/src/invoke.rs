//! Run one external command with its output teed to the terminal and a log file.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use trainctl_types::LaunchCommand;
use trainctl_utils::{Echo, LogFile, OutputStream, TeeSink};

use crate::LaunchError;
use crate::env::build_command;
use crate::process::{ChildGuard, exit_code};

const READ_CHUNK: usize = 8192;

/// Outcome of a completed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Exit code of the child itself (`128 + n` when killed by signal `n`).
    pub code: i32,
    pub log_path: Option<PathBuf>,
}

impl Invocation {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Invoker {
    echo: Echo,
}

impl Invoker {
    #[must_use]
    pub fn new(echo: Echo) -> Self {
        Self { echo }
    }

    /// Spawn `launch`, tee its stdout and stderr, and wait for it.
    ///
    /// The returned code comes from the child's wait status, so a failing workload
    /// is reported as failing no matter what happens to the copies of its output.
    /// A log file that cannot be opened fails the invocation before anything is
    /// spawned.
    pub async fn run(
        &self,
        launch: &LaunchCommand,
        log_path: Option<&Path>,
    ) -> Result<Invocation, LaunchError> {
        let log = match log_path {
            Some(path) => Some(LogFile::open_append(path).map_err(|source| {
                LaunchError::LogFile {
                    path: path.to_path_buf(),
                    source,
                }
            })?),
            None => None,
        };

        let mut command = build_command(launch);
        command
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::info!(
            command = %launch,
            cwd = ?launch.cwd,
            log = ?log_path,
            "Starting subprocess"
        );
        let child = command.spawn().map_err(|source| LaunchError::Spawn {
            program: launch.program.clone(),
            source,
        })?;
        let mut guard = ChildGuard::new(child);

        let stdout = guard
            .child_mut()
            .stdout
            .take()
            .ok_or_else(|| LaunchError::Pipe {
                program: launch.program.clone(),
                stream: "stdout",
            })?;
        let stderr = guard
            .child_mut()
            .stderr
            .take()
            .ok_or_else(|| LaunchError::Pipe {
                program: launch.program.clone(),
                stream: "stderr",
            })?;

        let sink = Arc::new(Mutex::new(TeeSink::new(self.echo, log)));
        let stdout_task = tokio::spawn(pump(stdout, OutputStream::Stdout, Arc::clone(&sink)));
        let stderr_task = tokio::spawn(pump(stderr, OutputStream::Stderr, Arc::clone(&sink)));

        let status = guard
            .child_mut()
            .wait()
            .await
            .map_err(|source| LaunchError::Wait {
                program: launch.program.clone(),
                source,
            })?;
        guard.disarm();

        for (stream, task) in [("stdout", stdout_task), ("stderr", stderr_task)] {
            if let Err(e) = task.await {
                tracing::warn!(
                    program = %launch.program,
                    stream,
                    "Output pump ended abnormally; the log may be incomplete: {e}"
                );
            }
        }
        sink.lock().await.finish().await;

        let code = exit_code(status);
        if code == 0 {
            tracing::info!(program = %launch.program, "Subprocess finished");
        } else {
            tracing::warn!(program = %launch.program, code, "Subprocess failed");
        }

        Ok(Invocation {
            code,
            log_path: log_path.map(Path::to_path_buf),
        })
    }
}

async fn pump<R: AsyncRead + Unpin>(
    mut reader: R,
    stream: OutputStream,
    sink: Arc<Mutex<TeeSink>>,
) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(?stream, "read from child failed: {e}");
                break;
            }
        };
        sink.lock().await.write(stream, &buf[..n]).await;
    }
}
