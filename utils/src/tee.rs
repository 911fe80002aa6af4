//! Duplicate a child's output to the terminal and a log file.
//!
//! The sink only moves bytes. It never sees the child's exit status, so a caller
//! that tees output still reports the status of the workload rather than of the tee.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt, Stderr, Stdout};

use crate::LogFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Whether output is mirrored to the controlling terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Echo {
    #[default]
    Terminal,
    Silent,
}

pub struct TeeSink {
    stdout: Option<Stdout>,
    stderr: Option<Stderr>,
    log: Option<LogFile>,
}

impl TeeSink {
    #[must_use]
    pub fn new(echo: Echo, log: Option<LogFile>) -> Self {
        let (stdout, stderr) = match echo {
            Echo::Terminal => (Some(tokio::io::stdout()), Some(tokio::io::stderr())),
            Echo::Silent => (None, None),
        };
        Self {
            stdout,
            stderr,
            log,
        }
    }

    /// Write one chunk. Stream identity is kept on the terminal; the log gets both
    /// streams interleaved in arrival order.
    ///
    /// A failing log write disables the log for the rest of the run; the terminal
    /// copy keeps going.
    pub async fn write(&mut self, stream: OutputStream, chunk: &[u8]) {
        let terminal = match stream {
            OutputStream::Stdout => match self.stdout.as_mut() {
                Some(out) => echo(out, chunk).await,
                None => Ok(()),
            },
            OutputStream::Stderr => match self.stderr.as_mut() {
                Some(err) => echo(err, chunk).await,
                None => Ok(()),
            },
        };
        if let Err(e) = terminal {
            tracing::debug!("terminal write failed: {e}");
        }

        if let Some(log) = self.log.as_mut()
            && let Err(e) = log.append(chunk).await
        {
            tracing::warn!(
                path = %log.path().display(),
                "Failed to write run log, continuing without it: {e}"
            );
            self.log = None;
        }
    }

    pub async fn finish(&mut self) {
        if let Some(log) = self.log.as_mut()
            && let Err(e) = log.flush().await
        {
            tracing::warn!(path = %log.path().display(), "Failed to flush run log: {e}");
        }
    }

    #[must_use]
    pub fn has_log(&self) -> bool {
        self.log.is_some()
    }
}

async fn echo<W: AsyncWrite + Unpin>(writer: &mut W, chunk: &[u8]) -> io::Result<()> {
    writer.write_all(chunk).await?;
    writer.flush().await
}
