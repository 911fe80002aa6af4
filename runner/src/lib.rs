//! Launch execution for trainctl.
//!
//! Plans are built from configuration first ([`distributed::plan`],
//! [`sequence::plan`]) and only then executed, so every variable and argument a
//! child will see is inspectable without spawning anything.

pub mod distributed;
pub mod env;
pub mod interrupt;
pub mod invoke;
pub mod process;
pub mod sequence;
pub mod shell;

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use trainctl_types::{EnvError, TopologyError};

pub use distributed::DistributedPlan;
pub use interrupt::Interrupt;
pub use invoke::{Invocation, Invoker};
pub use sequence::PipelinePlan;
pub use shell::DetectedShell;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to start {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("failed to wait for {program}: {source}")]
    Wait { program: String, source: io::Error },
    #[error("failed to capture {stream} of {program}")]
    Pipe {
        program: String,
        stream: &'static str,
    },
    #[error("failed to open log file {}: {source}", path.display())]
    LogFile { path: PathBuf, source: io::Error },
    #[error("{0}")]
    Topology(#[from] TopologyError),
    #[error("{0}")]
    Env(#[from] EnvError),
    #[error("pipeline step {step:?} has an empty command")]
    EmptyCommand { step: String },
}

impl LaunchError {
    /// Exit code to report when the launch itself failed, following shell conventions.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::Spawn { source, .. } => match source.kind() {
                io::ErrorKind::NotFound => 127,
                io::ErrorKind::PermissionDenied => 126,
                _ => 1,
            },
            _ => 1,
        }
    }
}
