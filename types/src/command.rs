use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::EnvSet;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("nproc_per_node must be at least 1")]
    ZeroProcesses,
    #[error("nnodes must be at least 1")]
    ZeroNodes,
}

/// Process/node layout forwarded to the distributed launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    nproc_per_node: u32,
    nnodes: u32,
}

impl Topology {
    pub fn new(nproc_per_node: u32, nnodes: u32) -> Result<Self, TopologyError> {
        if nproc_per_node == 0 {
            return Err(TopologyError::ZeroProcesses);
        }
        if nnodes == 0 {
            return Err(TopologyError::ZeroNodes);
        }
        Ok(Self {
            nproc_per_node,
            nnodes,
        })
    }

    #[must_use]
    pub fn nproc_per_node(self) -> u32 {
        self.nproc_per_node
    }

    #[must_use]
    pub fn nnodes(self) -> u32 {
        self.nnodes
    }

    /// Launcher flags in the `--key=value` form torch-style launchers expect.
    #[must_use]
    pub fn to_args(self) -> [String; 2] {
        [
            format!("--nproc_per_node={}", self.nproc_per_node),
            format!("--nnodes={}", self.nnodes),
        ]
    }
}

/// A fully resolved external command: what to run, where, and with which variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Variables added on top of the inherited environment.
    pub env: EnvSet,
    /// When set, the child starts from an empty environment plus `env`.
    pub clear_env: bool,
    pub cwd: Option<PathBuf>,
}

impl LaunchCommand {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: EnvSet::new(),
            clear_env: false,
            cwd: None,
        }
    }

    /// Build from an argv vector; `None` if it is empty.
    #[must_use]
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, env: EnvSet) -> Self {
        self.env = env;
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_command_line(&self.argv()))
    }
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | ',' | '+' | '@' | '%')
}

/// Quote one argument for display in a POSIX shell.
#[must_use]
pub fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && arg.chars().all(is_shell_safe) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Render an argv as a copy-pasteable command line.
#[must_use]
pub fn render_command_line(argv: &[&str]) -> String {
    argv.iter()
        .map(|arg| quote_arg(arg))
        .collect::<Vec<_>>()
        .join(" ")
}
