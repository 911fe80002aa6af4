//! Child environments: explicit variable sets and profile activation.
//!
//! Nothing here mutates trainctl's own environment. Variables reach a child only
//! through the `Command` that spawns it.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use trainctl_types::{EnvSet, LaunchCommand};

use crate::LaunchError;
use crate::process::exit_code;
use crate::shell::DetectedShell;

/// Apply `env` to `command`.
pub fn apply_env(command: &mut Command, env: &EnvSet) {
    for (name, value) in env.iter() {
        command.env(name, value);
    }
}

/// Build a `tokio` command from a resolved launch command.
#[must_use]
pub fn build_command(launch: &LaunchCommand) -> Command {
    let mut command = Command::new(&launch.program);
    command.args(&launch.args);
    if launch.clear_env {
        command.env_clear();
    }
    apply_env(&mut command, &launch.env);
    if let Some(cwd) = &launch.cwd {
        command.current_dir(cwd);
    }
    command
}

/// Bookkeeping the activation shell exports about itself. Later steps run in their
/// own directories, so these would be stale there.
const SHELL_LOCAL_VARS: [&str; 4] = ["PWD", "OLDPWD", "SHLVL", "_"];

/// Result of running an activation snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub code: i32,
    /// The environment after activation; `None` when activation failed.
    pub env: Option<EnvSet>,
}

/// Run `snippet` in `shell` and capture the environment it leaves behind.
///
/// The snippet's own stdout is redirected to stderr so that stdout carries only the
/// `env -0` dump. stderr stays attached to the terminal.
pub async fn capture_activated_env(
    shell: &DetectedShell,
    snippet: &str,
    cwd: Option<&Path>,
) -> Result<Activation, LaunchError> {
    let script = format!("{{ {snippet}\n}} 1>&2 && env -0");
    let program = shell.binary.display().to_string();

    let mut command = Command::new(&shell.binary);
    command
        .args(&shell.args)
        .arg(&script)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    tracing::debug!(shell = %shell, script = %script, "Running activation");
    let output = command
        .output()
        .await
        .map_err(|source| LaunchError::Spawn { program, source })?;

    let code = exit_code(output.status);
    if code != 0 {
        return Ok(Activation { code, env: None });
    }
    let mut env = EnvSet::from_nul_separated(&output.stdout);
    for name in SHELL_LOCAL_VARS {
        env.remove(name);
    }
    Ok(Activation {
        code,
        env: Some(env),
    })
}
