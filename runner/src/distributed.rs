//! `trainctl train`: one distributed training launch, teed to a per-run log.

use std::fmt;
use std::path::{Path, PathBuf};

use trainctl_config::DistributedConfig;
use trainctl_types::{LaunchCommand, RunId, quote_arg};

use crate::{Invocation, Invoker, LaunchError};

/// Everything the launch will do, resolved before spawning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedPlan {
    pub run_id: RunId,
    pub command: LaunchCommand,
    pub log_path: PathBuf,
}

/// Resolve `config` into a launch for `run_id`.
///
/// argv: `<launcher...> --nproc_per_node=N --nnodes=M <entry> --domain <domain> --conf <conf>`
pub fn plan(config: &DistributedConfig, run_id: RunId) -> Result<DistributedPlan, LaunchError> {
    let topology = config.topology()?;
    let launcher = LaunchCommand::from_argv(&config.launcher).ok_or_else(|| {
        LaunchError::EmptyCommand {
            step: "train".to_string(),
        }
    })?;

    let mut command = launcher
        .args(topology.to_args())
        .arg(&config.entry)
        .args(["--domain", config.domain.as_str(), "--conf", config.conf.as_str()])
        .env(config.env.clone());
    if let Some(workdir) = &config.workdir {
        command = command.cwd(workdir);
    }

    let log_path = config.log_file_name(run_id).in_dir(Path::new(&config.log_dir));

    Ok(DistributedPlan {
        run_id,
        command,
        log_path,
    })
}

impl DistributedPlan {
    pub async fn launch(&self, invoker: &Invoker) -> Result<Invocation, LaunchError> {
        tracing::info!(
            run_id = %self.run_id,
            log = %self.log_path.display(),
            "Launching distributed training"
        );
        invoker.run(&self.command, Some(&self.log_path)).await
    }
}

impl fmt::Display for DistributedPlan {
    /// Shell-equivalent rendering used by `--dry-run`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# run {}", self.run_id)?;
        for (name, value) in self.command.env.iter() {
            writeln!(f, "export {name}={}", quote_arg(value))?;
        }
        if let Some(cwd) = &self.command.cwd {
            writeln!(f, "cd {}", quote_arg(&cwd.display().to_string()))?;
        }
        writeln!(
            f,
            "{} 2>&1 | tee -a {}",
            self.command,
            quote_arg(&self.log_path.display().to_string())
        )
    }
}
