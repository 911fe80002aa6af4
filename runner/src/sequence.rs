//! `trainctl pipeline`: activate a runtime profile, run the main entry point, then
//! run the test steps, in that fixed order.

use std::fmt;
use std::path::{Path, PathBuf};

use trainctl_config::PipelineConfig;
use trainctl_types::{
    EnvSet, FailurePolicy, LaunchCommand, LogFileName, RunId, SequenceReport, Step, StepAction,
    StepOutcome, quote_arg,
};

use crate::env::capture_activated_env;
use crate::shell::{DetectedShell, detect_shell};
use crate::{Interrupt, Invoker, LaunchError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    pub run_id: RunId,
    pub steps: Vec<Step>,
    pub policy: FailurePolicy,
    pub shell: DetectedShell,
    pub log_dir: Option<PathBuf>,
}

/// Resolve `config` into the ordered step list.
pub fn plan(config: &PipelineConfig, run_id: RunId) -> Result<PipelinePlan, LaunchError> {
    let mut steps = vec![Step::activate(
        config.profile.clone(),
        config.activation_snippet(),
    )];

    let main = LaunchCommand::from_argv(&config.main)
        .ok_or_else(|| LaunchError::EmptyCommand {
            step: "main".to_string(),
        })?
        .cwd(&config.workdir);
    steps.push(Step::run("main", main));

    let test_dir = Path::new(&config.workdir).join(&config.test_dir);
    for test in &config.tests {
        let command = LaunchCommand::from_argv(&test.command)
            .ok_or_else(|| LaunchError::EmptyCommand {
                step: test.name.clone(),
            })?
            .cwd(&test_dir);
        steps.push(Step::run(test.name.clone(), command));
    }

    Ok(PipelinePlan {
        run_id,
        steps,
        policy: config.failure_policy,
        shell: detect_shell(config.shell.as_ref()),
        log_dir: config.log_dir.as_ref().map(PathBuf::from),
    })
}

impl PipelinePlan {
    #[must_use]
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// `<log_dir>/<step>_<run_id>.log`, when step logs are enabled.
    #[must_use]
    pub fn log_path(&self, step: &str) -> Option<PathBuf> {
        let dir = self.log_dir.as_ref()?;
        Some(LogFileName::new(&format!("{step}_"), self.run_id, ".log").in_dir(dir))
    }

    /// Run every step in order.
    ///
    /// Under [`FailurePolicy::Continue`] a failing step does not stop the sequence.
    /// Under [`FailurePolicy::Halt`] later steps are recorded as skipped. After an
    /// interrupt no new step starts under either policy.
    pub async fn run(&self, invoker: &Invoker, interrupt: &Interrupt) -> SequenceReport {
        let mut report = SequenceReport::default();
        let mut activated: Option<EnvSet> = None;
        let mut halted = false;

        for step in &self.steps {
            if interrupt.is_set() {
                report.push(&step.name, StepOutcome::Interrupted);
                continue;
            }
            if halted {
                report.push(&step.name, StepOutcome::Skipped);
                continue;
            }

            tracing::info!(step = %step.name, "Starting step");
            let outcome = match &step.action {
                StepAction::Activate { profile, snippet } => {
                    let (outcome, env) = self.activate(profile, snippet).await;
                    activated = env;
                    outcome
                }
                StepAction::Run(command) => {
                    self.run_command(&step.name, command, activated.as_ref(), invoker)
                        .await
                }
            };
            tracing::info!(step = %step.name, outcome = %outcome, "Step finished");

            if outcome.is_failure() && self.policy == FailurePolicy::Halt {
                tracing::warn!(step = %step.name, "Halting pipeline after failed step");
                halted = true;
            }
            report.push(&step.name, outcome);
        }

        report
    }

    async fn activate(&self, profile: &str, snippet: &str) -> (StepOutcome, Option<EnvSet>) {
        match capture_activated_env(&self.shell, snippet, None).await {
            Ok(activation) => {
                if activation.env.is_none() {
                    tracing::warn!(
                        profile,
                        code = activation.code,
                        "Activation failed; later steps inherit the current environment"
                    );
                }
                (StepOutcome::from_code(activation.code), activation.env)
            }
            Err(e) => {
                tracing::error!(profile, "Activation could not start: {e}");
                (StepOutcome::Failed { code: e.exit_code() }, None)
            }
        }
    }

    async fn run_command(
        &self,
        name: &str,
        command: &LaunchCommand,
        activated: Option<&EnvSet>,
        invoker: &Invoker,
    ) -> StepOutcome {
        let command = match activated {
            Some(env) => {
                let mut command = command.clone();
                command.env = env.merged(&command.env);
                command.clear_env = true;
                command
            }
            None => command.clone(),
        };
        let log_path = self.log_path(name);
        match invoker.run(&command, log_path.as_deref()).await {
            Ok(invocation) => StepOutcome::from_code(invocation.code),
            Err(e) => {
                tracing::error!(step = name, "Step could not run: {e}");
                StepOutcome::Failed { code: e.exit_code() }
            }
        }
    }
}

impl fmt::Display for PipelinePlan {
    /// Step listing used by `--dry-run`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "# run {} (on failure: {})",
            self.run_id,
            self.policy.as_str()
        )?;
        for (index, step) in self.steps.iter().enumerate() {
            match &step.action {
                StepAction::Activate { profile, snippet } => {
                    writeln!(
                        f,
                        "{}. {} [{profile}] via {}: {snippet}",
                        index + 1,
                        step.name,
                        self.shell
                    )?;
                }
                StepAction::Run(command) => {
                    let cwd = command
                        .cwd
                        .as_ref()
                        .map(|cwd| quote_arg(&cwd.display().to_string()))
                        .unwrap_or_else(|| ".".to_string());
                    write!(f, "{}. {} (cd {cwd}): {command}", index + 1, step.name)?;
                    if let Some(log) = self.log_path(&step.name) {
                        write!(f, " | tee -a {}", quote_arg(&log.display().to_string()))?;
                    }
                    writeln!(f)?;
                }
            }
        }
        Ok(())
    }
}
