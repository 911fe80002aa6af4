//! trainctl - launch distributed training jobs and train-then-test pipelines.
//!
//! ```text
//! main() -> load config -> plan -> (dry run: print) | (run: Invoker) -> exit code
//! ```
//!
//! The process exit code is the workload's: `train` returns the training launcher's
//! code, `pipeline` the code of the first failed step, or 130 when Ctrl-C stopped
//! a run in which nothing failed.

mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};

use trainctl_config::{TrainctlConfig, config_path, set_value, write_default};
use trainctl_runner::{Interrupt, Invoker, LaunchError, distributed, sequence};
use trainctl_types::{FailurePolicy, RunId, SequenceReport};
use trainctl_utils::Echo;

#[derive(Debug, Parser)]
#[command(name = "trainctl", version, about)]
struct Cli {
    /// Config file (default: ~/.trainctl/config.toml)
    #[arg(long, global = true, env = "TRAINCTL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Launch distributed training, teeing output to a per-run log file.
    Train(TrainArgs),
    /// Activate the runtime profile, run the main entry point, then the tests.
    Pipeline(PipelineArgs),
    /// Inspect or edit the config file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Args)]
struct TrainArgs {
    /// Print the environment and command line without running anything.
    #[arg(long)]
    dry_run: bool,
    /// Write output only to the log file.
    #[arg(long, short)]
    quiet: bool,
    /// Override `distributed.domain`.
    #[arg(long)]
    domain: Option<String>,
    /// Override `distributed.conf`.
    #[arg(long)]
    conf: Option<String>,
    /// Override `distributed.nproc_per_node`.
    #[arg(long)]
    nproc_per_node: Option<u32>,
    /// Override `distributed.nnodes`.
    #[arg(long)]
    nnodes: Option<u32>,
}

#[derive(Debug, Args)]
struct PipelineArgs {
    /// Print the planned steps without running anything.
    #[arg(long)]
    dry_run: bool,
    /// Mirror step output only to step logs (needs `pipeline.log_dir`).
    #[arg(long, short)]
    quiet: bool,
    /// Stop at the first failing step.
    #[arg(long, conflicts_with = "keep_going")]
    halt_on_failure: bool,
    /// Run every step even after failures.
    #[arg(long)]
    keep_going: bool,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Write the default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration.
    Show,
    /// Print the config file location.
    Path,
    /// Set one dotted key, e.g. `distributed.domain vit`.
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    logging::init_tracing();
    let cli = Cli::parse();

    let code = match cli.command {
        Command::Train(args) => run_train(cli.config, args).await?,
        Command::Pipeline(args) => run_pipeline(cli.config, args).await?,
        Command::Config { action } => {
            run_config(cli.config, action)?;
            0
        }
    };
    Ok(exit_code(code))
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn load_config(path: Option<&PathBuf>) -> Result<TrainctlConfig> {
    TrainctlConfig::load(path.map(PathBuf::as_path)).context("failed to load configuration")
}

async fn run_train(explicit: Option<PathBuf>, args: TrainArgs) -> Result<i32> {
    let mut config = load_config(explicit.as_ref())?;
    let d = &mut config.distributed;
    if let Some(domain) = args.domain {
        d.domain = domain;
    }
    if let Some(conf) = args.conf {
        d.conf = conf;
    }
    if let Some(n) = args.nproc_per_node {
        d.nproc_per_node = n;
    }
    if let Some(n) = args.nnodes {
        d.nnodes = n;
    }

    let plan = distributed::plan(&config.distributed, RunId::now())?;
    if args.dry_run {
        print!("{plan}");
        return Ok(0);
    }

    let _interrupt = Interrupt::listen();
    let echo = if args.quiet { Echo::Silent } else { Echo::Terminal };
    match plan.launch(&Invoker::new(echo)).await {
        Ok(invocation) => {
            if !invocation.success() {
                eprintln!(
                    "trainctl: training exited with code {} (log: {})",
                    invocation.code,
                    plan.log_path.display()
                );
            }
            Ok(invocation.code)
        }
        Err(e) => Ok(report_launch_error(&e)),
    }
}

async fn run_pipeline(explicit: Option<PathBuf>, args: PipelineArgs) -> Result<i32> {
    let config = load_config(explicit.as_ref())?;
    let mut plan = sequence::plan(&config.pipeline, RunId::now())?;
    if args.halt_on_failure {
        plan = plan.with_policy(FailurePolicy::Halt);
    } else if args.keep_going {
        plan = plan.with_policy(FailurePolicy::Continue);
    }

    if args.dry_run {
        print!("{plan}");
        return Ok(0);
    }

    let interrupt = Interrupt::listen();
    let echo = if args.quiet { Echo::Silent } else { Echo::Terminal };
    let report = plan.run(&Invoker::new(echo), &interrupt).await;
    print_summary(&report);
    Ok(report.exit_code())
}

fn print_summary(report: &SequenceReport) {
    eprintln!("trainctl: pipeline summary");
    for step in &report.steps {
        eprintln!("  {:<12} {}", step.name, step.outcome);
    }
}

fn report_launch_error(err: &LaunchError) -> i32 {
    tracing::error!("Launch failed: {err}");
    eprintln!("trainctl: {err}");
    err.exit_code()
}

fn run_config(explicit: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    let path = || {
        explicit
            .clone()
            .or_else(config_path)
            .ok_or_else(|| anyhow!("could not determine config path; pass --config"))
    };

    match action {
        ConfigAction::Init { force } => {
            let path = path()?;
            write_default(&path, force)
                .with_context(|| format!("failed to initialize {}", path.display()))?;
            println!("{}", path.display());
        }
        ConfigAction::Show => {
            let config = load_config(explicit.as_ref())?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            println!("{}", path()?.display());
        }
        ConfigAction::Set { key, value } => {
            let path = path()?;
            set_value(&path, &key, &value)
                .with_context(|| format!("failed to update {}", path.display()))?;
        }
    }
    Ok(())
}
