//! Pipeline runs end to end through real `/bin/sh` children.

use std::path::Path;
use std::time::Duration;

use trainctl_config::{PipelineConfig, ShellConfig, TestCommand};
use trainctl_runner::{Interrupt, Invoker, sequence};
use trainctl_types::{FailurePolicy, INTERRUPTED_EXIT_CODE, RunId, StepOutcome};
use trainctl_utils::Echo;

use crate::common::{Sandbox, sh};

const RECORD: &str = "record.txt";

/// Each step appends `<step>:<profile seen>` to the record file.
fn record_step(record: &Path, step: &str, exit: i32) -> Vec<String> {
    sh(&format!(
        "echo {step}:$TRAINCTL_PROFILE >> '{}'; exit {exit}",
        record.display()
    ))
}

fn config(sandbox: &Sandbox, main_exit: i32) -> PipelineConfig {
    std::fs::create_dir_all(sandbox.path().join("tests")).unwrap();
    let record = sandbox.path().join(RECORD);
    PipelineConfig {
        profile: "ci".to_string(),
        activate: "export TRAINCTL_PROFILE={profile}".to_string(),
        workdir: sandbox.path().display().to_string(),
        main: record_step(&record, "main", main_exit),
        test_dir: "tests".to_string(),
        tests: vec![
            TestCommand {
                name: "unit".to_string(),
                command: record_step(&record, "unit", 0),
            },
            TestCommand {
                name: "smoke".to_string(),
                command: record_step(&record, "smoke", 2),
            },
        ],
        failure_policy: FailurePolicy::Continue,
        log_dir: None,
        shell: Some(ShellConfig {
            binary: Some("/bin/sh".to_string()),
            args: None,
        }),
    }
}

fn run_id() -> RunId {
    RunId::from_unix_seconds(1_700_000_000)
}

#[tokio::test]
async fn steps_run_in_order_with_activated_profile() {
    let sandbox = Sandbox::new();
    let plan = sequence::plan(&config(&sandbox, 0), run_id()).unwrap();

    let report = plan
        .run(&Invoker::new(Echo::Silent), &Interrupt::new())
        .await;

    assert_eq!(sandbox.read(RECORD), "main:ci\nunit:ci\nsmoke:ci\n");
    assert_eq!(report.outcome_of("activate"), Some(StepOutcome::Succeeded));
    assert_eq!(report.outcome_of("smoke"), Some(StepOutcome::Failed { code: 2 }));
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test]
async fn continue_policy_runs_tests_after_main_fails() {
    let sandbox = Sandbox::new();
    let plan = sequence::plan(&config(&sandbox, 4), run_id()).unwrap();

    let report = plan
        .run(&Invoker::new(Echo::Silent), &Interrupt::new())
        .await;

    assert_eq!(sandbox.read(RECORD), "main:ci\nunit:ci\nsmoke:ci\n");
    assert_eq!(report.outcome_of("main"), Some(StepOutcome::Failed { code: 4 }));
    assert_eq!(report.outcome_of("unit"), Some(StepOutcome::Succeeded));
    // First failure wins over later ones.
    assert_eq!(report.exit_code(), 4);
    assert!(!report.succeeded());
}

#[tokio::test]
async fn halt_policy_skips_remaining_steps() {
    let sandbox = Sandbox::new();
    let plan = sequence::plan(&config(&sandbox, 4), run_id())
        .unwrap()
        .with_policy(FailurePolicy::Halt);

    let report = plan
        .run(&Invoker::new(Echo::Silent), &Interrupt::new())
        .await;

    assert_eq!(sandbox.read(RECORD), "main:ci\n");
    assert_eq!(report.outcome_of("unit"), Some(StepOutcome::Skipped));
    assert_eq!(report.outcome_of("smoke"), Some(StepOutcome::Skipped));
    assert_eq!(report.exit_code(), 4);
}

#[tokio::test]
async fn failed_activation_still_runs_under_continue() {
    let sandbox = Sandbox::new();
    let mut config = config(&sandbox, 0);
    config.activate = "exit 5".to_string();
    let plan = sequence::plan(&config, run_id()).unwrap();

    let report = plan
        .run(&Invoker::new(Echo::Silent), &Interrupt::new())
        .await;

    assert_eq!(report.outcome_of("activate"), Some(StepOutcome::Failed { code: 5 }));
    assert_eq!(sandbox.read(RECORD), "main:\nunit:\nsmoke:\n");
    assert_eq!(report.exit_code(), 5);
}

#[tokio::test]
async fn interrupt_prevents_new_steps() {
    let sandbox = Sandbox::new();
    let plan = sequence::plan(&config(&sandbox, 0), run_id()).unwrap();
    let interrupt = Interrupt::new();
    interrupt.trigger();

    let report = plan.run(&Invoker::new(Echo::Silent), &interrupt).await;

    assert!(
        report
            .steps
            .iter()
            .all(|step| step.outcome == StepOutcome::Interrupted)
    );
    assert_eq!(report.steps.len(), 4);
    assert_eq!(sandbox.read(RECORD), "");
    assert!(!report.succeeded());
    assert_eq!(report.exit_code(), INTERRUPTED_EXIT_CODE);
}

#[tokio::test]
async fn interrupt_during_step_stops_the_rest() {
    let sandbox = Sandbox::new();
    let started = sandbox.path().join("main-started");
    let mut config = config(&sandbox, 0);
    // Stands in for a child that receives the terminal's SIGINT.
    config.main = sh(&format!(
        "touch '{}'; sleep 1; kill -INT $$",
        started.display()
    ));
    let plan = sequence::plan(&config, run_id()).unwrap();
    let interrupt = Interrupt::new();

    let trigger = {
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            while !started.exists() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            interrupt.trigger();
        })
    };
    let report = plan.run(&Invoker::new(Echo::Silent), &interrupt).await;
    trigger.await.unwrap();

    assert_eq!(report.outcome_of("activate"), Some(StepOutcome::Succeeded));
    assert_eq!(
        report.outcome_of("main"),
        Some(StepOutcome::Failed { code: 130 })
    );
    assert_eq!(report.outcome_of("unit"), Some(StepOutcome::Interrupted));
    assert_eq!(report.outcome_of("smoke"), Some(StepOutcome::Interrupted));
    assert_eq!(sandbox.read(RECORD), "");
    assert_eq!(report.exit_code(), 130);
}

#[tokio::test]
async fn step_logs_are_written_per_step() {
    let sandbox = Sandbox::new();
    let mut config = config(&sandbox, 0);
    config.main = sh("echo training; echo warn >&2");
    config.log_dir = Some(sandbox.path().join("logs").display().to_string());
    let plan = sequence::plan(&config, run_id()).unwrap();

    plan
        .run(&Invoker::new(Echo::Silent), &Interrupt::new())
        .await;

    // The two streams are pumped independently, so only content is stable.
    let log = sandbox.read("logs/main_1700000000.log");
    assert!(log.contains("training\n"));
    assert!(log.contains("warn\n"));
    assert!(sandbox.path().join("logs/unit_1700000000.log").exists());
}
