//! Distributed training launches against a stand-in launcher script.

use std::fs;
use std::path::{Path, PathBuf};

use trainctl_config::DistributedConfig;
use trainctl_runner::{Invoker, distributed};
use trainctl_types::RunId;
use trainctl_utils::Echo;

use crate::common::{Sandbox, toml_array};

/// Launcher that echoes its argv and thread env, then exits with `exit`.
fn fake_launcher(exit: i32) -> Vec<String> {
    vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        format!("echo \"args:$*\"; echo \"omp:$OMP_NUM_THREADS\" >&2; exit {exit}"),
        "launcher".to_string(),
    ]
}

fn training_logs(dir: &Path) -> Vec<PathBuf> {
    let mut logs: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| {
                    path.file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| {
                            name.starts_with("bert_training_") && name.ends_with(".log")
                        })
                })
                .collect()
        })
        .unwrap_or_default();
    logs.sort();
    logs
}

#[tokio::test]
async fn launch_preserves_failing_exit_code_and_logs_output() {
    let sandbox = Sandbox::new();
    let config = DistributedConfig {
        launcher: fake_launcher(3),
        conf: "c.conf".to_string(),
        log_dir: sandbox.path().display().to_string(),
        ..DistributedConfig::default()
    };
    let plan = distributed::plan(&config, RunId::from_unix_seconds(1_700_000_000)).unwrap();

    let invocation = plan.launch(&Invoker::new(Echo::Silent)).await.unwrap();

    assert_eq!(invocation.code, 3);
    assert!(!invocation.success());
    assert_eq!(invocation.log_path.as_deref(), Some(plan.log_path.as_path()));
    let log = fs::read_to_string(&plan.log_path).unwrap();
    assert!(
        log.contains("args:--nproc_per_node=2 --nnodes=1 train.py --domain bert --conf c.conf\n")
    );
    assert!(log.contains("omp:18\n"));
}

#[tokio::test]
async fn repeated_launches_with_same_run_id_append() {
    let sandbox = Sandbox::new();
    let config = DistributedConfig {
        launcher: fake_launcher(0),
        log_dir: sandbox.path().display().to_string(),
        ..DistributedConfig::default()
    };
    let plan = distributed::plan(&config, RunId::from_unix_seconds(1_700_000_000)).unwrap();
    let invoker = Invoker::new(Echo::Silent);

    assert_eq!(plan.launch(&invoker).await.unwrap().code, 0);
    assert_eq!(plan.launch(&invoker).await.unwrap().code, 0);

    let log = fs::read_to_string(&plan.log_path).unwrap();
    assert_eq!(log.matches("omp:18\n").count(), 2);
}

#[test]
fn train_command_exits_with_launcher_code() {
    let sandbox = Sandbox::new();
    let logs = sandbox.path().join("logs");
    let config = sandbox.write(
        "trainctl.toml",
        &format!(
            "[distributed]\nlauncher = {}\nconf = \"c.conf\"\nlog_dir = {:?}\n",
            toml_array(&fake_launcher(9).iter().map(String::as_str).collect::<Vec<_>>()),
            logs.display().to_string(),
        ),
    );

    let output = sandbox
        .trainctl()
        .arg("--config")
        .arg(&config)
        .arg("train")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(9));
    // Child stdout is mirrored to trainctl's stdout, stderr to stderr.
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("args:--nproc_per_node=2 --nnodes=1 train.py"));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("omp:18"));

    let written = training_logs(&logs);
    assert_eq!(written.len(), 1);
    let log = fs::read_to_string(&written[0]).unwrap();
    assert!(log.contains("omp:18\n"));
}

#[test]
fn train_command_overrides_domain_in_log_name() {
    let sandbox = Sandbox::new();
    let config = sandbox.write(
        "trainctl.toml",
        &format!(
            "[distributed]\nlauncher = {}\nlog_dir = {:?}\n",
            toml_array(&fake_launcher(0).iter().map(String::as_str).collect::<Vec<_>>()),
            sandbox.path().display().to_string(),
        ),
    );

    let output = sandbox
        .trainctl()
        .env("TRAINCTL_CONFIG", &config)
        .args(["train", "--quiet", "--domain", "vit"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    assert!(!String::from_utf8_lossy(&output.stdout).contains("args:"));
    let vit_logs: Vec<_> = fs::read_dir(sandbox.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("vit_training_"))
        .collect();
    assert_eq!(vit_logs.len(), 1);
    assert!(training_logs(sandbox.path()).is_empty());
}

#[test]
fn missing_launcher_exits_127() {
    let sandbox = Sandbox::new();
    let config = sandbox.write(
        "trainctl.toml",
        &format!(
            "[distributed]\nlauncher = [\"/nonexistent/trainctl-launcher\"]\nlog_dir = {:?}\n",
            sandbox.path().display().to_string(),
        ),
    );

    let output = sandbox
        .trainctl()
        .arg("--config")
        .arg(&config)
        .arg("train")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(127));
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to start"));
}
