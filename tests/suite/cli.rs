//! `trainctl` argument handling, dry runs, and the `config` subcommands.

use std::fs;

use crate::common::Sandbox;

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn train_dry_run_prints_env_and_command() {
    let sandbox = Sandbox::new();
    let output = sandbox
        .trainctl()
        .args(["train", "--dry-run", "--nproc-per-node", "4", "--conf", "my.conf"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.starts_with("# run "));
    assert!(out.contains("export OMP_NUM_THREADS=18\n"));
    assert!(out.contains("export KMP_BLOCKTIME=1\n"));
    assert!(out.contains("export KMP_AFFINITY=granularity=fine,compact,1,0\n"));
    assert!(out.contains(
        "python -m intel_extension_for_pytorch.cpu.launch --distributed --nproc_per_node=4 --nnodes=1 train.py --domain bert --conf my.conf 2>&1 | tee -a ./bert_training_"
    ));
    // Nothing ran, so no run log exists.
    let logs = fs::read_dir(sandbox.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".log"))
        .count();
    assert_eq!(logs, 0);
}

#[test]
fn pipeline_dry_run_lists_steps() {
    let sandbox = Sandbox::new();
    let output = sandbox
        .trainctl()
        .args(["pipeline", "--dry-run", "--halt-on-failure"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("(on failure: halt)"));
    assert!(out.contains("1. activate [pytorch] via "));
    assert!(out.contains(": source activate pytorch\n"));
    assert!(out.contains("2. main (cd .): python main.py\n"));
    assert!(out.contains("3. test-suite (cd ./tests): python -m pytest test_main.py\n"));
    assert!(out.contains("4. test-runner (cd ./tests): bash run_tests.sh\n"));
}

#[test]
fn halt_and_keep_going_conflict() {
    let sandbox = Sandbox::new();
    let output = sandbox
        .trainctl()
        .args(["pipeline", "--halt-on-failure", "--keep-going"])
        .output()
        .unwrap();

    assert!(!output.status.success());
}

#[test]
fn pipeline_exit_code_is_first_failure() {
    let sandbox = Sandbox::new();
    fs::create_dir_all(sandbox.path().join("tests")).unwrap();
    let config = sandbox.write(
        "trainctl.toml",
        r#"
[pipeline]
activate = "true"
main = ["/bin/sh", "-c", "exit 6"]

[[pipeline.tests]]
name = "unit"
command = ["/bin/sh", "-c", "echo unit-ran"]

[pipeline.shell]
binary = "/bin/sh"
"#,
    );

    let output = sandbox
        .trainctl()
        .arg("--config")
        .arg(&config)
        .arg("pipeline")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(6));
    assert!(stdout(&output).contains("unit-ran"));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed (exit code 6)"));
    assert!(stderr.contains("unit"));
}

#[test]
fn config_init_show_and_set() {
    let sandbox = Sandbox::new();
    let path = sandbox.path().join(".trainctl").join("config.toml");

    let init = sandbox.trainctl().args(["config", "init"]).output().unwrap();
    assert!(init.status.success());
    assert_eq!(stdout(&init).trim(), path.display().to_string());
    assert!(fs::read_to_string(&path).unwrap().starts_with("# trainctl configuration"));

    // A second init without --force leaves the file alone.
    let again = sandbox.trainctl().args(["config", "init"]).output().unwrap();
    assert!(!again.status.success());
    let forced = sandbox
        .trainctl()
        .args(["config", "init", "--force"])
        .output()
        .unwrap();
    assert!(forced.status.success());

    let set = sandbox
        .trainctl()
        .args(["config", "set", "distributed.domain", "vit"])
        .output()
        .unwrap();
    assert!(set.status.success());
    let set = sandbox
        .trainctl()
        .args(["config", "set", "distributed.nproc_per_node", "8"])
        .output()
        .unwrap();
    assert!(set.status.success());

    let show = sandbox.trainctl().args(["config", "show"]).output().unwrap();
    assert!(show.status.success());
    let shown = stdout(&show);
    assert!(shown.contains("domain = \"vit\""));
    assert!(shown.contains("nproc_per_node = 8"));

    // Comments written by init survive edits.
    assert!(fs::read_to_string(&path).unwrap().starts_with("# trainctl configuration"));
}

#[test]
fn config_set_rejects_invalid_values() {
    let sandbox = Sandbox::new();
    let config = sandbox.path().join("custom.toml");

    let zero = sandbox
        .trainctl()
        .arg("--config")
        .arg(&config)
        .args(["config", "set", "distributed.nnodes", "0"])
        .output()
        .unwrap();
    assert!(!zero.status.success());
    assert!(!config.exists());

    let bare = sandbox
        .trainctl()
        .arg("--config")
        .arg(&config)
        .args(["config", "set", "domain", "vit"])
        .output()
        .unwrap();
    assert!(!bare.status.success());
}

#[test]
fn config_path_follows_env_override() {
    let sandbox = Sandbox::new();
    let custom = sandbox.path().join("elsewhere.toml");
    let output = sandbox
        .trainctl()
        .env("TRAINCTL_CONFIG", &custom)
        .args(["config", "path"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), custom.display().to_string());
}

#[test]
fn explicit_missing_config_is_an_error() {
    let sandbox = Sandbox::new();
    let output = sandbox
        .trainctl()
        .args(["--config", "does-not-exist.toml", "train", "--dry-run"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to load configuration"));
}
