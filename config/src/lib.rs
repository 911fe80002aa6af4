//! Configuration for trainctl.
//!
//! Loaded from `~/.trainctl/config.toml` (or `$TRAINCTL_CONFIG`). Every field has a
//! default, so an absent file yields the stock launch setup:
//!
//! ```toml
//! [distributed]
//! launcher = ["python", "-m", "intel_extension_for_pytorch.cpu.launch", "--distributed"]
//! nproc_per_node = 2
//! nnodes = 1
//! domain = "bert"
//!
//! [distributed.env]
//! OMP_NUM_THREADS = "18"
//! KMP_BLOCKTIME = "1"
//! KMP_AFFINITY = "granularity=fine,compact,1,0"
//!
//! [pipeline]
//! profile = "pytorch"
//! failure_policy = "continue"
//! ```
//!
//! String values may reference `${VAR}`; references are expanded at load time.

mod expand;
mod persist;

use std::path::{Path, PathBuf};
use std::{env, fs, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trainctl_types::{EnvSet, FailurePolicy, LogFileName, RunId, Topology, TopologyError};

pub use expand::expand_env_vars;
pub use persist::{set_value, write_default};

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "TRAINCTL_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write config at {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("invalid config key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Write { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl From<TopologyError> for ConfigError {
    fn from(err: TopologyError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainctlConfig {
    pub distributed: DistributedConfig,
    pub pipeline: PipelineConfig,
}

/// Settings for `trainctl train`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DistributedConfig {
    /// Launcher argv placed before the topology flags.
    pub launcher: Vec<String>,
    pub nproc_per_node: u32,
    pub nnodes: u32,
    /// Training entry script handed to the launcher.
    pub entry: String,
    /// Architecture family, forwarded as `--domain`.
    pub domain: String,
    /// Pre-generated architecture config, forwarded as `--conf`.
    pub conf: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    pub log_dir: String,
    /// `{domain}` is replaced with [`DistributedConfig::domain`].
    pub log_prefix: String,
    pub log_suffix: String,
    pub env: EnvSet,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            launcher: vec![
                "python".to_string(),
                "-m".to_string(),
                "intel_extension_for_pytorch.cpu.launch".to_string(),
                "--distributed".to_string(),
            ],
            nproc_per_node: 2,
            nnodes: 1,
            entry: "train.py".to_string(),
            domain: "bert".to_string(),
            conf: "conf/denas/nlp/e2eaiok_denas_train_bert.conf".to_string(),
            workdir: None,
            log_dir: ".".to_string(),
            log_prefix: "{domain}_training_".to_string(),
            log_suffix: ".log".to_string(),
            env: default_thread_env(),
        }
    }
}

fn default_thread_env() -> EnvSet {
    let mut env = EnvSet::new();
    for (name, value) in [
        ("OMP_NUM_THREADS", "18"),
        ("KMP_BLOCKTIME", "1"),
        ("KMP_AFFINITY", "granularity=fine,compact,1,0"),
    ] {
        // Literal names above are valid.
        let _ = env.insert(name, value);
    }
    env
}

impl DistributedConfig {
    pub fn topology(&self) -> Result<Topology, TopologyError> {
        Topology::new(self.nproc_per_node, self.nnodes)
    }

    #[must_use]
    pub fn log_file_name(&self, run_id: RunId) -> LogFileName {
        let prefix = self.log_prefix.replace("{domain}", &self.domain);
        LogFileName::new(&prefix, run_id, &self.log_suffix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestCommand {
    pub name: String,
    pub command: Vec<String>,
}

/// Settings for `trainctl pipeline`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Runtime profile to activate before anything else runs.
    pub profile: String,
    /// Shell snippet that activates `{profile}`.
    pub activate: String,
    pub workdir: String,
    pub main: Vec<String>,
    pub test_dir: String,
    pub tests: Vec<TestCommand>,
    pub failure_policy: FailurePolicy,
    /// When set, each step is teed to `<log_dir>/<step>_<run_id>.log`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
    /// Shell used for the activation step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<ShellConfig>,
}

/// Shell override for the activation step.
///
/// ```toml
/// [pipeline.shell]
/// binary = "/bin/bash"
/// args = ["-c"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShellConfig {
    /// Override shell binary (e.g., "bash", "/usr/local/bin/zsh").
    pub binary: Option<String>,
    /// Override shell args (e.g., `["-c"]`).
    pub args: Option<Vec<String>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            profile: "pytorch".to_string(),
            activate: "source activate {profile}".to_string(),
            workdir: ".".to_string(),
            main: vec!["python".to_string(), "main.py".to_string()],
            test_dir: "tests".to_string(),
            tests: vec![
                TestCommand {
                    name: "test-suite".to_string(),
                    command: vec![
                        "python".to_string(),
                        "-m".to_string(),
                        "pytest".to_string(),
                        "test_main.py".to_string(),
                    ],
                },
                TestCommand {
                    name: "test-runner".to_string(),
                    command: vec!["bash".to_string(), "run_tests.sh".to_string()],
                },
            ],
            failure_policy: FailurePolicy::Continue,
            log_dir: None,
            shell: None,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn activation_snippet(&self) -> String {
        self.activate.replace("{profile}", &self.profile)
    }
}

impl TrainctlConfig {
    /// Load from an explicit path, `$TRAINCTL_CONFIG`, or the default location.
    ///
    /// An explicitly named file must exist. A missing file at the default location
    /// yields the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        if let Some(path) = env::var_os(CONFIG_ENV_VAR) {
            return Self::load_from(Path::new(&path));
        }
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };
        let mut config = Self::parse(&content).map_err(|source| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, source);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        config.expand_env();
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.distributed;
        if d.launcher.is_empty() {
            return Err(ConfigError::Invalid(
                "distributed.launcher must name a program".to_string(),
            ));
        }
        if d.domain.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "distributed.domain must not be empty".to_string(),
            ));
        }
        d.topology()?;

        let p = &self.pipeline;
        if p.main.is_empty() {
            return Err(ConfigError::Invalid(
                "pipeline.main must name a program".to_string(),
            ));
        }
        let mut seen = vec!["activate", "main"];
        for test in &p.tests {
            if test.name.trim().is_empty() || seen.contains(&test.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "pipeline test name {:?} must be non-empty and unique",
                    test.name
                )));
            }
            if test.name.contains(['/', '\\']) {
                return Err(ConfigError::Invalid(format!(
                    "pipeline test name {:?} must not contain path separators",
                    test.name
                )));
            }
            seen.push(&test.name);
            if test.command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "pipeline test {:?} must name a program",
                    test.name
                )));
            }
        }
        Ok(())
    }

    fn expand_env(&mut self) {
        let d = &mut self.distributed;
        expand_all(&mut d.launcher);
        for value in [
            &mut d.entry,
            &mut d.domain,
            &mut d.conf,
            &mut d.log_dir,
            &mut d.log_prefix,
            &mut d.log_suffix,
        ] {
            *value = expand_env_vars(value);
        }
        if let Some(workdir) = d.workdir.as_mut() {
            *workdir = expand_env_vars(workdir);
        }

        let p = &mut self.pipeline;
        for value in [&mut p.profile, &mut p.workdir, &mut p.test_dir] {
            *value = expand_env_vars(value);
        }
        expand_all(&mut p.main);
        for test in &mut p.tests {
            expand_all(&mut test.command);
        }
        if let Some(log_dir) = p.log_dir.as_mut() {
            *log_dir = expand_env_vars(log_dir);
        }
    }
}

fn expand_all(values: &mut [String]) {
    for value in values {
        *value = expand_env_vars(value);
    }
}

/// `$TRAINCTL_CONFIG` if set, otherwise `~/.trainctl/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }
    config_dir().map(|dir| dir.join("config.toml"))
}

/// `~/.trainctl`
#[must_use]
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".trainctl"))
}
