use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    #[error("environment variable name must not be empty")]
    EmptyName,
    #[error("environment variable name {name:?} must not contain '=' or NUL")]
    InvalidName { name: String },
    #[error("value of environment variable {name} must not contain NUL")]
    InvalidValue { name: String },
}

/// Environment variables handed explicitly to a child process.
///
/// Values are opaque to trainctl: `OMP_NUM_THREADS = "18"` is never parsed as a
/// number. The only checks are the ones the OS imposes on names and values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct EnvSet {
    vars: BTreeMap<String, String>,
}

impl EnvSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), EnvError> {
        let name = name.into();
        let value = value.into();
        validate_name(&name)?;
        if value.contains('\0') {
            return Err(EnvError::InvalidValue { name });
        }
        self.vars.insert(name, value);
        Ok(())
    }

    pub fn with(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, EnvError> {
        self.insert(name, value)?;
        Ok(self)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.vars.remove(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlay `other` on top of `self`; entries in `other` win.
    #[must_use]
    pub fn merged(&self, other: &EnvSet) -> EnvSet {
        let mut vars = self.vars.clone();
        for (name, value) in &other.vars {
            vars.insert(name.clone(), value.clone());
        }
        EnvSet { vars }
    }

    /// Parse the output of `env -0`.
    ///
    /// Entries without `=` or with an invalid name are skipped; shells export a few
    /// oddities (e.g. `BASH_FUNC_x%%`) that are harmless to drop.
    #[must_use]
    pub fn from_nul_separated(dump: &[u8]) -> EnvSet {
        let mut set = EnvSet::new();
        for entry in dump.split(|b| *b == 0) {
            if entry.is_empty() {
                continue;
            }
            let entry = String::from_utf8_lossy(entry);
            let Some((name, value)) = entry.split_once('=') else {
                continue;
            };
            let _ = set.insert(name, value);
        }
        set
    }
}

fn validate_name(name: &str) -> Result<(), EnvError> {
    if name.is_empty() {
        return Err(EnvError::EmptyName);
    }
    if name.contains('=') || name.contains('\0') {
        return Err(EnvError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

impl TryFrom<BTreeMap<String, String>> for EnvSet {
    type Error = EnvError;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        let mut set = EnvSet::new();
        for (name, value) in map {
            set.insert(name, value)?;
        }
        Ok(set)
    }
}

impl From<EnvSet> for BTreeMap<String, String> {
    fn from(set: EnvSet) -> Self {
        set.vars
    }
}

impl fmt::Display for EnvSet {
    /// Renders as `NAME=value` assignments, one per line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.vars {
            writeln!(f, "{name}={}", crate::quote_arg(value))?;
        }
        Ok(())
    }
}
