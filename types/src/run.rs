use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wall-clock derived identifier for one launcher run.
///
/// Second resolution: two runs started within the same second share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(i64);

impl RunId {
    #[must_use]
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    #[must_use]
    pub fn at(time: DateTime<Utc>) -> Self {
        Self(time.timestamp())
    }

    #[must_use]
    pub fn from_unix_seconds(secs: i64) -> Self {
        Self(secs)
    }

    #[must_use]
    pub fn unix_seconds(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `prefix + run_id + suffix`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogFileName {
    name: String,
    run_id: RunId,
}

impl LogFileName {
    #[must_use]
    pub fn new(prefix: &str, run_id: RunId, suffix: &str) -> Self {
        Self {
            name: format!("{prefix}{run_id}{suffix}"),
            run_id,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    #[must_use]
    pub fn in_dir(&self, dir: &Path) -> PathBuf {
        dir.join(&self.name)
    }
}

impl fmt::Display for LogFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
