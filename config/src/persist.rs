//! Writing config files: the initial default file and single-key edits.

use std::fs;
use std::path::Path;

use toml_edit::{DocumentMut, Item, Table, value};
use trainctl_utils::{WriteMode, atomic_write};

use crate::{ConfigError, ShellConfig, TrainctlConfig};

const HEADER: &str = "\
# trainctl configuration
#
# String values may reference environment variables as ${VAR}.
";

/// Write the default configuration to `path`.
///
/// Refuses to overwrite an existing file unless `force` is set.
pub fn write_default(path: &Path, force: bool) -> Result<(), ConfigError> {
    let body = TrainctlConfig::default().to_toml()?;
    let content = format!("{HEADER}\n{body}");
    let mode = if force {
        WriteMode::Replace
    } else {
        WriteMode::CreateNew
    };
    atomic_write(path, content.as_bytes(), mode).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "Wrote default config");
    Ok(())
}

/// Set one dotted key (e.g. `distributed.domain`) in the file at `path`.
///
/// Uses `toml_edit` so comments and formatting survive. The edited document must
/// still parse and validate before it is written back.
pub fn set_value(path: &Path, key: &str, raw: &str) -> Result<(), ConfigError> {
    let content = if path.exists() {
        fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        String::new()
    };

    let mut doc = content
        .parse::<DocumentMut>()
        .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))?;

    let segments: Vec<&str> = key.split('.').collect();
    if segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
        return Err(ConfigError::InvalidKey {
            key: key.to_string(),
            reason: "expected <section>.<field>".to_string(),
        });
    }
    let (field, tables) = segments.split_last().ok_or_else(|| ConfigError::InvalidKey {
        key: key.to_string(),
        reason: "empty key".to_string(),
    })?;

    let item = typed_value(key, &segments, raw)?;

    let mut table = doc.as_table_mut();
    for name in tables {
        if !table.contains_key(name) {
            table.insert(name, Item::Table(Table::new()));
        }
        table = table
            .get_mut(name)
            .and_then(Item::as_table_mut)
            .ok_or_else(|| ConfigError::InvalidKey {
                key: key.to_string(),
                reason: format!("{name} is not a table"),
            })?;
    }
    table.insert(field, item);

    let serialized = doc.to_string();
    let config = TrainctlConfig::parse(&serialized).map_err(|e| ConfigError::InvalidKey {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    config.validate()?;

    atomic_write(path, serialized.as_bytes(), WriteMode::Replace).map_err(|source| {
        ConfigError::Write {
            path: path.to_path_buf(),
            source,
        }
    })?;
    tracing::info!(path = %path.display(), key, "Updated config");
    Ok(())
}

/// Type `raw` after the field it replaces.
///
/// Field types come from the serialized defaults, with every optional field
/// filled in so that it appears. Environment values are always strings. Keys the
/// defaults do not know are stored as strings and left to validation.
fn typed_value(key: &str, segments: &[&str], raw: &str) -> Result<Item, ConfigError> {
    if key.starts_with("distributed.env.") {
        return Ok(value(raw));
    }
    let reference = reference_table()?;
    let invalid = |reason: String| ConfigError::InvalidKey {
        key: key.to_string(),
        reason,
    };

    match lookup(&reference, segments) {
        Some(toml::Value::Integer(_)) => raw
            .parse::<i64>()
            .map(value)
            .map_err(|_| invalid(format!("expected an integer, got {raw:?}"))),
        Some(toml::Value::Boolean(_)) => raw
            .parse::<bool>()
            .map(value)
            .map_err(|_| invalid(format!("expected true or false, got {raw:?}"))),
        Some(toml::Value::Array(_)) => raw
            .parse::<toml_edit::Value>()
            .map(Item::Value)
            .map_err(|e| invalid(format!("expected a TOML array: {e}"))),
        Some(toml::Value::Table(_)) => Err(invalid("is a table, not a field".to_string())),
        _ => Ok(value(raw)),
    }
}

fn reference_table() -> Result<toml::Table, ConfigError> {
    let mut config = TrainctlConfig::default();
    config.distributed.workdir = Some(String::new());
    config.pipeline.log_dir = Some(String::new());
    config.pipeline.shell = Some(ShellConfig {
        binary: Some(String::new()),
        args: Some(Vec::new()),
    });
    let rendered = toml::to_string(&config)?;
    toml::from_str(&rendered).map_err(|e| ConfigError::Invalid(e.to_string()))
}

fn lookup<'a>(table: &'a toml::Table, segments: &[&str]) -> Option<&'a toml::Value> {
    let (first, rest) = segments.split_first()?;
    let mut current = table.get(*first)?;
    for segment in rest {
        current = current.as_table()?.get(*segment)?;
    }
    Some(current)
}
