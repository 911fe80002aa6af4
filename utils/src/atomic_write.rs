//! Atomic file write helpers.
//!
//! Uses a temp file + rename pattern so a crash never leaves a half-written config.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Replace the destination if it exists.
    #[default]
    Replace,
    /// Fail with `AlreadyExists` if the destination exists.
    CreateNew,
}

/// Write `bytes` to `path` atomically, creating the parent directory if needed.
pub fn atomic_write(path: impl AsRef<Path>, bytes: &[u8], mode: WriteMode) -> io::Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    match mode {
        WriteMode::Replace => {
            tmp.persist(path).map_err(|err| err.error)?;
        }
        WriteMode::CreateNew => {
            tmp.persist_noclobber(path).map_err(|err| err.error)?;
        }
    }

    #[cfg(unix)]
    if let Err(e) = fs::File::open(parent).and_then(|d| d.sync_all()) {
        debug!(path = %parent.display(), "Parent directory sync_all failed (best-effort): {e}");
    }

    Ok(())
}
