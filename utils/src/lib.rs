//! Shared infrastructure utilities for trainctl.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`log_file`**: Append-only per-run log files
//! - **`tee`**: Duplicate child output to the terminal and a log file

pub mod atomic_write;
pub mod log_file;
pub mod tee;

pub use atomic_write::{WriteMode, atomic_write};
pub use log_file::LogFile;
pub use tee::{Echo, OutputStream, TeeSink};
