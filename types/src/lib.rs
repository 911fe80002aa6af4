//! Core domain types for trainctl.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Launch plans are built from these values before anything is spawned, which keeps
//! every environment variable and argument visible to tests.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod command;
mod env;
mod run;
mod sequence;

pub use command::{LaunchCommand, Topology, TopologyError, quote_arg, render_command_line};
pub use env::{EnvError, EnvSet};
pub use run::{LogFileName, RunId};
pub use sequence::{
    FailurePolicy, INTERRUPTED_EXIT_CODE, SequenceReport, Step, StepAction, StepOutcome,
    StepReport,
};
