// src/devfile/mod.rs

//! Commands as the engine consumes them.
//!
//! - [`command`] holds `CommandDefinition` / `ResolvedCommand` and builds the
//!   `sh -c` line shared by in-place exec and new-container Jobs.
//! - [`walker`] resolves group defaults, expands composites, and calls the
//!   command handler once per resolved command.

pub mod command;
pub mod walker;

pub use command::{shell_argv, CommandDefinition, ResolvedCommand, SHELL};
pub use walker::{run_plan, CommandWalker, PlannedStep};
