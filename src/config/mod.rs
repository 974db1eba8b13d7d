// src/config/mod.rs

//! Configuration loading and validation for devloop.
//!
//! - [`model`] is the TOML-backed data model (`Devloop.toml`).
//! - [`loader`] reads a config file from disk.
//! - [`validate`] turns a `RawConfigFile` into a checked `ConfigFile`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{config_root_dir, default_config_path, load_and_validate, load_from_path};
pub use model::{
    ApplyCommand, CommandConfig, CommandKind, ComponentConfig, ComponentKind, CompositeCommand,
    ConfigFile, ContainerComponent, ExecCommand, ExecutorSection, ImageComponent,
    ManifestComponent, ProjectSection, RawConfigFile, SupervisorSection, Timings, WatchSection,
};
