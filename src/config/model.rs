// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{DevloopError, Result};
use crate::types::{GroupKind, RunMode};

/// Top-level configuration as read from `Devloop.toml`.
///
/// ```toml
/// [project]
/// component = "nodejs"
///
/// [component.runtime]
/// container = { image = "node:18" }
///
/// [command.run]
/// exec = { component = "runtime", command_line = "npm start", group = "run" }
/// ```
///
/// Everything except `[project].component` has a default.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub project: ProjectSection,

    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub supervisor: SupervisorSection,

    #[serde(default)]
    pub executor: ExecutorSection,

    /// Components from `[component.<name>]`.
    #[serde(default)]
    pub component: BTreeMap<String, ComponentConfig>,

    /// Commands from `[command.<id>]`, keyed by command id.
    #[serde(default)]
    pub command: BTreeMap<String, CommandConfig>,
}

/// Validated configuration.
///
/// Only constructible through `TryFrom<RawConfigFile>` (see `validate.rs`),
/// which also pre-parses every duration string into [`Timings`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub project: ProjectSection,
    pub watch: WatchSection,
    pub supervisor: SupervisorSection,
    pub executor: ExecutorSection,
    pub component: BTreeMap<String, ComponentConfig>,
    pub command: BTreeMap<String, CommandConfig>,
    pub timings: Timings,
    /// Directory relative manifest `uri`s are resolved against.
    pub base_dir: PathBuf,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, timings: Timings) -> Self {
        Self {
            project: raw.project,
            watch: raw.watch,
            supervisor: raw.supervisor,
            executor: raw.executor,
            component: raw.component,
            command: raw.command,
            timings,
            base_dir: PathBuf::from("."),
        }
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Look up a container component by name.
    pub fn container(&self, name: &str) -> Option<&ContainerComponent> {
        self.component.get(name).and_then(|c| c.container.as_ref())
    }

    /// Names of all container components, in config order.
    pub fn container_names(&self) -> impl Iterator<Item = &str> {
        self.component
            .iter()
            .filter(|(_, c)| c.container.is_some())
            .map(|(name, _)| name.as_str())
    }
}

/// Durations parsed out of the string-typed sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    pub watch_delay: Duration,
    pub status_schedule: Vec<Duration>,
    pub hint_after: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            watch_delay: Duration::from_secs(1),
            status_schedule: vec![
                Duration::from_secs(5),
                Duration::from_secs(6),
                Duration::from_secs(9),
            ],
            hint_after: Duration::from_secs(60),
        }
    }
}

/// `[project]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSection {
    /// Name of the component under development.
    pub component: String,

    #[serde(default = "default_application")]
    pub application: String,

    /// Target namespace; `None` means the kubectl context's namespace.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Where sources are synced to inside containers with `mount_sources`.
    #[serde(default = "default_sync_target")]
    pub sync_target: String,

    #[serde(default)]
    pub run_mode: RunMode,

    #[serde(default = "default_kubectl")]
    pub kubectl: String,

    /// Image build tool (`docker`, `podman`); enables `apply` on image components.
    #[serde(default)]
    pub image_builder: Option<String>,
}

fn default_application() -> String {
    "app".to_string()
}

fn default_sync_target() -> String {
    "/projects".to_string()
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    /// Debounce delay (e.g. `"1s"`).
    #[serde(default = "default_watch_delay")]
    pub delay: String,

    /// Glob patterns (relative to the watch root) that are never watched.
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Regex patterns matched against the full path.
    #[serde(default = "default_ignore_regex")]
    pub ignore_regex: Vec<String>,

    /// Skip write events whose file content hash did not change.
    #[serde(default)]
    pub use_hash: bool,
}

fn default_watch_delay() -> String {
    "1s".to_string()
}

/// Default ignore rule: anything that contains `.git`.
pub fn default_ignore_regex() -> Vec<String> {
    vec![r".*\.git.*".to_string()]
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            delay: default_watch_delay(),
            ignore: Vec::new(),
            ignore_regex: default_ignore_regex(),
            use_hash: false,
        }
    }
}

/// `[supervisor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSection {
    /// Sleep schedule used while waiting for a started command to settle.
    #[serde(default = "default_status_schedule")]
    pub status_schedule: Vec<String>,

    /// Directory inside the container holding pid/exit/log files.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

fn default_status_schedule() -> Vec<String> {
    vec!["5s".to_string(), "6s".to_string(), "9s".to_string()]
}

fn default_state_dir() -> String {
    "/tmp/.devloop".to_string()
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            status_schedule: default_status_schedule(),
            state_dir: default_state_dir(),
        }
    }
}

/// `[executor]` section (new-container Jobs).
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    /// Print a log-tailing hint if a Job is still running after this long.
    #[serde(default = "default_hint_after")]
    pub hint_after: String,

    /// Lines of log output shown when a command fails.
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,
}

fn default_hint_after() -> String {
    "1m".to_string()
}

fn default_log_tail_lines() -> usize {
    100
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            hint_after: default_hint_after(),
            log_tail_lines: default_log_tail_lines(),
        }
    }
}

/// `[component.<name>]`: exactly one of the kind tables must be set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComponentConfig {
    #[serde(default)]
    pub container: Option<ContainerComponent>,
    #[serde(default)]
    pub kubernetes: Option<ManifestComponent>,
    #[serde(default)]
    pub openshift: Option<ManifestComponent>,
    #[serde(default)]
    pub image: Option<ImageComponent>,
}

/// Borrowed view of a component's single kind.
#[derive(Debug, Clone, Copy)]
pub enum ComponentKind<'a> {
    Container(&'a ContainerComponent),
    Kubernetes(&'a ManifestComponent),
    Openshift(&'a ManifestComponent),
    Image(&'a ImageComponent),
}

impl ComponentConfig {
    /// Returns the component's kind, or `None` if zero or several are set.
    pub fn kind(&self) -> Option<ComponentKind<'_>> {
        let mut kinds = Vec::with_capacity(1);
        if let Some(c) = &self.container {
            kinds.push(ComponentKind::Container(c));
        }
        if let Some(k) = &self.kubernetes {
            kinds.push(ComponentKind::Kubernetes(k));
        }
        if let Some(o) = &self.openshift {
            kinds.push(ComponentKind::Openshift(o));
        }
        if let Some(i) = &self.image {
            kinds.push(ComponentKind::Image(i));
        }
        if kinds.len() == 1 { kinds.pop() } else { None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerComponent {
    #[serde(default)]
    pub image: String,

    /// Whether project sources are synced into this container.
    #[serde(default = "default_true")]
    pub mount_sources: bool,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

/// Kubernetes / OpenShift manifest, either inlined or read from a file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestComponent {
    #[serde(default)]
    pub inlined: Option<String>,
    /// Path relative to the config file.
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageComponent {
    pub image_name: String,
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    #[serde(default = "default_context")]
    pub context: String,
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

fn default_context() -> String {
    ".".to_string()
}

/// `[command.<id>]`: exactly one of `exec`, `apply`, `composite`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandConfig {
    #[serde(default)]
    pub exec: Option<ExecCommand>,
    #[serde(default)]
    pub apply: Option<ApplyCommand>,
    #[serde(default)]
    pub composite: Option<CompositeCommand>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecCommand {
    pub component: String,
    pub command_line: String,
    #[serde(default)]
    pub working_dir: Option<String>,
    /// Ordered `[["KEY", "value"], ...]` pairs.
    #[serde(default)]
    pub env: Vec<(String, String)>,
    #[serde(default)]
    pub group: Option<GroupKind>,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub hot_reload_capable: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplyCommand {
    pub component: String,
    #[serde(default)]
    pub group: Option<GroupKind>,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompositeCommand {
    pub commands: Vec<String>,
    #[serde(default)]
    pub group: Option<GroupKind>,
    #[serde(default)]
    pub default: bool,
}

/// Borrowed view of a command's single kind.
#[derive(Debug, Clone, Copy)]
pub enum CommandKind<'a> {
    Exec(&'a ExecCommand),
    Apply(&'a ApplyCommand),
    Composite(&'a CompositeCommand),
}

impl CommandConfig {
    /// Returns the command's kind; errors if zero or several kinds are set.
    pub fn kind(&self, id: &str) -> Result<CommandKind<'_>> {
        match (&self.exec, &self.apply, &self.composite) {
            (Some(e), None, None) => Ok(CommandKind::Exec(e)),
            (None, Some(a), None) => Ok(CommandKind::Apply(a)),
            (None, None, Some(c)) => Ok(CommandKind::Composite(c)),
            _ => Err(DevloopError::CommandKind { id: id.to_string() }),
        }
    }

    pub fn group(&self) -> Option<GroupKind> {
        self.exec
            .as_ref()
            .and_then(|e| e.group)
            .or_else(|| self.apply.as_ref().and_then(|a| a.group))
            .or_else(|| self.composite.as_ref().and_then(|c| c.group))
    }

    pub fn is_default(&self) -> bool {
        self.exec.as_ref().is_some_and(|e| e.default)
            || self.apply.as_ref().is_some_and(|a| a.default)
            || self.composite.as_ref().is_some_and(|c| c.default)
    }
}
