// src/devfile/command.rs

//! Resolved command types and shell line construction.

use crate::types::GroupKind;

/// Shell used for every command line, in-place or in a Job.
pub const SHELL: &str = "/bin/sh";

/// A single exec command as the engine sees it.
///
/// Identity is `id`. Built fresh from config for each invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDefinition {
    pub id: String,
    pub working_dir: String,
    /// Exported in order before the command runs.
    pub env_vars: Vec<(String, String)>,
    pub cmd_line: String,
}

impl CommandDefinition {
    pub fn new(id: impl Into<String>, cmd_line: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            working_dir: String::new(),
            env_vars: Vec::new(),
            cmd_line: cmd_line.into(),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// The line handed to `sh -c`: exports, then `cd`, then the command.
    pub fn shell_line(&self) -> String {
        let mut parts = Vec::with_capacity(3);

        if !self.env_vars.is_empty() {
            let assignments: Vec<String> = self
                .env_vars
                .iter()
                .map(|(k, v)| format!("{}={}", k, shell_quote(v)))
                .collect();
            parts.push(format!("export {}", assignments.join(" ")));
        }

        if !self.working_dir.is_empty() {
            parts.push(format!("cd {}", self.working_dir));
        }

        parts.push(self.cmd_line.clone());
        parts.join(" && ")
    }

    /// Full argv for the exec channel.
    pub fn exec_argv(&self) -> Vec<String> {
        shell_argv(self.shell_line())
    }
}

/// `["/bin/sh", "-c", line]`.
pub fn shell_argv(line: impl Into<String>) -> Vec<String> {
    vec![SHELL.to_string(), "-c".to_string(), line.into()]
}

/// Single-quote a value for POSIX sh.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// An exec command together with what the walker knows about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub definition: CommandDefinition,
    /// Target container component.
    pub component: String,
    pub group: Option<GroupKind>,
    pub hot_reload_capable: bool,
}

impl ResolvedCommand {
    pub fn id(&self) -> &str {
        &self.definition.id
    }
}
