// src/handler/mod.rs

//! Command handler: turns walked commands into side effects.
//!
//! - [`run`] holds [`RunHandler`], the production [`CommandHandler`].
//! - [`policy`] decides start / restart / leave-alone for run commands.
//! - [`job`] executes commands to completion in a throwaway Job.
//! - [`apply`] handles image and manifest apply commands.

pub mod apply;
pub mod job;
pub mod policy;
pub mod run;

use std::collections::BTreeSet;

use crate::BoxFuture;
use crate::devfile::command::ResolvedCommand;
use crate::errors::Result;

pub use job::{job_name, NewContainerExecutor, MAX_OBJECT_NAME_LEN};
pub use policy::{restart_action, RestartAction};
pub use run::{HandlerDeps, RunHandler};

/// What the handler knows about the live workload for one command sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecContext {
    /// Pod currently running the component, if any.
    pub pod_name: Option<String>,
    /// Whether the component was already running before this push.
    pub component_exists: bool,
    /// Containers of `pod_name` that are up.
    pub containers_running: BTreeSet<String>,
}

impl ExecContext {
    /// Pod name when `container` is live in it.
    pub fn live_pod_for(&self, container: &str) -> Option<&str> {
        match &self.pod_name {
            Some(pod) if self.containers_running.contains(container) => Some(pod),
            _ => None,
        }
    }
}

/// Capability set invoked by the command walker, one method per command shape.
pub trait CommandHandler: Send + Sync {
    fn apply_image<'a>(&'a self, id: &'a str, component: &'a str) -> BoxFuture<'a, Result<()>>;

    fn apply_kubernetes<'a>(
        &'a self,
        id: &'a str,
        component: &'a str,
        manifest: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    fn apply_openshift<'a>(
        &'a self,
        id: &'a str,
        component: &'a str,
        manifest: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    /// Run/Debug commands expected to stay alive.
    fn execute_non_terminating_command<'a>(
        &'a self,
        cmd: &'a ResolvedCommand,
    ) -> BoxFuture<'a, Result<()>>;

    /// Build and other one-shot commands.
    fn execute_terminating_command<'a>(
        &'a self,
        cmd: &'a ResolvedCommand,
    ) -> BoxFuture<'a, Result<()>>;

    fn is_remote_process_for_command_running<'a>(
        &'a self,
        cmd: &'a ResolvedCommand,
        pod: &'a str,
    ) -> BoxFuture<'a, Result<bool>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_pod_requires_running_container() {
        let ctx = ExecContext {
            pod_name: Some("web-1".to_string()),
            component_exists: true,
            containers_running: BTreeSet::from(["runtime".to_string()]),
        };
        assert_eq!(ctx.live_pod_for("runtime"), Some("web-1"));
        assert_eq!(ctx.live_pod_for("tools"), None);
        assert_eq!(ExecContext::default().live_pod_for("runtime"), None);
    }
}
