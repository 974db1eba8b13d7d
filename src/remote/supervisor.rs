// src/remote/supervisor.rs

//! Start, stop and query long-running commands inside containers.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::BoxFuture;
use crate::devfile::command::{shell_argv, CommandDefinition};
use crate::errors::{DevloopError, Result};
use crate::exec::backend::{ExecClient, ExecOutput, ExecRequest};
use crate::remote::protocol::StatusFileProtocol;

/// Observed state of a supervised command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemoteProcessStatus {
    #[default]
    Unknown,
    Starting,
    Running,
    Stopped,
    Errored,
}

impl RemoteProcessStatus {
    /// Running, Stopped and Errored are final answers to "did it start".
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            RemoteProcessStatus::Running
                | RemoteProcessStatus::Stopped
                | RemoteProcessStatus::Errored
        )
    }
}

impl fmt::Display for RemoteProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemoteProcessStatus::Unknown => "unknown",
            RemoteProcessStatus::Starting => "starting",
            RemoteProcessStatus::Running => "running",
            RemoteProcessStatus::Stopped => "stopped",
            RemoteProcessStatus::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Invoked on status transitions reported by the supervisor.
pub type StatusCallback<'a> = &'a (dyn Fn(RemoteProcessStatus) + Send + Sync);

pub trait RemoteProcessSupervisor: Send + Sync {
    /// Launch `def` in the background of `container` and return once it was
    /// handed off. `on_status` receives `Starting` before the launch.
    fn start_process_for_command<'a>(
        &'a self,
        def: &'a CommandDefinition,
        pod: &'a str,
        container: &'a str,
        on_status: StatusCallback<'a>,
    ) -> BoxFuture<'a, Result<()>>;

    /// Stop the process tree started for `def`. Stopping something that is
    /// not running succeeds.
    fn stop_process_for_command<'a>(
        &'a self,
        def: &'a CommandDefinition,
        pod: &'a str,
        container: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    fn get_process_info_for_command<'a>(
        &'a self,
        def: &'a CommandDefinition,
        pod: &'a str,
        container: &'a str,
    ) -> BoxFuture<'a, Result<RemoteProcessStatus>>;

    /// Last `lines` lines of the command's combined output.
    fn fetch_output<'a>(
        &'a self,
        def: &'a CommandDefinition,
        pod: &'a str,
        container: &'a str,
        lines: usize,
    ) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// Supervisor that keeps pid/exit/log files in the container and drives
/// them with short shell scripts over the exec channel.
#[derive(Clone)]
pub struct StatusFileSupervisor {
    exec: Arc<dyn ExecClient>,
    protocol: StatusFileProtocol,
}

impl StatusFileSupervisor {
    pub fn new(exec: Arc<dyn ExecClient>, state_dir: impl Into<String>) -> Self {
        Self {
            exec,
            protocol: StatusFileProtocol::new(state_dir),
        }
    }

    async fn run_script(
        &self,
        def: &CommandDefinition,
        pod: &str,
        container: &str,
        script: String,
    ) -> Result<ExecOutput> {
        let request = ExecRequest::new(pod, container, shell_argv(script));
        let output = self
            .exec
            .execute(request)
            .await
            .map_err(|source| DevloopError::Exec {
                command: def.id.clone(),
                container: container.to_string(),
                source,
            })?;

        if !output.success() {
            return Err(DevloopError::Exec {
                command: def.id.clone(),
                container: container.to_string(),
                source: anyhow::anyhow!(
                    "supervisor script exited with code {}: {}",
                    output.exit_code,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(output)
    }
}

impl RemoteProcessSupervisor for StatusFileSupervisor {
    fn start_process_for_command<'a>(
        &'a self,
        def: &'a CommandDefinition,
        pod: &'a str,
        container: &'a str,
        on_status: StatusCallback<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            on_status(RemoteProcessStatus::Starting);
            let script = self.protocol.start_script(def);
            self.run_script(def, pod, container, script).await?;
            info!(command = %def.id, %pod, %container, "remote process started");
            Ok(())
        })
    }

    fn stop_process_for_command<'a>(
        &'a self,
        def: &'a CommandDefinition,
        pod: &'a str,
        container: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let script = self.protocol.stop_script(&def.id);
            self.run_script(def, pod, container, script).await?;
            debug!(command = %def.id, %pod, %container, "remote process stopped");
            Ok(())
        })
    }

    fn get_process_info_for_command<'a>(
        &'a self,
        def: &'a CommandDefinition,
        pod: &'a str,
        container: &'a str,
    ) -> BoxFuture<'a, Result<RemoteProcessStatus>> {
        Box::pin(async move {
            let script = self.protocol.status_script(&def.id);
            let output = self.run_script(def, pod, container, script).await?;
            let status = StatusFileProtocol::parse_status(&output.stdout_str());
            debug!(command = %def.id, %status, "remote process status");
            Ok(status)
        })
    }

    fn fetch_output<'a>(
        &'a self,
        def: &'a CommandDefinition,
        pod: &'a str,
        container: &'a str,
        lines: usize,
    ) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            let script = self.protocol.tail_script(&def.id, lines);
            let output = self.run_script(def, pod, container, script).await?;
            Ok(output.stdout)
        })
    }
}
