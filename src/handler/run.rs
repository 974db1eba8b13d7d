// src/handler/run.rs

//! The production [`CommandHandler`].

use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use crate::BoxFuture;
use crate::cluster::client::{ClusterClient, Platform};
use crate::config::model::ConfigFile;
use crate::devfile::command::ResolvedCommand;
use crate::errors::{DevloopError, Result};
use crate::exec::backend::{ExecClient, ExecRequest};
use crate::handler::apply;
use crate::handler::job::NewContainerExecutor;
use crate::handler::policy::{restart_action, RestartAction};
use crate::handler::{CommandHandler, ExecContext};
use crate::remote::supervisor::{RemoteProcessStatus, RemoteProcessSupervisor};
use crate::retry::{Attempt, Retryable};
use crate::ui::{display_log_tail, Console, Spinner};

/// Collaborators shared by every handler of a session.
#[derive(Clone)]
pub struct HandlerDeps {
    pub exec: Arc<dyn ExecClient>,
    pub supervisor: Arc<dyn RemoteProcessSupervisor>,
    pub cluster: Arc<dyn ClusterClient>,
    pub platform: Arc<dyn Platform>,
    pub console: Console,
}

/// Handler for one command sequence against one [`ExecContext`].
pub struct RunHandler {
    cfg: Arc<ConfigFile>,
    deps: HandlerDeps,
    ctx: ExecContext,
    executor: NewContainerExecutor,
}

impl RunHandler {
    pub fn new(cfg: Arc<ConfigFile>, deps: HandlerDeps, ctx: ExecContext) -> Self {
        let executor =
            NewContainerExecutor::new(cfg.clone(), deps.cluster.clone(), deps.console.clone());
        Self {
            cfg,
            deps,
            ctx,
            executor,
        }
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    /// Start, restart or keep the remote process of a run command.
    async fn execute_run_command(&self, cmd: &ResolvedCommand, pod: &str) -> Result<()> {
        let def = &cmd.definition;
        let container = cmd.component.as_str();
        let supervisor = self.deps.supervisor.as_ref();

        match restart_action(self.ctx.component_exists, cmd.hot_reload_capable) {
            RestartAction::Keep => {
                info!(command = %def.id, "hot reload capable, leaving running process alone");
                return Ok(());
            }
            RestartAction::Restart => {
                debug!(command = %def.id, %pod, %container, "stopping previous instance");
                supervisor.stop_process_for_command(def, pod, container).await?;
            }
            RestartAction::Start => {}
        }

        let spinner: Mutex<Option<Spinner>> = Mutex::new(None);
        let console = self.deps.console.clone();
        let message = format!("Executing the application (command: {})", def.id);
        let on_status = |status: RemoteProcessStatus| {
            let mut slot = spinner.lock().unwrap_or_else(|e| e.into_inner());
            match status {
                RemoteProcessStatus::Starting => {
                    if slot.is_none() {
                        *slot = Some(Spinner::start(&console, message.as_str()));
                    }
                }
                RemoteProcessStatus::Running | RemoteProcessStatus::Stopped => {
                    if let Some(s) = slot.take() {
                        s.finish(true);
                    }
                }
                RemoteProcessStatus::Errored | RemoteProcessStatus::Unknown => {
                    if let Some(s) = slot.take() {
                        s.finish(false);
                    }
                }
            }
        };

        supervisor
            .start_process_for_command(def, pod, container, &on_status)
            .await?;

        let status = self.wait_for_status(cmd, pod).await;
        on_status(status);

        if !matches!(
            status,
            RemoteProcessStatus::Running | RemoteProcessStatus::Stopped
        ) {
            warn!(command = %def.id, %status, "application did not start");
            self.deps.console.line(format!(
                "Devfile command '{}' exited with an error status in container '{}'",
                def.id, container
            ));
            self.show_process_output(cmd, pod).await;
        }
        Ok(())
    }

    /// Poll the supervisor until the process settles or the schedule runs out.
    async fn wait_for_status(&self, cmd: &ResolvedCommand, pod: &str) -> RemoteProcessStatus {
        let supervisor = self.deps.supervisor.as_ref();
        let def = &cmd.definition;
        let container = cmd.component.as_str();

        let result = Retryable::new(format!("status of command '{}'", def.id), move || async move {
            match supervisor
                .get_process_info_for_command(def, pod, container)
                .await
            {
                Ok(status) => Attempt {
                    done: status.is_settled(),
                    outcome: Ok(status),
                },
                Err(err) => Attempt::pending(Err(anyhow::Error::from(err))),
            }
        })
        .retry_with_schedule(&self.cfg.timings.status_schedule)
        .await;

        match result {
            Ok(status) => status,
            Err(err) => {
                warn!(command = %def.id, error = %err, "could not determine process status");
                RemoteProcessStatus::Unknown
            }
        }
    }

    async fn show_process_output(&self, cmd: &ResolvedCommand, pod: &str) {
        let lines = self.cfg.executor.log_tail_lines;
        match self
            .deps
            .supervisor
            .fetch_output(&cmd.definition, pod, &cmd.component, lines)
            .await
        {
            Ok(output) => display_log_tail(
                &self.deps.console,
                &format!("Last {} lines of '{}'", lines, cmd.id()),
                &output,
                lines,
            ),
            Err(err) => debug!(command = %cmd.id(), error = %err, "failed to fetch output"),
        }
    }

    /// Run a one-shot command in a live container and wait for it.
    async fn execute_in_place(&self, cmd: &ResolvedCommand, pod: &str) -> Result<()> {
        let def = &cmd.definition;
        let group = cmd
            .group
            .map(|g| g.to_string())
            .unwrap_or_else(|| "exec".to_string());
        let spinner = Spinner::start(
            &self.deps.console,
            format!("Executing {} command '{}' on container '{}'", group, def.id, cmd.component),
        );

        let request = ExecRequest::new(pod, &cmd.component, def.exec_argv()).show_output(true);
        let output = self
            .deps
            .exec
            .execute(request)
            .await
            .map_err(|source| DevloopError::Exec {
                command: def.id.clone(),
                container: cmd.component.clone(),
                source,
            })?;

        if output.success() {
            spinner.finish(true);
            return Ok(());
        }

        spinner.finish(false);
        error!(command = %def.id, exit_code = output.exit_code, "command failed");
        display_log_tail(
            &self.deps.console,
            &format!("Output of '{}'", def.id),
            &output.combined(),
            self.cfg.executor.log_tail_lines,
        );
        Err(DevloopError::CommandFailed {
            id: def.id.clone(),
            exit_code: output.exit_code,
        })
    }

    fn skip_unsupported(&self, id: &str, result: Result<()>) -> Result<()> {
        match result {
            Err(err) if err.is_unsupported() => {
                warn!(command = %id, reason = %err, "skipping command");
                Ok(())
            }
            other => other,
        }
    }
}

impl CommandHandler for RunHandler {
    fn apply_image<'a>(&'a self, id: &'a str, component: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let result =
                apply::apply_image(self.deps.platform.as_ref(), &self.cfg, id, component).await;
            self.skip_unsupported(id, result)
        })
    }

    fn apply_kubernetes<'a>(
        &'a self,
        id: &'a str,
        component: &'a str,
        manifest: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let result =
                apply::apply_kubernetes(self.deps.platform.as_ref(), id, component, manifest).await;
            self.skip_unsupported(id, result)
        })
    }

    fn apply_openshift<'a>(
        &'a self,
        id: &'a str,
        component: &'a str,
        manifest: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let result =
                apply::apply_openshift(self.deps.platform.as_ref(), id, component, manifest).await;
            self.skip_unsupported(id, result)
        })
    }

    fn execute_non_terminating_command<'a>(
        &'a self,
        cmd: &'a ResolvedCommand,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match self.ctx.live_pod_for(&cmd.component) {
                Some(pod) => self.execute_run_command(cmd, pod).await,
                None => {
                    debug!(command = %cmd.id(), container = %cmd.component, "container not running, using a job");
                    self.executor.execute(cmd).await
                }
            }
        })
    }

    fn execute_terminating_command<'a>(
        &'a self,
        cmd: &'a ResolvedCommand,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match self.ctx.live_pod_for(&cmd.component) {
                Some(pod) => self.execute_in_place(cmd, pod).await,
                None => {
                    debug!(command = %cmd.id(), container = %cmd.component, "container not running, using a job");
                    self.executor.execute(cmd).await
                }
            }
        })
    }

    fn is_remote_process_for_command_running<'a>(
        &'a self,
        cmd: &'a ResolvedCommand,
        pod: &'a str,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let status = self
                .deps
                .supervisor
                .get_process_info_for_command(&cmd.definition, pod, &cmd.component)
                .await?;
            Ok(status == RemoteProcessStatus::Running)
        })
    }
}
