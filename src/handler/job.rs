// src/handler/job.rs

//! Execute a command to completion in a throwaway Job.
//!
//! Used when the command's container is not part of the live workload. The
//! Job runs a pod holding only that container, with the same shell line an
//! in-place exec would use, and is deleted once it finished.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::cluster::client::{ClusterClient, JobOutcome};
use crate::cluster::manifest::{JobManifest, JobSpec, ObjectMeta, PodTemplate};
use crate::cluster::template::{
    apply_security_level, component_labels, component_selector, pod_template_for_container,
};
use crate::config::model::ConfigFile;
use crate::devfile::command::ResolvedCommand;
use crate::errors::{DevloopError, Result};
use crate::ui::{display_log_tail, Console, Spinner};

/// Kubernetes object name limit.
pub const MAX_OBJECT_NAME_LEN: usize = 63;

const JOB_TTL_SECONDS: u32 = 60;
const JOB_BACKOFF_LIMIT: u32 = 1;

/// Deterministic Job name for `(component, app, command_id)`.
///
/// The `component-app` prefix is lowercased, reduced to `[a-z0-9-]` and cut
/// so the whole name fits [`MAX_OBJECT_NAME_LEN`]; the command id is always
/// kept verbatim at the end.
pub fn job_name(component: &str, app: &str, command_id: &str) -> Result<String> {
    if command_id.is_empty() || command_id.len() > MAX_OBJECT_NAME_LEN {
        return Err(DevloopError::ConfigError(format!(
            "command id '{}' cannot be used in a Job name (1..={} characters)",
            command_id, MAX_OBJECT_NAME_LEN
        )));
    }

    let budget = MAX_OBJECT_NAME_LEN.saturating_sub(command_id.len() + 1);
    let prefix: String = sanitize_name(&format!("{component}-{app}"))
        .chars()
        .take(budget)
        .collect();
    let prefix = prefix.trim_end_matches('-');

    if prefix.is_empty() {
        Ok(command_id.to_string())
    } else {
        Ok(format!("{prefix}-{command_id}"))
    }
}

fn sanitize_name(s: &str) -> String {
    let mapped: String = s
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    mapped.trim_start_matches('-').to_string()
}

#[derive(Clone)]
pub struct NewContainerExecutor {
    cfg: Arc<ConfigFile>,
    cluster: Arc<dyn ClusterClient>,
    console: Console,
}

impl NewContainerExecutor {
    pub fn new(cfg: Arc<ConfigFile>, cluster: Arc<dyn ClusterClient>, console: Console) -> Self {
        Self {
            cfg,
            cluster,
            console,
        }
    }

    /// Pod template for the Job: the command's container only, never
    /// restarted, entrypoint replaced by the command's shell line.
    pub async fn job_template(&self, cmd: &ResolvedCommand) -> Result<PodTemplate> {
        let mut template = pod_template_for_container(&self.cfg, &cmd.component)?;
        template.spec.restart_policy = "Never".to_string();

        let automount = self
            .cluster
            .automount_volumes()
            .await
            .map_err(|e| e.context("listing automount volumes"))?;

        for container in template.spec.containers.iter_mut() {
            container.command = cmd.definition.exec_argv();
            container.args.clear();
            container
                .volume_mounts
                .extend(automount.iter().map(|v| v.mount()));
        }
        template
            .spec
            .volumes
            .extend(automount.into_iter().map(|v| v.volume));

        let level = self
            .cluster
            .pod_security_level()
            .await
            .map_err(|e| e.context("reading namespace pod security level"))?;
        apply_security_level(&mut template, level);

        Ok(template)
    }

    pub async fn execute(&self, cmd: &ResolvedCommand) -> Result<()> {
        let project = &self.cfg.project;
        let name = job_name(&project.component, &project.application, cmd.id())?;
        let template = self.job_template(cmd).await?;

        self.delete_previous_jobs(&name).await;

        let job = JobManifest {
            api_version: "batch/v1".to_string(),
            kind: "Job".to_string(),
            metadata: ObjectMeta {
                name: Some(name.clone()),
                labels: component_labels(&project.component, &project.application),
                annotations: Default::default(),
            },
            spec: JobSpec {
                completion_mode: "Indexed".to_string(),
                ttl_seconds_after_finished: JOB_TTL_SECONDS,
                backoff_limit: JOB_BACKOFF_LIMIT,
                template,
            },
        };

        let spinner = Spinner::start(
            &self.console,
            format!(
                "Executing command '{}' in a new '{}' container",
                cmd.id(),
                cmd.component
            ),
        );

        self.cluster.create_job(&job).await?;
        let outcome = self.wait_with_hint(&name).await;

        let result = match outcome {
            Ok(JobOutcome::Succeeded) => {
                spinner.finish(true);
                Ok(())
            }
            Ok(JobOutcome::Failed) => {
                spinner.finish(false);
                error!(command = %cmd.id(), job = %name, "job failed");
                self.show_job_logs(&name, &cmd.component).await;
                Err(DevloopError::JobFailed {
                    id: cmd.id().to_string(),
                    job: name.clone(),
                })
            }
            Err(err) => {
                spinner.finish(false);
                Err(DevloopError::Exec {
                    command: cmd.id().to_string(),
                    container: cmd.component.clone(),
                    source: err.context(format!("waiting for job '{name}'")),
                })
            }
        };

        if let Err(err) = self.cluster.delete_job(&name).await {
            debug!(job = %name, error = %err, "failed to delete finished job");
        }

        result
    }

    /// Remove Jobs left over from earlier runs of the same command.
    async fn delete_previous_jobs(&self, name: &str) {
        let project = &self.cfg.project;
        let selector = component_selector(&project.component, &project.application);

        let existing = match self.cluster.list_jobs(&selector).await {
            Ok(names) => names,
            Err(err) => {
                debug!(%selector, error = %err, "failed to list jobs");
                return;
            }
        };

        for existing in existing.iter().filter(|j| j.contains(name)) {
            match self.cluster.delete_job(existing).await {
                Ok(()) => debug!(job = %existing, "deleted previous job"),
                Err(err) => debug!(job = %existing, error = %err, "failed to delete previous job"),
            }
        }
    }

    /// Wait for the Job; print a one-time hint if it takes a while.
    async fn wait_with_hint(&self, name: &str) -> anyhow::Result<JobOutcome> {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let hint = spawn_hint(
            self.console.clone(),
            self.cfg.timings.hint_after,
            format!(
                "Still running. Follow its output with `{} logs -f job/{}`",
                self.cfg.project.kubectl, name
            ),
            done_rx,
        );

        let outcome = self.cluster.wait_for_job(name).await;

        // The hint task ends as soon as it sees the signal or the sender drop.
        let _ = done_tx.send(());
        if let Err(err) = hint.await {
            debug!(error = %err, "hint task ended abnormally");
        }
        outcome
    }

    async fn show_job_logs(&self, name: &str, container: &str) {
        match self.cluster.job_logs(name, container).await {
            Ok(logs) => display_log_tail(
                &self.console,
                &format!("Last lines of job '{name}'"),
                &logs,
                self.cfg.executor.log_tail_lines,
            ),
            Err(err) => debug!(job = %name, error = %err, "failed to fetch job logs"),
        }
    }
}

fn spawn_hint(
    console: Console,
    after: Duration,
    message: String,
    done: oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = done => {}
            _ = sleep(after) => {
                info!("job still running after {:?}", after);
                console.line(message);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_are_not_truncated() {
        assert_eq!(job_name("nodejs", "app", "build").unwrap(), "nodejs-app-build");
    }

    #[test]
    fn long_prefix_is_cut_and_id_kept() {
        let component = "a".repeat(60);
        let name = job_name(&component, "app", "install-deps").unwrap();
        assert_eq!(name.len(), MAX_OBJECT_NAME_LEN);
        assert!(name.ends_with("-install-deps"));
    }

    #[test]
    fn prefix_never_ends_with_separator() {
        // Cut lands right after the '-' between component and app.
        let component = "c".repeat(50);
        let id = "x".repeat(11);
        let name = job_name(&component, "app", &id).unwrap();
        assert_eq!(name, format!("{component}-{id}"));
    }

    #[test]
    fn invalid_characters_become_dashes() {
        assert_eq!(job_name("My_Comp", "App", "run").unwrap(), "my-comp-app-run");
    }

    #[test]
    fn oversized_id_is_rejected() {
        assert!(job_name("c", "a", &"x".repeat(64)).is_err());
    }

    #[tokio::test]
    async fn hint_is_printed_once_after_delay() {
        let (console, buffer) = Console::buffer();
        let (tx, rx) = oneshot::channel();
        let handle = spawn_hint(console, Duration::from_millis(10), "hint".to_string(), rx);

        sleep(Duration::from_millis(50)).await;
        let _ = tx.send(());
        handle.await.unwrap();

        assert_eq!(buffer.contents().matches("hint").count(), 1);
    }

    #[tokio::test]
    async fn hint_is_skipped_when_done_first() {
        let (console, buffer) = Console::buffer();
        let (tx, rx) = oneshot::channel();
        let handle = spawn_hint(console, Duration::from_secs(60), "hint".to_string(), rx);

        tx.send(()).unwrap();
        handle.await.unwrap();

        assert!(buffer.contents().is_empty());
    }
}
