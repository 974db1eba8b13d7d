// src/engine/session.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::BoxFuture;
use crate::cluster::template::component_selector;
use crate::config::model::ConfigFile;
use crate::devfile::walker::{run_plan, CommandWalker};
use crate::engine::sync::FileSync;
use crate::errors::Result;
use crate::handler::{ExecContext, HandlerDeps, RunHandler};
use crate::types::{GroupKind, RunMode};
use crate::ui::Spinner;
use crate::watch::state::PendingPush;
use crate::watch::watcher::Pusher;

/// One development session: every push syncs files and re-runs the build
/// and run (or debug) commands.
pub struct DevSession {
    cfg: Arc<ConfigFile>,
    deps: HandlerDeps,
    root: PathBuf,
    run_mode: RunMode,
    component_exists: AtomicBool,
}

impl DevSession {
    pub fn new(cfg: Arc<ConfigFile>, deps: HandlerDeps, root: impl Into<PathBuf>, run_mode: RunMode) -> Self {
        Self {
            cfg,
            deps,
            root: root.into(),
            run_mode,
            component_exists: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Push the whole project.
    pub async fn initial_push(&self) -> Result<()> {
        let batch = PendingPush {
            changed: vec![self.root.clone()],
            deleted: Vec::new(),
        };
        self.push_batch(&batch).await
    }

    pub async fn push_batch(&self, batch: &PendingPush) -> Result<()> {
        let project = &self.cfg.project;
        let selector = component_selector(&project.component, &project.application);
        let pod = self.deps.cluster.running_pod(&selector).await?;

        // Restart or hot-reload only once a run step has started on a live pod.
        let component_exists = self.component_exists.load(Ordering::SeqCst);

        let ctx = match &pod {
            Some(pod) => {
                let spinner = Spinner::start(&self.deps.console, "Syncing files into the container");
                FileSync {
                    cfg: &self.cfg,
                    root: &self.root,
                    cluster: self.deps.cluster.as_ref(),
                    exec: self.deps.exec.as_ref(),
                }
                .sync(pod, batch)
                .await?;
                spinner.finish(true);

                ExecContext {
                    pod_name: Some(pod.name.clone()),
                    component_exists,
                    containers_running: pod.running_containers.clone(),
                }
            }
            None => {
                info!(%selector, "no running pod; commands will run in jobs");
                ExecContext {
                    component_exists,
                    ..ExecContext::default()
                }
            }
        };
        debug!(?ctx, "push context");

        let handler = RunHandler::new(self.cfg.clone(), self.deps.clone(), ctx);
        let walker = CommandWalker::new(&self.cfg);

        let build = walker.plan_group(GroupKind::Build)?;
        run_plan(&build, &handler).await?;

        let run = walker.plan_group(self.run_mode.group())?;
        run_plan(&run, &handler).await?;

        if pod.is_some() {
            self.component_exists.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Pusher for DevSession {
    fn push<'a>(&'a self, batch: &'a PendingPush) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.push_batch(batch))
    }
}
