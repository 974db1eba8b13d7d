// src/engine/sync.rs

//! Copy changed files into running containers and remove deleted ones.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::cluster::client::{ClusterClient, RunningPod};
use crate::config::model::ConfigFile;
use crate::devfile::command::{shell_argv, shell_quote};
use crate::errors::{DevloopError, Result};
use crate::exec::backend::{ExecClient, ExecRequest};
use crate::watch::path_utils::relative_str;
use crate::watch::state::PendingPush;

/// Where a local path lands under the sync target.
pub fn remote_path(root: &Path, sync_target: &str, local: &Path) -> Option<String> {
    let target = sync_target.trim_end_matches('/');
    if local == root {
        return Some(match root.file_name() {
            Some(name) if root.is_file() => format!("{target}/{}", name.to_string_lossy()),
            _ => target.to_string(),
        });
    }
    let rel = relative_str(root, local)?;
    Some(format!("{target}/{rel}"))
}

/// Containers of `pod` that receive the project sources.
pub fn sync_containers<'a>(cfg: &ConfigFile, pod: &'a RunningPod) -> Vec<&'a str> {
    pod.running_containers
        .iter()
        .filter(|name| cfg.container(name).is_some_and(|c| c.mount_sources))
        .map(String::as_str)
        .collect()
}

pub struct FileSync<'a> {
    pub cfg: &'a ConfigFile,
    pub root: &'a Path,
    pub cluster: &'a dyn ClusterClient,
    pub exec: &'a dyn ExecClient,
}

impl FileSync<'_> {
    pub async fn sync(&self, pod: &RunningPod, batch: &PendingPush) -> Result<()> {
        let target = self.cfg.project.sync_target.as_str();

        for container in sync_containers(self.cfg, pod) {
            for local in &batch.changed {
                if !local.exists() {
                    debug!(?local, "changed path is gone; skipping copy");
                    continue;
                }
                let Some(remote) = remote_path(self.root, target, local) else {
                    debug!(?local, "path outside the watch root; skipping");
                    continue;
                };
                let source = copy_source(self.root, local);
                debug!(?source, %remote, %container, "copying");
                self.cluster
                    .copy_to_pod(&pod.name, container, &source, &remote)
                    .await?;
            }

            let removed: Vec<String> = batch
                .deleted
                .iter()
                .filter_map(|p| remote_path(self.root, target, p))
                .collect();
            if !removed.is_empty() {
                self.remove_remote(&pod.name, container, &removed).await?;
            }

            info!(
                pod = %pod.name,
                %container,
                copied = batch.changed.len(),
                removed = removed.len(),
                "files synced"
            );
        }
        Ok(())
    }

    async fn remove_remote(&self, pod: &str, container: &str, paths: &[String]) -> Result<()> {
        let quoted: Vec<String> = paths.iter().map(|p| shell_quote(p)).collect();
        let line = format!("rm -rf {}", quoted.join(" "));
        let output = self
            .exec
            .execute(ExecRequest::new(pod, container, shell_argv(line)))
            .await
            .map_err(|source| DevloopError::Exec {
                command: "sync".to_string(),
                container: container.to_string(),
                source,
            })?;

        if !output.success() {
            return Err(DevloopError::Exec {
                command: "sync".to_string(),
                container: container.to_string(),
                source: anyhow::anyhow!(
                    "removing files exited with code {}",
                    output.exit_code
                ),
            });
        }
        Ok(())
    }
}

/// A directory root is copied by content so it lands on the target itself.
fn copy_source(root: &Path, local: &Path) -> PathBuf {
    if local == root && root.is_dir() {
        root.join(".")
    } else {
        local.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_paths_mirror_the_tree() {
        let root = Path::new("/work/app");
        assert_eq!(
            remote_path(root, "/projects/", Path::new("/work/app/src/index.js")).as_deref(),
            Some("/projects/src/index.js")
        );
        assert_eq!(
            remote_path(root, "/projects", Path::new("/elsewhere/x")),
            None
        );
    }
}
