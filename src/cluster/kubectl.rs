// src/cluster/kubectl.rs

//! `kubectl`-backed cluster client and platform.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::BoxFuture;
use crate::cluster::client::{ClusterClient, JobOutcome, Platform, RunningPod};
use crate::cluster::manifest::{AutomountVolume, JobManifest, Volume, VolumeSource};
use crate::config::model::ImageComponent;
use crate::errors::DevloopError;
use crate::exec::Kubectl;
use crate::types::PodSecurityLevel;

pub const AUTOMOUNT_LABEL: &str = "devfile.io/auto-mount=true";
pub const MOUNT_PATH_ANNOTATION: &str = "devfile.io/mount-path";
pub const ENFORCE_LABEL: &str = "pod-security.kubernetes.io/enforce";

const JOB_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct KubectlCluster {
    kubectl: Kubectl,
    image_builder: Option<String>,
}

impl KubectlCluster {
    pub fn new(kubectl: Kubectl, image_builder: Option<String>) -> Self {
        Self {
            kubectl,
            image_builder,
        }
    }

    async fn get_json(&self, args: &[&str]) -> Result<Value> {
        let mut full: Vec<String> = vec!["get".to_string()];
        full.extend(args.iter().map(|s| s.to_string()));
        full.push("-o".to_string());
        full.push("json".to_string());

        let stdout = self.kubectl.run_checked(&full, None).await?;
        serde_json::from_slice(&stdout).context("parsing kubectl JSON output")
    }

    async fn current_namespace(&self) -> Result<String> {
        if let Some(ns) = &self.kubectl.namespace {
            return Ok(ns.clone());
        }
        let args = [
            "config".to_string(),
            "view".to_string(),
            "--minify".to_string(),
            "-o".to_string(),
            "jsonpath={..namespace}".to_string(),
        ];
        let stdout = self.kubectl.run_checked(&args, None).await?;
        let ns = String::from_utf8_lossy(&stdout).trim().to_string();
        Ok(if ns.is_empty() { "default".to_string() } else { ns })
    }
}

impl ClusterClient for KubectlCluster {
    fn list_jobs<'a>(&'a self, selector: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let json = self.get_json(&["jobs", "-l", selector]).await?;
            Ok(parse_item_names(&json))
        })
    }

    fn create_job<'a>(&'a self, job: &'a JobManifest) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let body = serde_json::to_vec(job).context("serializing job")?;
            let args = ["create".to_string(), "-f".to_string(), "-".to_string()];
            self.kubectl.run_checked(&args, Some(body)).await?;
            info!(job = %job.name(), "job created");
            Ok(())
        })
    }

    fn delete_job<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let args = [
                "delete".to_string(),
                "job".to_string(),
                name.to_string(),
                "--ignore-not-found".to_string(),
                "--cascade=background".to_string(),
            ];
            self.kubectl.run_checked(&args, None).await?;
            debug!(job = %name, "job deleted");
            Ok(())
        })
    }

    fn wait_for_job<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<JobOutcome>> {
        Box::pin(async move {
            loop {
                let json = self.get_json(&["job", name]).await?;
                if let Some(outcome) = parse_job_outcome(&json) {
                    return Ok(outcome);
                }
                sleep(JOB_POLL_INTERVAL).await;
            }
        })
    }

    fn job_logs<'a>(&'a self, name: &'a str, container: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            let args = [
                "logs".to_string(),
                format!("job/{name}"),
                "-c".to_string(),
                container.to_string(),
            ];
            self.kubectl.run_checked(&args, None).await
        })
    }

    fn automount_volumes(&self) -> BoxFuture<'_, Result<Vec<AutomountVolume>>> {
        Box::pin(async move {
            let json = self
                .get_json(&["configmaps,secrets,pvc", "-l", AUTOMOUNT_LABEL])
                .await?;
            Ok(parse_automount_volumes(&json))
        })
    }

    fn pod_security_level(&self) -> BoxFuture<'_, Result<PodSecurityLevel>> {
        Box::pin(async move {
            let ns = self.current_namespace().await?;
            let json = self.get_json(&["namespace", &ns]).await?;
            Ok(parse_security_level(&json))
        })
    }

    fn running_pod<'a>(&'a self, selector: &'a str) -> BoxFuture<'a, Result<Option<RunningPod>>> {
        Box::pin(async move {
            let json = self.get_json(&["pods", "-l", selector]).await?;
            Ok(parse_running_pod(&json))
        })
    }

    fn copy_to_pod<'a>(
        &'a self,
        pod: &'a str,
        container: &'a str,
        local: &'a Path,
        remote: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let args = [
                "cp".to_string(),
                local.to_string_lossy().into_owned(),
                format!("{pod}:{remote}"),
                "-c".to_string(),
                container.to_string(),
            ];
            self.kubectl.run_checked(&args, None).await?;
            Ok(())
        })
    }
}

impl Platform for KubectlCluster {
    fn name(&self) -> &str {
        "kubernetes"
    }

    fn supports_apply_kubernetes(&self) -> bool {
        true
    }

    /// OpenShift objects need the `oc` client.
    fn supports_apply_openshift(&self) -> bool {
        Path::new(&self.kubectl.binary)
            .file_name()
            .is_some_and(|n| n == "oc")
    }

    fn supports_apply_image(&self) -> bool {
        self.image_builder.is_some()
    }

    fn apply_manifest<'a>(&'a self, manifest: &'a str) -> BoxFuture<'a, crate::errors::Result<()>> {
        Box::pin(async move {
            let args = ["apply".to_string(), "-f".to_string(), "-".to_string()];
            self.kubectl
                .run_checked(&args, Some(manifest.as_bytes().to_vec()))
                .await?;
            Ok(())
        })
    }

    fn build_image<'a>(
        &'a self,
        image: &'a ImageComponent,
        base_dir: &'a Path,
    ) -> BoxFuture<'a, crate::errors::Result<()>> {
        Box::pin(async move {
            let Some(builder) = &self.image_builder else {
                return Err(DevloopError::Unsupported(
                    "no image builder configured".to_string(),
                ));
            };

            let status = Command::new(builder)
                .arg("build")
                .arg("-t")
                .arg(&image.image_name)
                .arg("-f")
                .arg(base_dir.join(&image.dockerfile))
                .arg(base_dir.join(&image.context))
                .status()
                .await
                .with_context(|| format!("running '{builder} build'"))?;

            if !status.success() {
                return Err(DevloopError::Other(anyhow::anyhow!(
                    "'{} build' for image '{}' exited with code {}",
                    builder,
                    image.image_name,
                    status.code().unwrap_or(-1)
                )));
            }
            Ok(())
        })
    }
}

/// `metadata.name` of every element of `items`.
pub fn parse_item_names(json: &Value) -> Vec<String> {
    items(json)
        .filter_map(|item| item["metadata"]["name"].as_str().map(str::to_string))
        .collect()
}

/// `Some` once the Job has a success or failure recorded.
pub fn parse_job_outcome(job: &Value) -> Option<JobOutcome> {
    let status = &job["status"];
    if status["succeeded"].as_u64().unwrap_or(0) >= 1 {
        Some(JobOutcome::Succeeded)
    } else if status["failed"].as_u64().unwrap_or(0) >= 1 {
        Some(JobOutcome::Failed)
    } else {
        None
    }
}

/// First pod in phase `Running`, with its running containers.
pub fn parse_running_pod(json: &Value) -> Option<RunningPod> {
    items(json)
        .find(|pod| pod["status"]["phase"].as_str() == Some("Running"))
        .and_then(|pod| {
            let name = pod["metadata"]["name"].as_str()?.to_string();
            let running_containers: BTreeSet<String> = pod["status"]["containerStatuses"]
                .as_array()
                .map(|statuses| {
                    statuses
                        .iter()
                        .filter(|s| s["state"]["running"].is_object())
                        .filter_map(|s| s["name"].as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            Some(RunningPod {
                name,
                running_containers,
            })
        })
}

/// ConfigMaps, Secrets and PVCs to mount, with their mount paths.
pub fn parse_automount_volumes(json: &Value) -> Vec<AutomountVolume> {
    items(json)
        .filter_map(|item| {
            let name = item["metadata"]["name"].as_str()?.to_string();
            let annotated = item["metadata"]["annotations"][MOUNT_PATH_ANNOTATION]
                .as_str()
                .map(str::to_string);

            let (prefix, source, default_path, read_only) = match item["kind"].as_str()? {
                "ConfigMap" => (
                    "automount-cm",
                    VolumeSource::ConfigMap { name: name.clone() },
                    format!("/etc/config/{name}"),
                    true,
                ),
                "Secret" => (
                    "automount-secret",
                    VolumeSource::Secret {
                        secret_name: name.clone(),
                    },
                    format!("/etc/secret/{name}"),
                    true,
                ),
                "PersistentVolumeClaim" => (
                    "automount-pvc",
                    VolumeSource::PersistentVolumeClaim {
                        claim_name: name.clone(),
                    },
                    format!("/tmp/{name}"),
                    false,
                ),
                _ => return None,
            };

            Some(AutomountVolume {
                volume: Volume {
                    name: format!("{prefix}-{name}"),
                    source,
                },
                mount_path: annotated.unwrap_or(default_path),
                read_only,
            })
        })
        .collect()
}

pub fn parse_security_level(namespace: &Value) -> PodSecurityLevel {
    namespace["metadata"]["labels"][ENFORCE_LABEL]
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

fn items(json: &Value) -> impl Iterator<Item = &Value> {
    json["items"].as_array().into_iter().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_outcome_from_status_counters() {
        assert_eq!(
            parse_job_outcome(&json!({"status": {"succeeded": 1}})),
            Some(JobOutcome::Succeeded)
        );
        assert_eq!(
            parse_job_outcome(&json!({"status": {"failed": 1}})),
            Some(JobOutcome::Failed)
        );
        assert_eq!(parse_job_outcome(&json!({"status": {"active": 1}})), None);
    }

    #[test]
    fn running_pod_lists_only_running_containers() {
        let pods = json!({"items": [
            {"metadata": {"name": "old"}, "status": {"phase": "Succeeded"}},
            {"metadata": {"name": "web-123"}, "status": {
                "phase": "Running",
                "containerStatuses": [
                    {"name": "runtime", "state": {"running": {"startedAt": "now"}}},
                    {"name": "tools", "state": {"waiting": {"reason": "CrashLoopBackOff"}}}
                ]
            }}
        ]});

        let pod = parse_running_pod(&pods).unwrap();
        assert_eq!(pod.name, "web-123");
        assert_eq!(
            pod.running_containers.into_iter().collect::<Vec<_>>(),
            vec!["runtime".to_string()]
        );
    }

    #[test]
    fn automount_paths_default_by_kind_and_honour_annotation() {
        let objects = json!({"items": [
            {"kind": "ConfigMap", "metadata": {"name": "settings"}},
            {"kind": "Secret", "metadata": {"name": "creds",
                "annotations": {"devfile.io/mount-path": "/run/creds"}}},
            {"kind": "PersistentVolumeClaim", "metadata": {"name": "cache"}}
        ]});

        let volumes = parse_automount_volumes(&objects);
        let paths: Vec<&str> = volumes.iter().map(|v| v.mount_path.as_str()).collect();
        assert_eq!(paths, vec!["/etc/config/settings", "/run/creds", "/tmp/cache"]);
        assert!(!volumes[2].read_only);
    }

    #[test]
    fn security_level_defaults_to_privileged() {
        assert_eq!(parse_security_level(&json!({})), PodSecurityLevel::Privileged);
        let ns = json!({"metadata": {"labels": {"pod-security.kubernetes.io/enforce": "restricted"}}});
        assert_eq!(parse_security_level(&ns), PodSecurityLevel::Restricted);
    }
}
