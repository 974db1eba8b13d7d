// src/cluster/client.rs

//! Cluster-side collaborators.
//!
//! [`ClusterClient`] covers the object operations the engine needs (Jobs,
//! logs, automount volumes, namespace policy, pod lookup, file copy).
//! [`Platform`] describes what the target platform can apply; callers ask
//! the capability methods instead of inspecting concrete client types.

use std::collections::BTreeSet;
use std::path::Path;

use crate::BoxFuture;
use crate::cluster::manifest::{AutomountVolume, JobManifest};
use crate::config::model::ImageComponent;
use crate::errors::Result;
use crate::types::PodSecurityLevel;

/// Terminal state of a Job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
}

/// The component's running pod and which of its containers are up.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunningPod {
    pub name: String,
    pub running_containers: BTreeSet<String>,
}

pub trait ClusterClient: Send + Sync {
    /// Names of Jobs matching a label selector.
    fn list_jobs<'a>(&'a self, selector: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<String>>>;

    fn create_job<'a>(&'a self, job: &'a JobManifest) -> BoxFuture<'a, anyhow::Result<()>>;

    fn delete_job<'a>(&'a self, name: &'a str) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Block until the Job succeeded or failed.
    fn wait_for_job<'a>(&'a self, name: &'a str) -> BoxFuture<'a, anyhow::Result<JobOutcome>>;

    fn job_logs<'a>(
        &'a self,
        name: &'a str,
        container: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Vec<u8>>>;

    fn automount_volumes(&self) -> BoxFuture<'_, anyhow::Result<Vec<AutomountVolume>>>;

    fn pod_security_level(&self) -> BoxFuture<'_, anyhow::Result<PodSecurityLevel>>;

    /// The running pod matching `selector`, if any.
    fn running_pod<'a>(
        &'a self,
        selector: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Option<RunningPod>>>;

    /// Copy a local file or directory to `remote` inside a container.
    fn copy_to_pod<'a>(
        &'a self,
        pod: &'a str,
        container: &'a str,
        local: &'a Path,
        remote: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// What the target platform can apply.
pub trait Platform: Send + Sync {
    fn name(&self) -> &str;

    fn supports_apply_kubernetes(&self) -> bool;

    fn supports_apply_openshift(&self) -> bool;

    fn supports_apply_image(&self) -> bool;

    /// Create or update the objects in a YAML/JSON manifest.
    fn apply_manifest<'a>(&'a self, manifest: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Build an image component, resolving its paths against `base_dir`.
    fn build_image<'a>(
        &'a self,
        image: &'a ImageComponent,
        base_dir: &'a Path,
    ) -> BoxFuture<'a, Result<()>>;
}
