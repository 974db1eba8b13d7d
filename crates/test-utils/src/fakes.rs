#![allow(dead_code)]

//! Recording fakes for the engine's collaborators.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use devloop::BoxFuture;
use devloop::cluster::{ClusterClient, JobManifest, JobOutcome, Platform, RunningPod};
use devloop::cluster::manifest::AutomountVolume;
use devloop::config::ImageComponent;
use devloop::devfile::CommandDefinition;
use devloop::errors::{DevloopError, Result};
use devloop::exec::{ExecClient, ExecOutput, ExecRequest};
use devloop::remote::{RemoteProcessStatus, RemoteProcessSupervisor, StatusCallback};
use devloop::types::PodSecurityLevel;
use devloop::watch::{PendingPush, Pusher, WatchRegistrar};

/// Records every request; answers with a configurable output.
#[derive(Clone, Default)]
pub struct FakeExecClient {
    requests: Arc<Mutex<Vec<ExecRequest>>>,
    response: Arc<Mutex<ExecOutput>>,
    transport_error: Arc<Mutex<Option<String>>>,
}

impl FakeExecClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with(&self, output: ExecOutput) {
        *self.response.lock().unwrap() = output;
    }

    pub fn exit_with(&self, code: i32, stdout: &str) {
        self.respond_with(ExecOutput {
            exit_code: code,
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        });
    }

    pub fn fail_transport(&self, msg: &str) {
        *self.transport_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn requests(&self) -> Vec<ExecRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ExecClient for FakeExecClient {
    fn execute(&self, request: ExecRequest) -> BoxFuture<'_, anyhow::Result<ExecOutput>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            if let Some(msg) = self.transport_error.lock().unwrap().clone() {
                return Err(anyhow!(msg));
            }
            Ok(self.response.lock().unwrap().clone())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorCall {
    Start { id: String, container: String },
    Stop { id: String, container: String },
    Status { id: String },
    Output { id: String, lines: usize },
}

/// Supervisor that records calls and replays scripted statuses.
///
/// Status queries pop from the script; once it is empty they answer with
/// the fallback (`Running` unless changed).
#[derive(Clone)]
pub struct FakeSupervisor {
    calls: Arc<Mutex<Vec<SupervisorCall>>>,
    statuses: Arc<Mutex<VecDeque<RemoteProcessStatus>>>,
    fallback: Arc<Mutex<RemoteProcessStatus>>,
    output: Arc<Mutex<Vec<u8>>>,
}

impl Default for FakeSupervisor {
    fn default() -> Self {
        Self {
            calls: Arc::default(),
            statuses: Arc::default(),
            fallback: Arc::new(Mutex::new(RemoteProcessStatus::Running)),
            output: Arc::default(),
        }
    }
}

impl FakeSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_statuses(&self, statuses: &[RemoteProcessStatus]) {
        self.statuses.lock().unwrap().extend(statuses.iter().copied());
    }

    pub fn fallback_status(&self, status: RemoteProcessStatus) {
        *self.fallback.lock().unwrap() = status;
    }

    pub fn set_output(&self, output: &str) {
        *self.output.lock().unwrap() = output.as_bytes().to_vec();
    }

    pub fn calls(&self) -> Vec<SupervisorCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Start/Stop calls only.
    pub fn lifecycle_calls(&self) -> Vec<SupervisorCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, SupervisorCall::Start { .. } | SupervisorCall::Stop { .. }))
            .collect()
    }

    fn record(&self, call: SupervisorCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl RemoteProcessSupervisor for FakeSupervisor {
    fn start_process_for_command<'a>(
        &'a self,
        def: &'a CommandDefinition,
        _pod: &'a str,
        container: &'a str,
        on_status: StatusCallback<'a>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            on_status(RemoteProcessStatus::Starting);
            self.record(SupervisorCall::Start {
                id: def.id.clone(),
                container: container.to_string(),
            });
            Ok(())
        })
    }

    fn stop_process_for_command<'a>(
        &'a self,
        def: &'a CommandDefinition,
        _pod: &'a str,
        container: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(SupervisorCall::Stop {
                id: def.id.clone(),
                container: container.to_string(),
            });
            Ok(())
        })
    }

    fn get_process_info_for_command<'a>(
        &'a self,
        def: &'a CommandDefinition,
        _pod: &'a str,
        _container: &'a str,
    ) -> BoxFuture<'a, Result<RemoteProcessStatus>> {
        Box::pin(async move {
            self.record(SupervisorCall::Status { id: def.id.clone() });
            let next = self.statuses.lock().unwrap().pop_front();
            Ok(next.unwrap_or(*self.fallback.lock().unwrap()))
        })
    }

    fn fetch_output<'a>(
        &'a self,
        def: &'a CommandDefinition,
        _pod: &'a str,
        _container: &'a str,
        lines: usize,
    ) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            self.record(SupervisorCall::Output {
                id: def.id.clone(),
                lines,
            });
            Ok(self.output.lock().unwrap().clone())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    ListJobs(String),
    CreateJob(String),
    DeleteJob(String),
    WaitForJob(String),
    JobLogs(String),
    RunningPod(String),
    CopyToPod {
        pod: String,
        container: String,
        local: PathBuf,
        remote: String,
    },
    ApplyManifest(String),
    BuildImage(String),
}

#[derive(Default)]
struct ClusterState {
    calls: Vec<ClusterCall>,
    jobs: BTreeSet<String>,
    created: Vec<JobManifest>,
    job_outcome: Option<JobOutcome>,
    job_duration: Duration,
    job_logs: Vec<u8>,
    running_pod: Option<RunningPod>,
    automount: Vec<AutomountVolume>,
    security_level: PodSecurityLevel,
    fail_deletes: bool,
    supports_kubernetes: bool,
    supports_openshift: bool,
    supports_image: bool,
}

/// In-memory cluster: Jobs live in a set, everything else is scripted.
/// Also acts as the [`Platform`].
#[derive(Clone)]
pub struct FakeCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(ClusterState {
                job_outcome: Some(JobOutcome::Succeeded),
                supports_kubernetes: true,
                ..ClusterState::default()
            })),
        }
    }
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ClusterState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn calls(&self) -> Vec<ClusterCall> {
        self.with_state(|s| s.calls.clone())
    }

    /// Jobs currently existing.
    pub fn jobs(&self) -> Vec<String> {
        self.with_state(|s| s.jobs.iter().cloned().collect())
    }

    pub fn created_jobs(&self) -> Vec<JobManifest> {
        self.with_state(|s| s.created.clone())
    }

    pub fn add_job(&self, name: &str) {
        self.with_state(|s| s.jobs.insert(name.to_string()));
    }

    pub fn set_job_outcome(&self, outcome: JobOutcome) {
        self.with_state(|s| s.job_outcome = Some(outcome));
    }

    pub fn set_job_duration(&self, duration: Duration) {
        self.with_state(|s| s.job_duration = duration);
    }

    pub fn set_job_logs(&self, logs: &str) {
        self.with_state(|s| s.job_logs = logs.as_bytes().to_vec());
    }

    pub fn set_running_pod(&self, name: &str, containers: &[&str]) {
        self.with_state(|s| {
            s.running_pod = Some(RunningPod {
                name: name.to_string(),
                running_containers: containers.iter().map(|c| c.to_string()).collect(),
            })
        });
    }

    pub fn set_automount(&self, volumes: Vec<AutomountVolume>) {
        self.with_state(|s| s.automount = volumes);
    }

    pub fn set_security_level(&self, level: PodSecurityLevel) {
        self.with_state(|s| s.security_level = level);
    }

    pub fn fail_deletes(&self) {
        self.with_state(|s| s.fail_deletes = true);
    }

    pub fn set_capabilities(&self, kubernetes: bool, openshift: bool, image: bool) {
        self.with_state(|s| {
            s.supports_kubernetes = kubernetes;
            s.supports_openshift = openshift;
            s.supports_image = image;
        });
    }

    fn record(&self, call: ClusterCall) {
        self.with_state(|s| s.calls.push(call));
    }
}

impl ClusterClient for FakeCluster {
    fn list_jobs<'a>(&'a self, selector: &'a str) -> BoxFuture<'a, anyhow::Result<Vec<String>>> {
        Box::pin(async move {
            self.record(ClusterCall::ListJobs(selector.to_string()));
            Ok(self.jobs())
        })
    }

    fn create_job<'a>(&'a self, job: &'a JobManifest) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let name = job.name().to_string();
            self.record(ClusterCall::CreateJob(name.clone()));
            self.with_state(|s| {
                if !s.jobs.insert(name.clone()) {
                    return Err(anyhow!("job {name} already exists"));
                }
                s.created.push(job.clone());
                Ok(())
            })
        })
    }

    fn delete_job<'a>(&'a self, name: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.record(ClusterCall::DeleteJob(name.to_string()));
            self.with_state(|s| {
                if s.fail_deletes {
                    return Err(anyhow!("delete forbidden"));
                }
                s.jobs.remove(name);
                Ok(())
            })
        })
    }

    fn wait_for_job<'a>(&'a self, name: &'a str) -> BoxFuture<'a, anyhow::Result<JobOutcome>> {
        Box::pin(async move {
            self.record(ClusterCall::WaitForJob(name.to_string()));
            let duration = self.with_state(|s| s.job_duration);
            if !duration.is_zero() {
                tokio::time::sleep(duration).await;
            }
            self.with_state(|s| s.job_outcome)
                .ok_or_else(|| anyhow!("job {name} vanished"))
        })
    }

    fn job_logs<'a>(
        &'a self,
        name: &'a str,
        _container: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Vec<u8>>> {
        Box::pin(async move {
            self.record(ClusterCall::JobLogs(name.to_string()));
            Ok(self.with_state(|s| s.job_logs.clone()))
        })
    }

    fn automount_volumes(&self) -> BoxFuture<'_, anyhow::Result<Vec<AutomountVolume>>> {
        Box::pin(async move { Ok(self.with_state(|s| s.automount.clone())) })
    }

    fn pod_security_level(&self) -> BoxFuture<'_, anyhow::Result<PodSecurityLevel>> {
        Box::pin(async move { Ok(self.with_state(|s| s.security_level)) })
    }

    fn running_pod<'a>(
        &'a self,
        selector: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Option<RunningPod>>> {
        Box::pin(async move {
            self.record(ClusterCall::RunningPod(selector.to_string()));
            Ok(self.with_state(|s| s.running_pod.clone()))
        })
    }

    fn copy_to_pod<'a>(
        &'a self,
        pod: &'a str,
        container: &'a str,
        local: &'a Path,
        remote: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.record(ClusterCall::CopyToPod {
                pod: pod.to_string(),
                container: container.to_string(),
                local: local.to_path_buf(),
                remote: remote.to_string(),
            });
            Ok(())
        })
    }
}

impl Platform for FakeCluster {
    fn name(&self) -> &str {
        "fake"
    }

    fn supports_apply_kubernetes(&self) -> bool {
        self.with_state(|s| s.supports_kubernetes)
    }

    fn supports_apply_openshift(&self) -> bool {
        self.with_state(|s| s.supports_openshift)
    }

    fn supports_apply_image(&self) -> bool {
        self.with_state(|s| s.supports_image)
    }

    fn apply_manifest<'a>(&'a self, manifest: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(ClusterCall::ApplyManifest(manifest.to_string()));
            Ok(())
        })
    }

    fn build_image<'a>(
        &'a self,
        image: &'a ImageComponent,
        _base_dir: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(ClusterCall::BuildImage(image.image_name.clone()));
            Ok(())
        })
    }
}

/// Records every batch; the first `fail_first` pushes return an error.
#[derive(Clone, Default)]
pub struct RecordingPusher {
    batches: Arc<Mutex<Vec<PendingPush>>>,
    fail_first: Arc<Mutex<usize>>,
}

impl RecordingPusher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(n: usize) -> Self {
        let pusher = Self::default();
        *pusher.fail_first.lock().unwrap() = n;
        pusher
    }

    pub fn batches(&self) -> Vec<PendingPush> {
        self.batches.lock().unwrap().clone()
    }
}

impl Pusher for RecordingPusher {
    fn push<'a>(&'a self, batch: &'a PendingPush) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.batches.lock().unwrap().push(batch.clone());
            let mut remaining = self.fail_first.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DevloopError::Other(anyhow!("sync failed")));
            }
            Ok(())
        })
    }
}

/// Registrar recording watched paths; can be told to fail registrations.
#[derive(Clone, Default)]
pub struct FakeRegistrar {
    watched: Arc<Mutex<Vec<PathBuf>>>,
    unwatched: Arc<Mutex<Vec<PathBuf>>>,
    fail_on: Arc<Mutex<Option<PathBuf>>>,
}

impl FakeRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registering `path` fails (e.g. watch descriptor limit reached).
    pub fn fail_on(&self, path: impl Into<PathBuf>) {
        *self.fail_on.lock().unwrap() = Some(path.into());
    }

    pub fn watched(&self) -> Vec<PathBuf> {
        self.watched.lock().unwrap().clone()
    }

    pub fn unwatched(&self) -> Vec<PathBuf> {
        self.unwatched.lock().unwrap().clone()
    }
}

impl WatchRegistrar for FakeRegistrar {
    fn watch(&mut self, path: &Path) -> anyhow::Result<()> {
        if self.fail_on.lock().unwrap().as_deref() == Some(path) {
            return Err(anyhow!("no space left on device (watch limit)"));
        }
        self.watched.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> anyhow::Result<()> {
        self.unwatched.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}
