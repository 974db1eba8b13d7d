// tests/remote_supervisor.rs

use std::sync::{Arc, Mutex};

use devloop::devfile::CommandDefinition;
use devloop::errors::DevloopError;
use devloop::remote::{RemoteProcessStatus, RemoteProcessSupervisor, StatusFileSupervisor};
use devloop_test_utils::{init_tracing, FakeExecClient};

fn supervisor(exec: &FakeExecClient) -> StatusFileSupervisor {
    StatusFileSupervisor::new(Arc::new(exec.clone()), "/tmp/.devloop")
}

#[tokio::test]
async fn test_start_reports_starting_and_launches_in_background() {
    init_tracing();
    let exec = FakeExecClient::new();
    let sup = supervisor(&exec);
    let def = CommandDefinition::new("run", "npm start").with_working_dir("/projects");

    let seen = Mutex::new(Vec::new());
    let on_status = |s: RemoteProcessStatus| seen.lock().unwrap().push(s);
    sup.start_process_for_command(&def, "web-1", "runtime", &on_status)
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![RemoteProcessStatus::Starting]);

    let requests = exec.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].pod, "web-1");
    assert_eq!(requests[0].container, "runtime");
    let script = &requests[0].argv[2];
    assert!(script.contains("cd /projects && npm start"));
    assert!(script.contains("> /tmp/.devloop/run.log 2>&1"));
    assert!(script.contains("echo $! > /tmp/.devloop/run.pid"));
}

#[tokio::test]
async fn test_status_is_read_from_script_output() {
    init_tracing();
    let exec = FakeExecClient::new();
    let sup = supervisor(&exec);
    let def = CommandDefinition::new("run", "npm start");

    for (stdout, expected) in [
        ("Running\n", RemoteProcessStatus::Running),
        ("Stopped\n", RemoteProcessStatus::Stopped),
        ("Errored\n", RemoteProcessStatus::Errored),
        ("", RemoteProcessStatus::Unknown),
    ] {
        exec.exit_with(0, stdout);
        let status = sup
            .get_process_info_for_command(&def, "web-1", "runtime")
            .await
            .unwrap();
        assert_eq!(status, expected, "stdout {stdout:?}");
    }
}

#[tokio::test]
async fn test_stop_kills_the_process_tree() {
    init_tracing();
    let exec = FakeExecClient::new();
    let sup = supervisor(&exec);
    let def = CommandDefinition::new("run", "npm start");

    sup.stop_process_for_command(&def, "web-1", "runtime")
        .await
        .unwrap();

    let script = &exec.requests()[0].argv[2];
    assert!(script.contains("pgrep -P"));
    assert!(script.contains("/proc/[0-9]*/status"));
    assert!(script.contains("echo stopped > /tmp/.devloop/run.exit"));
}

#[tokio::test]
async fn test_fetch_output_returns_log_tail() {
    init_tracing();
    let exec = FakeExecClient::new();
    exec.exit_with(0, "listening on :3000\n");
    let sup = supervisor(&exec);
    let def = CommandDefinition::new("run", "npm start");

    let out = sup
        .fetch_output(&def, "web-1", "runtime", 20)
        .await
        .unwrap();

    assert_eq!(out, b"listening on :3000\n");
    assert!(exec.requests()[0].argv[2].starts_with("tail -n 20 /tmp/.devloop/run.log"));
}

#[tokio::test]
async fn test_script_failures_become_exec_errors() {
    init_tracing();
    let exec = FakeExecClient::new();
    let sup = supervisor(&exec);
    let def = CommandDefinition::new("run", "npm start");

    exec.exit_with(126, "");
    let err = sup
        .stop_process_for_command(&def, "web-1", "runtime")
        .await
        .unwrap_err();
    assert!(matches!(err, DevloopError::Exec { ref command, .. } if command == "run"));

    exec.fail_transport("connection refused");
    let err = sup
        .get_process_info_for_command(&def, "web-1", "runtime")
        .await
        .unwrap_err();
    assert!(matches!(err, DevloopError::Exec { .. }));
}

/// Runs supervisor scripts with the local `/bin/sh`, optionally with a
/// restricted `PATH`.
#[cfg(target_os = "linux")]
mod local_shell {
    use std::ffi::OsString;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use devloop::BoxFuture;
    use devloop::exec::backend::{ExecClient, ExecOutput, ExecRequest};

    pub struct LocalShell {
        pub path: Option<OsString>,
    }

    impl ExecClient for LocalShell {
        fn execute(&self, request: ExecRequest) -> BoxFuture<'_, anyhow::Result<ExecOutput>> {
            Box::pin(async move {
                let mut cmd = tokio::process::Command::new(&request.argv[0]);
                cmd.args(&request.argv[1..]);
                if let Some(path) = &self.path {
                    cmd.env("PATH", path);
                }
                let out = cmd.output().await?;
                Ok(ExecOutput {
                    exit_code: out.status.code().unwrap_or(-1),
                    stdout: out.stdout,
                    stderr: out.stderr,
                })
            })
        }
    }

    /// A bin dir with just the tools the scripts need, and no `pgrep`.
    pub fn bin_without_pgrep(dir: &Path) -> OsString {
        let system = std::env::var_os("PATH").unwrap_or_default();
        for tool in ["cat", "rm", "mkdir", "sleep", "tail"] {
            let found = std::env::split_paths(&system)
                .map(|d| d.join(tool))
                .find(|p| p.is_file())
                .unwrap_or_else(|| panic!("{tool} not found on PATH"));
            std::os::unix::fs::symlink(found, dir.join(tool)).unwrap();
        }
        dir.as_os_str().to_os_string()
    }

    /// Gone means no /proc entry, or only a zombie left for init to reap.
    pub fn process_gone(pid: &str) -> bool {
        match std::fs::read_to_string(PathBuf::from(format!("/proc/{pid}/status"))) {
            Err(_) => true,
            Ok(status) => status
                .lines()
                .find_map(|l| l.strip_prefix("State:"))
                .is_some_and(|state| state.trim_start().starts_with('Z')),
        }
    }

    pub async fn read_when_present(path: &Path) -> String {
        for _ in 0..50 {
            if let Ok(s) = std::fs::read_to_string(path) {
                if !s.trim().is_empty() {
                    return s.trim().to_string();
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("{} never appeared", path.display());
    }
}

#[cfg(target_os = "linux")]
async fn assert_stop_kills_everything(path: Option<std::ffi::OsString>) {
    use local_shell::{process_gone, read_when_present, LocalShell};

    init_tracing();
    let state = tempfile::TempDir::new().unwrap();
    let state_dir = state.path().display().to_string();
    let sup = StatusFileSupervisor::new(Arc::new(LocalShell { path }), state_dir.clone());
    let marker = state.path().join("inner.pid");
    let def = CommandDefinition::new(
        "run",
        format!("echo $$ > {}; exec sleep 600", marker.display()),
    );

    sup.start_process_for_command(&def, "local", "sh", &|_: RemoteProcessStatus| {})
        .await
        .unwrap();
    let inner = read_when_present(&marker).await;
    let wrapper = read_when_present(&state.path().join("run.pid")).await;
    assert_eq!(
        sup.get_process_info_for_command(&def, "local", "sh")
            .await
            .unwrap(),
        RemoteProcessStatus::Running
    );

    sup.stop_process_for_command(&def, "local", "sh")
        .await
        .unwrap();

    assert!(process_gone(&inner), "command process {inner} survived the stop");
    assert!(process_gone(&wrapper), "wrapper process {wrapper} survived the stop");
    assert_eq!(
        sup.get_process_info_for_command(&def, "local", "sh")
            .await
            .unwrap(),
        RemoteProcessStatus::Stopped
    );
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_stop_kills_the_command_under_a_real_shell() {
    assert_stop_kills_everything(None).await;
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_stop_kills_the_command_without_pgrep() {
    let bin = tempfile::TempDir::new().unwrap();
    let path = local_shell::bin_without_pgrep(bin.path());
    assert_stop_kills_everything(Some(path)).await;
}
