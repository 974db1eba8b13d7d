// tests/command_handler.rs

use std::collections::BTreeSet;
use std::sync::Arc;

use devloop::errors::DevloopError;
use devloop::handler::{CommandHandler, ExecContext, HandlerDeps, RunHandler};
use devloop::remote::RemoteProcessStatus;
use devloop::types::GroupKind;
use devloop::ui::{Console, SharedBuffer};
use devloop_test_utils::{
    init_tracing, resolved, with_timeout, ClusterCall, CommandBuilder, ConfigFileBuilder,
    FakeCluster, FakeExecClient, FakeSupervisor, SupervisorCall,
};

struct Harness {
    exec: FakeExecClient,
    supervisor: FakeSupervisor,
    cluster: FakeCluster,
    buffer: SharedBuffer,
    deps: HandlerDeps,
}

impl Harness {
    fn new() -> Self {
        let exec = FakeExecClient::new();
        let supervisor = FakeSupervisor::new();
        let cluster = FakeCluster::new();
        let (console, buffer) = Console::buffer();
        let deps = HandlerDeps {
            exec: Arc::new(exec.clone()),
            supervisor: Arc::new(supervisor.clone()),
            cluster: Arc::new(cluster.clone()),
            platform: Arc::new(cluster.clone()),
            console,
        };
        Self {
            exec,
            supervisor,
            cluster,
            buffer,
            deps,
        }
    }

    fn handler(&self, ctx: ExecContext) -> RunHandler {
        let cfg = ConfigFileBuilder::new("web")
            .container("runtime", "node:20")
            .container("tools", "busybox")
            .kubernetes("db", "kind: Service")
            .image("img", "registry.local/web:dev")
            .command(CommandBuilder::exec("run", "runtime", "npm start").group("run"))
            .build();
        RunHandler::new(Arc::new(cfg), self.deps.clone(), ctx)
    }
}

fn live(component_exists: bool) -> ExecContext {
    ExecContext {
        pod_name: Some("web-7d9f".to_string()),
        component_exists,
        containers_running: BTreeSet::from(["runtime".to_string()]),
    }
}

fn start(id: &str) -> SupervisorCall {
    SupervisorCall::Start {
        id: id.to_string(),
        container: "runtime".to_string(),
    }
}

fn stop(id: &str) -> SupervisorCall {
    SupervisorCall::Stop {
        id: id.to_string(),
        container: "runtime".to_string(),
    }
}

#[tokio::test]
async fn test_first_run_only_starts() {
    init_tracing();
    let h = Harness::new();
    let handler = h.handler(live(false));
    let cmd = resolved("run", "runtime", "npm start", Some(GroupKind::Run), false);

    with_timeout(handler.execute_non_terminating_command(&cmd))
        .await
        .unwrap();

    assert_eq!(h.supervisor.lifecycle_calls(), vec![start("run")]);
    assert!(h.cluster.calls().is_empty(), "live container must not use a job");
    let out = h.buffer.contents();
    assert!(out.contains("Executing the application (command: run)"));
    assert!(out.contains("✓"));
}

#[tokio::test]
async fn test_existing_component_is_stopped_before_start() {
    init_tracing();
    let h = Harness::new();
    let handler = h.handler(live(true));
    let cmd = resolved("run", "runtime", "npm start", Some(GroupKind::Run), false);

    handler.execute_non_terminating_command(&cmd).await.unwrap();

    assert_eq!(h.supervisor.lifecycle_calls(), vec![stop("run"), start("run")]);
}

#[tokio::test]
async fn test_hot_reload_leaves_process_alone() {
    init_tracing();
    let h = Harness::new();
    let handler = h.handler(live(true));
    let cmd = resolved("run", "runtime", "npm start", Some(GroupKind::Run), true);

    handler.execute_non_terminating_command(&cmd).await.unwrap();

    assert!(h.supervisor.calls().is_empty());
    assert!(h.exec.requests().is_empty());
}

#[tokio::test]
async fn test_hot_reload_still_starts_on_first_run() {
    init_tracing();
    let h = Harness::new();
    let handler = h.handler(live(false));
    let cmd = resolved("run", "runtime", "npm start", Some(GroupKind::Run), true);

    handler.execute_non_terminating_command(&cmd).await.unwrap();

    assert_eq!(h.supervisor.lifecycle_calls(), vec![start("run")]);
}

#[tokio::test]
async fn test_errored_process_shows_its_output() {
    init_tracing();
    let h = Harness::new();
    h.supervisor.script_statuses(&[RemoteProcessStatus::Errored]);
    h.supervisor.set_output("npm ERR! missing script: start\n");
    let handler = h.handler(live(false));
    let cmd = resolved("run", "runtime", "npm start", Some(GroupKind::Run), false);

    handler.execute_non_terminating_command(&cmd).await.unwrap();

    assert!(h.supervisor.calls().contains(&SupervisorCall::Output {
        id: "run".to_string(),
        lines: 100
    }));
    let out = h.buffer.contents();
    assert!(out.contains("exited with an error status in container 'runtime'"));
    assert!(out.contains("npm ERR! missing script: start"));
    assert!(out.contains("✗"));
}

#[tokio::test]
async fn test_status_polling_stops_once_settled() {
    init_tracing();
    let h = Harness::new();
    h.supervisor.script_statuses(&[
        RemoteProcessStatus::Starting,
        RemoteProcessStatus::Running,
    ]);
    let handler = h.handler(live(false));
    let cmd = resolved("run", "runtime", "npm start", Some(GroupKind::Run), false);

    handler.execute_non_terminating_command(&cmd).await.unwrap();

    let polls = h
        .supervisor
        .calls()
        .into_iter()
        .filter(|c| matches!(c, SupervisorCall::Status { .. }))
        .count();
    assert_eq!(polls, 2);
    assert!(!h.buffer.contents().contains("error status"));
}

#[tokio::test]
async fn test_unsettled_process_is_reported() {
    init_tracing();
    let h = Harness::new();
    h.supervisor.fallback_status(RemoteProcessStatus::Starting);
    let handler = h.handler(live(false));
    let cmd = resolved("run", "runtime", "npm start", Some(GroupKind::Run), false);

    handler.execute_non_terminating_command(&cmd).await.unwrap();

    assert!(h
        .supervisor
        .calls()
        .iter()
        .any(|c| matches!(c, SupervisorCall::Output { .. })));
}

#[tokio::test]
async fn test_terminating_command_runs_in_place() {
    init_tracing();
    let h = Harness::new();
    let handler = h.handler(live(true));
    let mut cmd = resolved("install", "runtime", "npm install", Some(GroupKind::Build), false);
    cmd.definition = cmd.definition.with_working_dir("/projects");

    handler.execute_terminating_command(&cmd).await.unwrap();

    let requests = h.exec.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].pod, "web-7d9f");
    assert_eq!(requests[0].container, "runtime");
    assert_eq!(
        requests[0].argv,
        vec!["/bin/sh", "-c", "cd /projects && npm install"]
    );
    assert!(requests[0].show_output);
    assert!(h.supervisor.calls().is_empty());
    assert!(h.cluster.calls().is_empty());
}

#[tokio::test]
async fn test_failing_terminating_command_is_an_error() {
    init_tracing();
    let h = Harness::new();
    h.exec.exit_with(3, "compile error: x.ts\n");
    let handler = h.handler(live(true));
    let cmd = resolved("install", "runtime", "npm install", Some(GroupKind::Build), false);

    let err = handler.execute_terminating_command(&cmd).await.unwrap_err();

    match err {
        DevloopError::CommandFailed { id, exit_code } => {
            assert_eq!(id, "install");
            assert_eq!(exit_code, 3);
        }
        other => panic!("Expected CommandFailed, got: {:?}", other),
    }
    assert!(h.buffer.contents().contains("compile error: x.ts"));
}

#[tokio::test]
async fn test_transport_failure_is_an_exec_error() {
    init_tracing();
    let h = Harness::new();
    h.exec.fail_transport("pod web-7d9f not found");
    let handler = h.handler(live(true));
    let cmd = resolved("install", "runtime", "npm install", Some(GroupKind::Build), false);

    let err = handler.execute_terminating_command(&cmd).await.unwrap_err();
    assert!(matches!(err, DevloopError::Exec { ref container, .. } if container == "runtime"));
}

#[tokio::test]
async fn test_container_not_running_uses_a_job() {
    init_tracing();
    let h = Harness::new();
    let handler = h.handler(live(true));
    let cmd = resolved("lint", "tools", "eslint .", Some(GroupKind::Build), false);

    with_timeout(handler.execute_terminating_command(&cmd))
        .await
        .unwrap();

    assert!(h.exec.requests().is_empty());
    assert!(h.supervisor.calls().is_empty());
    let calls = h.cluster.calls();
    assert!(calls.contains(&ClusterCall::CreateJob("web-app-lint".to_string())));
    assert!(calls.contains(&ClusterCall::DeleteJob("web-app-lint".to_string())));
}

#[tokio::test]
async fn test_run_command_without_pod_uses_a_job() {
    init_tracing();
    let h = Harness::new();
    let handler = h.handler(ExecContext::default());
    let cmd = resolved("run", "runtime", "npm start", Some(GroupKind::Run), false);

    handler.execute_non_terminating_command(&cmd).await.unwrap();

    assert!(h.supervisor.calls().is_empty());
    assert_eq!(h.cluster.created_jobs().len(), 1);
}

#[tokio::test]
async fn test_unsupported_apply_is_skipped() {
    init_tracing();
    let h = Harness::new();
    h.cluster.set_capabilities(false, false, false);
    let handler = h.handler(live(false));

    handler
        .apply_kubernetes("deploy-db", "db", "kind: Service")
        .await
        .unwrap();
    handler.apply_openshift("deploy-db", "db", "kind: Route").await.unwrap();
    handler.apply_image("build-image", "img").await.unwrap();

    assert!(h.cluster.calls().is_empty());
}

#[tokio::test]
async fn test_supported_apply_reaches_the_platform() {
    init_tracing();
    let h = Harness::new();
    h.cluster.set_capabilities(true, false, true);
    let handler = h.handler(live(false));

    handler
        .apply_kubernetes("deploy-db", "db", "kind: Service")
        .await
        .unwrap();
    handler.apply_image("build-image", "img").await.unwrap();

    assert_eq!(
        h.cluster.calls(),
        vec![
            ClusterCall::ApplyManifest("kind: Service".to_string()),
            ClusterCall::BuildImage("registry.local/web:dev".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_image_apply_on_wrong_component_is_a_config_error() {
    init_tracing();
    let h = Harness::new();
    h.cluster.set_capabilities(true, true, true);
    let handler = h.handler(live(false));

    let err = handler.apply_image("build-image", "db").await.unwrap_err();
    assert!(matches!(err, DevloopError::ConfigError(_)));
}

#[tokio::test]
async fn test_remote_process_running_query() {
    init_tracing();
    let h = Harness::new();
    let handler = h.handler(live(true));
    let cmd = resolved("run", "runtime", "npm start", Some(GroupKind::Run), false);

    assert!(handler
        .is_remote_process_for_command_running(&cmd, "web-7d9f")
        .await
        .unwrap());

    h.supervisor.fallback_status(RemoteProcessStatus::Stopped);
    assert!(!handler
        .is_remote_process_for_command_running(&cmd, "web-7d9f")
        .await
        .unwrap());
}
