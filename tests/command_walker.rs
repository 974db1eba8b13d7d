// tests/command_walker.rs

use std::sync::Mutex;

use devloop::BoxFuture;
use devloop::devfile::{run_plan, CommandWalker, PlannedStep, ResolvedCommand};
use devloop::errors::{DevloopError, Result};
use devloop::handler::CommandHandler;
use devloop::types::GroupKind;
use devloop_test_utils::{CommandBuilder, ConfigFileBuilder};

/// Records which handler entry point each step reached.
#[derive(Default)]
struct RecordingHandler {
    calls: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl RecordingHandler {
    fn failing_on(id: &str) -> Self {
        Self {
            fail_on: Some(id.to_string()),
            ..Self::default()
        }
    }

    fn record(&self, entry: &str, id: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("{entry}:{id}"));
        if self.fail_on.as_deref() == Some(id) {
            return Err(DevloopError::CommandFailed {
                id: id.to_string(),
                exit_code: 2,
            });
        }
        Ok(())
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandHandler for RecordingHandler {
    fn apply_image<'a>(&'a self, id: &'a str, _component: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.record("image", id) })
    }

    fn apply_kubernetes<'a>(
        &'a self,
        id: &'a str,
        _component: &'a str,
        _manifest: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.record("kubernetes", id) })
    }

    fn apply_openshift<'a>(
        &'a self,
        id: &'a str,
        _component: &'a str,
        _manifest: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.record("openshift", id) })
    }

    fn execute_non_terminating_command<'a>(
        &'a self,
        cmd: &'a ResolvedCommand,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.record("non-terminating", cmd.id()) })
    }

    fn execute_terminating_command<'a>(
        &'a self,
        cmd: &'a ResolvedCommand,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.record("terminating", cmd.id()) })
    }

    fn is_remote_process_for_command_running<'a>(
        &'a self,
        _cmd: &'a ResolvedCommand,
        _pod: &'a str,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(false) })
    }
}

fn project() -> ConfigFileBuilder {
    ConfigFileBuilder::new("web")
        .container("runtime", "node:20")
        .kubernetes("db", "kind: Service")
}

#[test]
fn test_single_command_in_group_is_implicit_default() {
    let cfg = project()
        .command(CommandBuilder::exec("install", "runtime", "npm install").group("build"))
        .build();

    let walker = CommandWalker::new(&cfg);
    assert_eq!(walker.default_command(GroupKind::Build).unwrap(), Some("install"));
    assert_eq!(walker.default_command(GroupKind::Run).unwrap(), None);
    assert!(walker.plan_group(GroupKind::Deploy).unwrap().is_empty());
}

#[test]
fn test_group_without_default_is_an_error() {
    let cfg = project()
        .command(CommandBuilder::exec("a", "runtime", "true").group("build"))
        .command(CommandBuilder::exec("b", "runtime", "true").group("build"))
        .build();

    let err = CommandWalker::new(&cfg)
        .default_command(GroupKind::Build)
        .unwrap_err();
    assert!(err.to_string().contains("none is marked default"));
}

#[test]
fn test_composite_flattens_in_order_and_passes_group_down() {
    let cfg = project()
        .command(CommandBuilder::apply("deploy-db", "db"))
        .command(CommandBuilder::exec("install", "runtime", "npm install"))
        .command(
            CommandBuilder::exec("start", "runtime", "node ${PROJECT_SOURCE}/server.js")
                .working_dir("${PROJECT_SOURCE}")
                .env("PORT", "3000"),
        )
        .command(CommandBuilder::composite("up", &["deploy-db", "install", "start"]).group("run"))
        .build();

    let steps = CommandWalker::new(&cfg).plan_group(GroupKind::Run).unwrap();
    let ids: Vec<&str> = steps.iter().map(PlannedStep::id).collect();
    assert_eq!(ids, vec!["deploy-db", "install", "start"]);

    match &steps[0] {
        PlannedStep::ApplyKubernetes { manifest, .. } => assert!(manifest.contains("kind: Service")),
        other => panic!("Expected kubernetes apply, got {:?}", other),
    }
    match &steps[2] {
        PlannedStep::Exec(cmd) => {
            assert_eq!(cmd.group, Some(GroupKind::Run));
            assert_eq!(cmd.definition.cmd_line, "node /projects/server.js");
            assert_eq!(cmd.definition.working_dir, "/projects");
            assert_eq!(
                cmd.definition.env_vars,
                vec![("PORT".to_string(), "3000".to_string())]
            );
        }
        other => panic!("Expected exec step, got {:?}", other),
    }
}

#[test]
fn test_child_group_wins_over_composite_group() {
    let cfg = project()
        .command(CommandBuilder::exec("compile", "runtime", "make").group("build"))
        .command(CommandBuilder::exec("serve", "runtime", "./serve"))
        .command(CommandBuilder::composite("all", &["compile", "serve"]).group("run"))
        .build();

    let steps = CommandWalker::new(&cfg).plan("all").unwrap();
    let groups: Vec<Option<GroupKind>> = steps
        .iter()
        .map(|s| match s {
            PlannedStep::Exec(cmd) => cmd.group,
            _ => None,
        })
        .collect();
    assert_eq!(groups, vec![Some(GroupKind::Build), Some(GroupKind::Run)]);
}

#[tokio::test]
async fn test_run_plan_routes_by_group() {
    let cfg = project()
        .image("img", "registry.local/web:dev")
        .command(CommandBuilder::exec("compile", "runtime", "make").group("build"))
        .command(CommandBuilder::exec("serve", "runtime", "./serve"))
        .command(CommandBuilder::apply("build-image", "img"))
        .command(
            CommandBuilder::composite("all", &["build-image", "compile", "serve"]).group("debug"),
        )
        .build();

    let steps = CommandWalker::new(&cfg).plan("all").unwrap();
    let handler = RecordingHandler::default();
    run_plan(&steps, &handler).await.unwrap();

    assert_eq!(
        handler.calls(),
        vec![
            "image:build-image",
            "terminating:compile",
            "non-terminating:serve"
        ]
    );
}

#[tokio::test]
async fn test_run_plan_stops_at_first_failure() {
    let cfg = project()
        .command(CommandBuilder::exec("one", "runtime", "true"))
        .command(CommandBuilder::exec("two", "runtime", "false"))
        .command(CommandBuilder::exec("three", "runtime", "true"))
        .command(CommandBuilder::composite("seq", &["one", "two", "three"]).group("build"))
        .build();

    let steps = CommandWalker::new(&cfg).plan_group(GroupKind::Build).unwrap();
    let handler = RecordingHandler::failing_on("two");
    let err = run_plan(&steps, &handler).await.unwrap_err();

    assert!(matches!(err, DevloopError::CommandFailed { exit_code: 2, .. }));
    assert_eq!(handler.calls(), vec!["terminating:one", "terminating:two"]);
}
