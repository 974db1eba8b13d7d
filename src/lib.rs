// src/lib.rs

pub mod cli;
pub mod cluster;
pub mod config;
pub mod devfile;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod handler;
pub mod logging;
pub mod remote;
pub mod retry;
pub mod types;
pub mod ui;
pub mod watch;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::cluster::KubectlCluster;
use crate::config::loader::{config_root_dir, load_and_validate};
use crate::config::model::ConfigFile;
use crate::devfile::walker::{CommandWalker, PlannedStep};
use crate::engine::DevSession;
use crate::exec::{Kubectl, KubectlExecClient};
use crate::handler::HandlerDeps;
use crate::remote::StatusFileSupervisor;
use crate::types::{GroupKind, RunMode};
use crate::ui::Console;
use crate::watch::{watch_and_push, WatchParams};

/// Boxed `Send` future returned by the collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - kubectl-backed exec channel, supervisor and cluster client
/// - the dev session (initial push)
/// - the watch loop (unless `--once`)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg)?;
        return Ok(());
    }

    let run_mode = if args.debug {
        RunMode::Debug
    } else {
        cfg.project.run_mode
    };
    let root = config_root_dir(&config_path);
    let cfg = Arc::new(cfg);
    let console = Console::stdout();

    let kubectl = Kubectl::new(&cfg.project.kubectl, cfg.project.namespace.clone());
    let exec = Arc::new(KubectlExecClient::new(kubectl.clone(), console.clone()));
    let cluster = Arc::new(KubectlCluster::new(kubectl, cfg.project.image_builder.clone()));
    let deps = HandlerDeps {
        exec: exec.clone(),
        supervisor: Arc::new(StatusFileSupervisor::new(
            exec,
            cfg.supervisor.state_dir.clone(),
        )),
        cluster: cluster.clone(),
        platform: cluster,
        console: console.clone(),
    };

    let session = DevSession::new(cfg.clone(), deps, root.clone(), run_mode);
    info!(component = %cfg.project.component, ?root, ?run_mode, "starting dev session");

    let session_future = async {
        if let Err(err) = session.initial_push().await {
            if args.once {
                return Err(err);
            }
            warn!(error = %err, "initial push failed; watching for changes");
            console.line(format!("Push failed: {err}"));
        }
        if args.once {
            return Ok(());
        }
        let params = WatchParams::from_config(&cfg, &root)?;
        watch_and_push(params, &session, &console).await
    };

    tokio::select! {
        res = session_future => res.map_err(anyhow::Error::from),
        sig = tokio::signal::ctrl_c() => {
            sig?;
            info!("interrupted; stopping dev session");
            Ok(())
        }
    }
}

/// Print the resolved command sequence of every group.
fn print_dry_run(cfg: &ConfigFile) -> Result<()> {
    println!("devloop dry-run");
    println!(
        "  component = {} (application {})",
        cfg.project.component, cfg.project.application
    );
    println!("  sync_target = {}", cfg.project.sync_target);
    println!();

    let walker = CommandWalker::new(cfg);
    for group in [
        GroupKind::Build,
        GroupKind::Run,
        GroupKind::Debug,
        GroupKind::Deploy,
    ] {
        let steps = walker.plan_group(group)?;
        if steps.is_empty() {
            continue;
        }
        println!("{group}:");
        for step in &steps {
            println!("  - {}", describe_step(step));
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

fn describe_step(step: &PlannedStep) -> String {
    match step {
        PlannedStep::Exec(cmd) => format!(
            "{} [exec in {}]: {}",
            cmd.id(),
            cmd.component,
            cmd.definition.shell_line()
        ),
        PlannedStep::ApplyImage { id, component } => format!("{id} [build image {component}]"),
        PlannedStep::ApplyKubernetes { id, component, .. } => {
            format!("{id} [apply kubernetes {component}]")
        }
        PlannedStep::ApplyOpenshift { id, component, .. } => {
            format!("{id} [apply openshift {component}]")
        }
    }
}
