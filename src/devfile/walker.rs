// src/devfile/walker.rs

//! Resolve a group's default command and walk it into handler calls.
//!
//! Walking happens in two phases: [`CommandWalker::plan`] flattens composite
//! commands into an ordered list of [`PlannedStep`]s (pure, no IO besides
//! reading manifest files), and [`run_plan`] invokes the handler once per step
//! in order, aborting on the first error.

use std::fs;

use tracing::debug;

use crate::config::model::{CommandKind, ComponentKind, ConfigFile};
use crate::devfile::command::{CommandDefinition, ResolvedCommand};
use crate::errors::{DevloopError, Result};
use crate::handler::CommandHandler;
use crate::types::GroupKind;

/// One handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedStep {
    Exec(ResolvedCommand),
    ApplyImage {
        id: String,
        component: String,
    },
    ApplyKubernetes {
        id: String,
        component: String,
        manifest: String,
    },
    ApplyOpenshift {
        id: String,
        component: String,
        manifest: String,
    },
}

impl PlannedStep {
    pub fn id(&self) -> &str {
        match self {
            PlannedStep::Exec(cmd) => cmd.id(),
            PlannedStep::ApplyImage { id, .. }
            | PlannedStep::ApplyKubernetes { id, .. }
            | PlannedStep::ApplyOpenshift { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CommandWalker<'a> {
    cfg: &'a ConfigFile,
}

impl<'a> CommandWalker<'a> {
    pub fn new(cfg: &'a ConfigFile) -> Self {
        Self { cfg }
    }

    /// Id of the command to run for `group`, if the group has any command.
    ///
    /// An explicit `default = true` wins; a group with a single command uses
    /// it implicitly. Several candidates without exactly one default is a
    /// configuration error.
    pub fn default_command(&self, group: GroupKind) -> Result<Option<&'a str>> {
        let in_group: Vec<&'a str> = self
            .cfg
            .command
            .iter()
            .filter(|(_, c)| c.group() == Some(group))
            .map(|(id, _)| id.as_str())
            .collect();

        let defaults: Vec<&'a str> = in_group
            .iter()
            .copied()
            .filter(|id| self.cfg.command.get(*id).is_some_and(|c| c.is_default()))
            .collect();

        match (in_group.len(), defaults.len()) {
            (0, _) => Ok(None),
            (_, 1) => Ok(Some(defaults[0])),
            (1, 0) => Ok(Some(in_group[0])),
            (_, 0) => Err(DevloopError::ConfigError(format!(
                "group '{}' has several commands ({}) but none is marked default",
                group,
                in_group.join(", ")
            ))),
            (_, _) => Err(DevloopError::ConfigError(format!(
                "group '{}' has several default commands ({})",
                group,
                defaults.join(", ")
            ))),
        }
    }

    /// Plan the default command of `group`; empty if the group has none.
    pub fn plan_group(&self, group: GroupKind) -> Result<Vec<PlannedStep>> {
        match self.default_command(group)? {
            Some(id) => self.plan(id),
            None => Ok(Vec::new()),
        }
    }

    /// Flatten command `id` into the ordered steps it stands for.
    pub fn plan(&self, id: &str) -> Result<Vec<PlannedStep>> {
        let mut steps = Vec::new();
        self.plan_into(id, None, &mut steps)?;
        Ok(steps)
    }

    fn plan_into(
        &self,
        id: &str,
        inherited_group: Option<GroupKind>,
        steps: &mut Vec<PlannedStep>,
    ) -> Result<()> {
        let command = self.cfg.command.get(id).ok_or_else(|| {
            DevloopError::ConfigError(format!("unknown command '{}'", id))
        })?;

        match command.kind(id)? {
            CommandKind::Exec(exec) => {
                let project_source = self.cfg.project.sync_target.as_str();
                let working_dir = exec
                    .working_dir
                    .as_deref()
                    .map(|d| substitute_variables(d, project_source))
                    .unwrap_or_default();

                let mut definition = CommandDefinition::new(
                    id,
                    substitute_variables(&exec.command_line, project_source),
                )
                .with_working_dir(working_dir);
                definition.env_vars = exec.env.clone();

                steps.push(PlannedStep::Exec(ResolvedCommand {
                    definition,
                    component: exec.component.clone(),
                    group: exec.group.or(inherited_group),
                    hot_reload_capable: exec.hot_reload_capable,
                }));
            }
            CommandKind::Apply(apply) => {
                let component = self.cfg.component.get(&apply.component).ok_or_else(|| {
                    DevloopError::ConfigError(format!(
                        "command '{}' references unknown component '{}'",
                        id, apply.component
                    ))
                })?;

                let step = match component.kind() {
                    Some(ComponentKind::Image(_)) => PlannedStep::ApplyImage {
                        id: id.to_string(),
                        component: apply.component.clone(),
                    },
                    Some(ComponentKind::Kubernetes(m)) => PlannedStep::ApplyKubernetes {
                        id: id.to_string(),
                        component: apply.component.clone(),
                        manifest: self.read_manifest(&apply.component, m)?,
                    },
                    Some(ComponentKind::Openshift(m)) => PlannedStep::ApplyOpenshift {
                        id: id.to_string(),
                        component: apply.component.clone(),
                        manifest: self.read_manifest(&apply.component, m)?,
                    },
                    _ => {
                        return Err(DevloopError::ConfigError(format!(
                            "apply command '{}' cannot target component '{}'",
                            id, apply.component
                        )));
                    }
                };
                steps.push(step);
            }
            CommandKind::Composite(composite) => {
                let group = composite.group.or(inherited_group);
                for child in composite.commands.iter() {
                    self.plan_into(child, group, steps)?;
                }
            }
        }

        Ok(())
    }

    fn read_manifest(
        &self,
        component: &str,
        manifest: &crate::config::model::ManifestComponent,
    ) -> Result<String> {
        if let Some(inlined) = &manifest.inlined {
            return Ok(inlined.clone());
        }
        match &manifest.uri {
            Some(uri) => {
                let path = self.cfg.base_dir.join(uri);
                debug!(component, ?path, "reading manifest");
                Ok(fs::read_to_string(path)?)
            }
            None => Err(DevloopError::ConfigError(format!(
                "component '{}' has neither `inlined` nor `uri`",
                component
            ))),
        }
    }
}

/// Replace `${PROJECT_SOURCE}` and `${PROJECTS_ROOT}` with the sync target.
pub fn substitute_variables(s: &str, project_source: &str) -> String {
    s.replace("${PROJECT_SOURCE}", project_source)
        .replace("${PROJECTS_ROOT}", project_source)
}

/// Invoke the handler for each step, in order; the first error aborts.
pub async fn run_plan(steps: &[PlannedStep], handler: &dyn CommandHandler) -> Result<()> {
    for step in steps {
        debug!(command = %step.id(), "dispatching command");
        match step {
            PlannedStep::Exec(cmd) => {
                if cmd.group.is_some_and(|g| g.is_non_terminating()) {
                    handler.execute_non_terminating_command(cmd).await?;
                } else {
                    handler.execute_terminating_command(cmd).await?;
                }
            }
            PlannedStep::ApplyImage { id, component } => {
                handler.apply_image(id, component).await?;
            }
            PlannedStep::ApplyKubernetes {
                id,
                component,
                manifest,
            } => {
                handler.apply_kubernetes(id, component, manifest).await?;
            }
            PlannedStep::ApplyOpenshift {
                id,
                component,
                manifest,
            } => {
                handler.apply_openshift(id, component, manifest).await?;
            }
        }
    }
    Ok(())
}
