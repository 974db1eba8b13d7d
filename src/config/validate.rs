// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{
    CommandKind, ComponentKind, ConfigFile, RawConfigFile, Timings,
};
use crate::errors::{DevloopError, Result};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::DevloopError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let timings = parse_timings(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, timings))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_project(cfg)?;
    validate_components(cfg)?;
    validate_commands(cfg)?;
    validate_composites(cfg)?;
    Ok(())
}

fn validate_project(cfg: &RawConfigFile) -> Result<()> {
    if cfg.project.component.trim().is_empty() {
        return Err(DevloopError::ConfigError(
            "[project].component must not be empty".to_string(),
        ));
    }
    if cfg.project.application.trim().is_empty() {
        return Err(DevloopError::ConfigError(
            "[project].application must not be empty".to_string(),
        ));
    }
    if cfg.command.is_empty() {
        return Err(DevloopError::ConfigError(
            "config must contain at least one [command.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_components(cfg: &RawConfigFile) -> Result<()> {
    for (name, component) in cfg.component.iter() {
        match component.kind() {
            None => {
                return Err(DevloopError::ConfigError(format!(
                    "component '{}' must set exactly one of `container`, `kubernetes`, `openshift` or `image`",
                    name
                )));
            }
            Some(ComponentKind::Container(c)) if c.image.trim().is_empty() => {
                return Err(DevloopError::MissingImage {
                    component: name.clone(),
                });
            }
            Some(ComponentKind::Kubernetes(m)) | Some(ComponentKind::Openshift(m)) => {
                if m.inlined.is_some() == m.uri.is_some() {
                    return Err(DevloopError::ConfigError(format!(
                        "component '{}' must set exactly one of `inlined` or `uri`",
                        name
                    )));
                }
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn validate_commands(cfg: &RawConfigFile) -> Result<()> {
    for (id, command) in cfg.command.iter() {
        match command.kind(id)? {
            CommandKind::Exec(exec) => {
                match cfg.component.get(&exec.component).and_then(|c| c.kind()) {
                    Some(ComponentKind::Container(_)) => {}
                    Some(_) => {
                        return Err(DevloopError::ConfigError(format!(
                            "exec command '{}' must target a container component, '{}' is not one",
                            id, exec.component
                        )));
                    }
                    None => {
                        return Err(DevloopError::ConfigError(format!(
                            "command '{}' references unknown component '{}'",
                            id, exec.component
                        )));
                    }
                }
                if exec.command_line.trim().is_empty() {
                    return Err(DevloopError::ConfigError(format!(
                        "exec command '{}' has an empty command_line",
                        id
                    )));
                }
            }
            CommandKind::Apply(apply) => {
                match cfg.component.get(&apply.component).and_then(|c| c.kind()) {
                    Some(ComponentKind::Container(_)) => {
                        return Err(DevloopError::ConfigError(format!(
                            "apply command '{}' cannot target container component '{}'",
                            id, apply.component
                        )));
                    }
                    Some(_) => {}
                    None => {
                        return Err(DevloopError::ConfigError(format!(
                            "command '{}' references unknown component '{}'",
                            id, apply.component
                        )));
                    }
                }
            }
            CommandKind::Composite(composite) => {
                for child in composite.commands.iter() {
                    if child == id {
                        return Err(DevloopError::ConfigError(format!(
                            "composite command '{}' cannot contain itself",
                            id
                        )));
                    }
                    if !cfg.command.contains_key(child) {
                        return Err(DevloopError::ConfigError(format!(
                            "composite command '{}' has unknown child command '{}'",
                            id, child
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

fn validate_composites(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: composite -> child.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for id in cfg.command.keys() {
        graph.add_node(id.as_str());
    }

    for (id, command) in cfg.command.iter() {
        if let Some(composite) = &command.composite {
            for child in composite.commands.iter() {
                graph.add_edge(id.as_str(), child.as_str(), ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(DevloopError::ConfigError(format!(
            "cycle detected in composite commands involving '{}'",
            cycle.node_id()
        ))),
    }
}

fn parse_timings(cfg: &RawConfigFile) -> Result<Timings> {
    let field = |name: &str, value: &str| {
        parse_duration(value)
            .map_err(|e| DevloopError::ConfigError(format!("{name}: {e}")))
    };

    let watch_delay = field("[watch].delay", &cfg.watch.delay)?;
    if watch_delay.is_zero() {
        return Err(DevloopError::ConfigError(
            "[watch].delay must be greater than zero".to_string(),
        ));
    }

    let status_schedule = cfg
        .supervisor
        .status_schedule
        .iter()
        .map(|s| field("[supervisor].status_schedule", s))
        .collect::<Result<Vec<_>>>()?;

    let hint_after = field("[executor].hint_after", &cfg.executor.hint_after)?;

    Ok(Timings {
        watch_delay,
        status_schedule,
        hint_after,
    })
}
