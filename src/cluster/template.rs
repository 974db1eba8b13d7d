// src/cluster/template.rs

//! Pod templates derived from container components, plus the labels that
//! tie cluster objects back to a component.

use std::collections::BTreeMap;

use crate::cluster::manifest::{
    Capabilities, Container, ContainerSecurityContext, EnvVar, ObjectMeta, PodSecurityContext,
    PodSpec, PodTemplate, SeccompProfile,
};
use crate::config::model::ConfigFile;
use crate::errors::{DevloopError, Result};
use crate::types::PodSecurityLevel;

pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const MANAGER: &str = "devloop";

/// Labels carried by every object belonging to `component` in `app`.
pub fn component_labels(component: &str, app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_INSTANCE.to_string(), component.to_string()),
        (LABEL_PART_OF.to_string(), app.to_string()),
        (LABEL_MANAGED_BY.to_string(), MANAGER.to_string()),
    ])
}

/// `key=value,...` selector matching [`component_labels`].
pub fn component_selector(component: &str, app: &str) -> String {
    format!("{LABEL_INSTANCE}={component},{LABEL_PART_OF}={app}")
}

/// Pod template containing only the container component `container_name`.
pub fn pod_template_for_container(cfg: &ConfigFile, container_name: &str) -> Result<PodTemplate> {
    let component = cfg.container(container_name).ok_or_else(|| {
        DevloopError::ConfigError(format!(
            "'{}' is not a container component",
            container_name
        ))
    })?;

    if component.image.trim().is_empty() {
        return Err(DevloopError::MissingImage {
            component: container_name.to_string(),
        });
    }

    let env = component
        .env
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: value.clone(),
        })
        .collect();

    Ok(PodTemplate {
        metadata: ObjectMeta {
            name: None,
            labels: component_labels(&cfg.project.component, &cfg.project.application),
            annotations: BTreeMap::new(),
        },
        spec: PodSpec {
            containers: vec![Container {
                name: container_name.to_string(),
                image: component.image.clone(),
                env,
                ..Container::default()
            }],
            volumes: Vec::new(),
            restart_policy: "Always".to_string(),
            security_context: None,
        },
    })
}

/// Adjust a template so it is admitted under `level`.
pub fn apply_security_level(template: &mut PodTemplate, level: PodSecurityLevel) {
    if level != PodSecurityLevel::Restricted {
        return;
    }

    template.spec.security_context = Some(PodSecurityContext {
        run_as_non_root: true,
        seccomp_profile: SeccompProfile {
            kind: "RuntimeDefault".to_string(),
        },
    });

    for container in template.spec.containers.iter_mut() {
        container.security_context = Some(ContainerSecurityContext {
            allow_privilege_escalation: false,
            capabilities: Capabilities {
                drop: vec!["ALL".to_string()],
            },
        });
    }
}
