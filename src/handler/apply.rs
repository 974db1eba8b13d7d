// src/handler/apply.rs

//! Apply commands: build an image component or apply a manifest.
//!
//! Each function returns `DevloopError::Unsupported` when the platform lacks
//! the capability; the handler turns that into a logged skip.

use tracing::info;

use crate::cluster::client::Platform;
use crate::config::model::{ComponentKind, ConfigFile};
use crate::errors::{DevloopError, Result};

pub async fn apply_image(
    platform: &dyn Platform,
    cfg: &ConfigFile,
    id: &str,
    component: &str,
) -> Result<()> {
    if !platform.supports_apply_image() {
        return Err(DevloopError::Unsupported(format!(
            "building image component '{}' on {}",
            component,
            platform.name()
        )));
    }

    let image = match cfg.component.get(component).and_then(|c| c.kind()) {
        Some(ComponentKind::Image(image)) => image,
        _ => {
            return Err(DevloopError::ConfigError(format!(
                "command '{}' references '{}', which is not an image component",
                id, component
            )));
        }
    };

    info!(command = %id, image = %image.image_name, "building image");
    platform.build_image(image, &cfg.base_dir).await
}

pub async fn apply_kubernetes(
    platform: &dyn Platform,
    id: &str,
    component: &str,
    manifest: &str,
) -> Result<()> {
    if !platform.supports_apply_kubernetes() {
        return Err(DevloopError::Unsupported(format!(
            "applying Kubernetes component '{}' on {}",
            component,
            platform.name()
        )));
    }
    info!(command = %id, %component, "applying kubernetes manifest");
    platform.apply_manifest(manifest).await
}

pub async fn apply_openshift(
    platform: &dyn Platform,
    id: &str,
    component: &str,
    manifest: &str,
) -> Result<()> {
    if !platform.supports_apply_openshift() {
        return Err(DevloopError::Unsupported(format!(
            "applying OpenShift component '{}' on {}",
            component,
            platform.name()
        )));
    }
    info!(command = %id, %component, "applying openshift manifest");
    platform.apply_manifest(manifest).await
}
