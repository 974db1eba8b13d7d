// src/cluster/mod.rs

//! Cluster object operations.
//!
//! - [`client`] defines the `ClusterClient` and `Platform` traits.
//! - [`manifest`] holds the Job / pod template shapes we serialize.
//! - [`template`] derives pod templates and labels from config.
//! - [`kubectl`] implements both traits on top of the `kubectl` binary.

pub mod client;
pub mod kubectl;
pub mod manifest;
pub mod template;

pub use client::{ClusterClient, JobOutcome, Platform, RunningPod};
pub use kubectl::KubectlCluster;
pub use manifest::{AutomountVolume, JobManifest, PodTemplate};
pub use template::{component_labels, component_selector, pod_template_for_container};
