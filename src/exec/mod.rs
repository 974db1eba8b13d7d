// src/exec/mod.rs

//! Exec channel into running containers.
//!
//! - [`backend`] defines the `ExecClient` trait and its request/response
//!   types.
//! - [`kubectl`] wraps the `kubectl` binary (`tokio::process`) and provides
//!   `KubectlExecClient`, the production exec channel.

pub mod backend;
pub mod kubectl;

pub use backend::{ExecClient, ExecOutput, ExecRequest};
pub use kubectl::{Kubectl, KubectlExecClient};
