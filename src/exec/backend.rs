// src/exec/backend.rs

//! Exec channel abstraction.
//!
//! Everything the engine does inside a running container goes through an
//! [`ExecClient`]: a synchronous request/response call that runs an argv in
//! a named container of a named pod and returns its exit code and output.
//! There is no persistent process handle.
//!
//! - [`KubectlExecClient`](super::kubectl::KubectlExecClient) is the
//!   production implementation.
//! - Tests provide fakes that record requests and script responses.

use crate::BoxFuture;

/// A single exec invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub pod: String,
    pub container: String,
    pub argv: Vec<String>,
    /// Echo output to the console while it is produced.
    pub show_output: bool,
}

impl ExecRequest {
    pub fn new(pod: impl Into<String>, container: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            pod: pod.into(),
            container: container.into(),
            argv,
            show_output: false,
        }
    }

    pub fn show_output(mut self, show: bool) -> Self {
        self.show_output = show;
        self
    }
}

/// What came back from the container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// stdout followed by stderr, for diagnostics.
    pub fn combined(&self) -> Vec<u8> {
        let mut out = self.stdout.clone();
        out.extend_from_slice(&self.stderr);
        out
    }
}

/// Runs commands inside containers.
///
/// An `Err` means the channel itself failed (pod gone, transport error); a
/// command that ran and exited non-zero is an `Ok` with that exit code.
pub trait ExecClient: Send + Sync {
    fn execute(&self, request: ExecRequest) -> BoxFuture<'_, anyhow::Result<ExecOutput>>;
}
