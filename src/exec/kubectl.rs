// src/exec/kubectl.rs

//! `kubectl`-backed process helpers and exec channel.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::BoxFuture;
use crate::exec::backend::{ExecClient, ExecOutput, ExecRequest};
use crate::ui::Console;

/// How to invoke `kubectl`: binary plus optional namespace.
#[derive(Debug, Clone)]
pub struct Kubectl {
    pub binary: String,
    pub namespace: Option<String>,
}

impl Kubectl {
    pub fn new(binary: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            namespace,
        }
    }

    /// A `Command` for `kubectl [-n <ns>] <args...>`.
    pub fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(&self.binary);
        if let Some(ns) = &self.namespace {
            cmd.arg("-n").arg(ns);
        }
        cmd.args(args);
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run to completion, capturing output; optionally echo it line by line.
    pub async fn run_captured(
        &self,
        args: &[String],
        stdin: Option<Vec<u8>>,
        echo: Option<&Console>,
    ) -> Result<ExecOutput> {
        debug!(binary = %self.binary, ?args, "running kubectl");

        let mut cmd = self.command(args);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning '{}'", self.binary))?;

        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                use tokio::io::AsyncWriteExt;
                pipe.write_all(&input).await.context("writing kubectl stdin")?;
                // Dropping the pipe closes stdin.
            }
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let out_task = tokio::spawn(collect_stream(stdout, echo.cloned()));
        let err_task = tokio::spawn(collect_stream(stderr, echo.cloned()));

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for '{}'", self.binary))?;

        let stdout = out_task.await.context("joining stdout reader")?;
        let stderr = err_task.await.context("joining stderr reader")?;

        Ok(ExecOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }

    /// Like [`run_captured`](Self::run_captured), but a non-zero exit is an error.
    pub async fn run_checked(&self, args: &[String], stdin: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let output = self.run_captured(args, stdin, None).await?;
        if !output.success() {
            anyhow::bail!(
                "'{} {}' exited with code {}: {}",
                self.binary,
                args.join(" "),
                output.exit_code,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.stdout)
    }
}

async fn collect_stream<R>(stream: Option<R>, echo: Option<Console>) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut collected = Vec::new();
    let Some(stream) = stream else {
        return collected;
    };

    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(console) = &echo {
            console.line(&line);
        }
        collected.extend_from_slice(line.as_bytes());
        collected.push(b'\n');
    }
    collected
}

/// Exec channel implemented with `kubectl exec`.
#[derive(Debug, Clone)]
pub struct KubectlExecClient {
    kubectl: Kubectl,
    console: Console,
}

impl KubectlExecClient {
    pub fn new(kubectl: Kubectl, console: Console) -> Self {
        Self { kubectl, console }
    }
}

impl ExecClient for KubectlExecClient {
    fn execute(&self, request: ExecRequest) -> BoxFuture<'_, anyhow::Result<ExecOutput>> {
        Box::pin(async move {
            let mut args = vec![
                "exec".to_string(),
                request.pod.clone(),
                "-c".to_string(),
                request.container.clone(),
                "--".to_string(),
            ];
            args.extend(request.argv.iter().cloned());

            let echo = request.show_output.then_some(&self.console);
            let output = self
                .kubectl
                .run_captured(&args, None, echo)
                .await
                .with_context(|| {
                    format!(
                        "executing in pod '{}' container '{}'",
                        request.pod, request.container
                    )
                })?;

            info!(
                pod = %request.pod,
                container = %request.container,
                exit_code = output.exit_code,
                "exec finished"
            );
            Ok(output)
        })
    }
}
