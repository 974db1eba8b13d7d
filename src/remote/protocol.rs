// src/remote/protocol.rs

//! On-container bookkeeping for supervised commands.
//!
//! Each command id owns three files under the state directory:
//!
//! - `<id>.pid`  pid of the background subshell running the command
//! - `<id>.exit` exit code once it finished, or `stopped` after a stop
//! - `<id>.log`  combined stdout/stderr
//!
//! All scripts are plain POSIX sh so they run in any image that has a shell.
//! Stopping walks the process tree with `pgrep -P` when the image has it and
//! through `/proc/<pid>/status` otherwise.

use crate::devfile::command::{shell_quote, CommandDefinition, SHELL};
use crate::remote::supervisor::RemoteProcessStatus;

#[derive(Debug, Clone)]
pub struct StatusFileProtocol {
    state_dir: String,
}

impl StatusFileProtocol {
    pub fn new(state_dir: impl Into<String>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    fn path(&self, id: &str, ext: &str) -> String {
        format!("{}/{}.{}", self.state_dir, file_stem(id), ext)
    }

    /// Launch the command in the background and return immediately.
    pub fn start_script(&self, def: &CommandDefinition) -> String {
        let pid = self.path(&def.id, "pid");
        let exit = self.path(&def.id, "exit");
        let log = self.path(&def.id, "log");
        let inner = format!("{} -c {}", SHELL, shell_quote(&def.shell_line()));

        format!(
            "mkdir -p {dir}; rm -f {exit}; \
             ( {inner}; echo $? > {exit} ) > {log} 2>&1 < /dev/null & \
             echo $! > {pid}",
            dir = self.state_dir,
        )
    }

    /// Kill the recorded process tree and mark the command stopped once no
    /// process of the tree is left. Exits 1 if something survives SIGKILL.
    pub fn stop_script(&self, id: &str) -> String {
        let pid = self.path(id, "pid");
        let exit = self.path(id, "exit");

        format!(
            "children() {{ \
               if command -v pgrep >/dev/null 2>&1; then pgrep -P \"$1\"; return 0; fi; \
               for s in /proc/[0-9]*/status; do \
                 p=${{s#/proc/}}; p=${{p%/status}}; \
                 while read -r k v; do \
                   if [ \"$k\" = PPid: ]; then [ \"$v\" = \"$1\" ] && echo \"$p\"; break; fi; \
                 done 2>/dev/null < \"$s\"; \
               done; \
             }}; \
             tree() {{ echo \"$1\"; for c in $(children \"$1\"); do tree \"$c\"; done; }}; \
             alive() {{ \
               kill -0 \"$1\" 2>/dev/null || return 1; \
               st=$(while read -r k v; do if [ \"$k\" = State: ]; then echo \"$v\"; break; fi; done 2>/dev/null < /proc/$1/status); \
               [ \"${{st%% *}}\" != Z ]; \
             }}; \
             if [ -f {pid} ]; then \
               pids=$(tree \"$(cat {pid})\"); \
               kill $pids 2>/dev/null; \
               n=0; \
               while :; do \
                 left=''; for p in $pids; do if alive \"$p\"; then left=\"$left $p\"; fi; done; \
                 [ -z \"$left\" ] && break; \
                 n=$((n + 1)); \
                 [ $n -ge 25 ] && kill -9 $left 2>/dev/null; \
                 if [ $n -ge 50 ]; then echo \"still running:$left\" >&2; exit 1; fi; \
                 sleep 0.2 2>/dev/null || sleep 1; \
               done; \
               rm -f {pid}; echo stopped > {exit}; \
             fi; true"
        )
    }

    /// Print exactly one of `Running`, `Stopped`, `Errored`, `Unknown`.
    pub fn status_script(&self, id: &str) -> String {
        let pid = self.path(id, "pid");
        let exit = self.path(id, "exit");

        format!(
            "if [ -f {exit} ]; then \
               c=$(cat {exit}); \
               if [ \"$c\" = 0 ] || [ \"$c\" = stopped ]; then echo Stopped; else echo Errored; fi; \
             elif [ -f {pid} ] && kill -0 \"$(cat {pid})\" 2>/dev/null; then echo Running; \
             else echo Unknown; fi"
        )
    }

    pub fn tail_script(&self, id: &str, lines: usize) -> String {
        format!("tail -n {} {} 2>/dev/null; true", lines, self.path(id, "log"))
    }

    pub fn parse_status(stdout: &str) -> RemoteProcessStatus {
        match stdout.lines().rev().map(str::trim).find(|l| !l.is_empty()) {
            Some("Running") => RemoteProcessStatus::Running,
            Some("Stopped") => RemoteProcessStatus::Stopped,
            Some("Errored") => RemoteProcessStatus::Errored,
            _ => RemoteProcessStatus::Unknown,
        }
    }
}

/// Command ids become file names; keep them to a safe alphabet.
fn file_stem(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_script_backgrounds_the_quoted_shell_line() {
        let protocol = StatusFileProtocol::new("/tmp/.devloop");
        let def = CommandDefinition::new("run", "npm start").with_working_dir("/app");

        let script = protocol.start_script(&def);

        assert!(script.contains("/bin/sh -c 'cd /app && npm start'"));
        assert!(script.contains("echo $? > /tmp/.devloop/run.exit"));
        assert!(script.contains("> /tmp/.devloop/run.log 2>&1"));
        assert!(script.ends_with("echo $! > /tmp/.devloop/run.pid"));
    }

    #[test]
    fn status_output_parsing() {
        assert_eq!(
            StatusFileProtocol::parse_status("Running\n"),
            RemoteProcessStatus::Running
        );
        assert_eq!(
            StatusFileProtocol::parse_status("noise\nErrored\n\n"),
            RemoteProcessStatus::Errored
        );
        assert_eq!(
            StatusFileProtocol::parse_status(""),
            RemoteProcessStatus::Unknown
        );
    }

    #[test]
    fn stop_script_marks_stopped_only_after_the_tree_is_gone() {
        let protocol = StatusFileProtocol::new("/tmp/.devloop");

        let script = protocol.stop_script("run");

        assert!(script.contains("/proc/[0-9]*/status"));
        let wait = script.find("[ -z \"$left\" ] && break").unwrap();
        let mark = script.find("echo stopped > /tmp/.devloop/run.exit").unwrap();
        assert!(wait < mark);
    }

    #[test]
    fn unsafe_ids_are_sanitized_in_paths() {
        let protocol = StatusFileProtocol::new("/state");
        assert!(protocol.status_script("a/b c").contains("/state/a_b_c.exit"));
    }
}
