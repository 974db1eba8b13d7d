// src/ui.rs

//! User-facing output.
//!
//! Logs go to stderr through `tracing`; everything a user is meant to read
//! while developing (progress, changed files, diagnostic log tails) goes
//! through a [`Console`], which is stdout in production and an in-memory
//! buffer in tests.

use std::io::{IsTerminal, Write};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Instant;

use regex::Regex;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("static ANSI regex is valid")
});

/// Cloneable, thread-safe output sink.
#[derive(Clone)]
pub struct Console {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
    tty: bool,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console").field("tty", &self.tty).finish()
    }
}

impl Console {
    pub fn stdout() -> Self {
        let tty = std::io::stdout().is_terminal();
        Self::new(Box::new(std::io::stdout()), tty)
    }

    pub fn new(out: Box<dyn Write + Send>, tty: bool) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
            tty,
        }
    }

    /// A non-TTY console writing into a shared buffer.
    pub fn buffer() -> (Self, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (Self::new(Box::new(buffer.clone()), false), buffer)
    }

    pub fn is_tty(&self) -> bool {
        self.tty
    }

    pub fn line(&self, msg: impl AsRef<str>) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        // Nothing sensible to do if the terminal is gone.
        let _ = writeln!(out, "{}", msg.as_ref());
        let _ = out.flush();
    }

    pub fn write_bytes(&self, bytes: &[u8]) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let _ = out.write_all(bytes);
        let _ = out.flush();
    }
}

/// `Write` target shared between a [`Console`] and a test.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Progress line for a single operation: printed once when started and once
/// when finished, with the elapsed time.
#[derive(Debug)]
pub struct Spinner {
    console: Console,
    message: String,
    started: Instant,
    finished: bool,
}

impl Spinner {
    pub fn start(console: &Console, message: impl Into<String>) -> Self {
        let message = message.into();
        console.line(format!(" •  {message} ..."));
        Self {
            console: console.clone(),
            message,
            started: Instant::now(),
            finished: false,
        }
    }

    pub fn finish(mut self, success: bool) {
        self.finish_inner(success);
    }

    fn finish_inner(&mut self, success: bool) {
        if self.finished {
            return;
        }
        self.finished = true;
        let mark = if success { "✓" } else { "✗" };
        let elapsed = self.started.elapsed();
        self.console.line(format!(
            " {mark}  {} [{:.1}s]",
            self.message,
            elapsed.as_secs_f64()
        ));
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        // A spinner dropped mid-flight did not succeed.
        self.finish_inner(false);
    }
}

/// Print the last `lines` lines of `log` under a heading.
///
/// ANSI escape sequences are kept on a TTY and stripped otherwise.
pub fn display_log_tail(console: &Console, heading: &str, log: &[u8], lines: usize) {
    let text = String::from_utf8_lossy(log);
    let text = if console.is_tty() {
        text.into_owned()
    } else {
        strip_ansi(&text)
    };

    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);

    console.line(format!("{heading} (last {} lines):", all.len() - start));
    for line in &all[start..] {
        console.line(*line);
    }
}

pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_tail_keeps_only_last_lines_and_strips_color_off_tty() {
        let (console, buffer) = Console::buffer();
        let log = b"one\n\x1b[31mtwo\x1b[0m\nthree\n";

        display_log_tail(&console, "Log", log, 2);

        assert_eq!(buffer.contents(), "Log (last 2 lines):\ntwo\nthree\n");
    }

    #[test]
    fn dropped_spinner_reports_failure() {
        let (console, buffer) = Console::buffer();
        {
            let _spinner = Spinner::start(&console, "Building");
        }
        let out = buffer.contents();
        assert!(out.contains("•  Building ..."));
        assert!(out.contains("✗  Building"));
    }
}
