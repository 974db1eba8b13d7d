// src/watch/state.rs

//! State shared by the event consumer and the flush tick.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// One debounced batch handed to the pusher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingPush {
    pub changed: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub struct WatchState {
    dirty: bool,
    last_change: Option<Instant>,
    /// Insertion ordered, no duplicates.
    pending: Vec<PathBuf>,
    deleted: Vec<PathBuf>,
    fatal: Option<String>,
    closed: bool,
}

impl WatchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_change(&mut self, path: &Path, now: Instant) {
        self.deleted.retain(|p| p != path);
        if !self.pending.iter().any(|p| p == path) {
            self.pending.push(path.to_path_buf());
        }
        self.touch(now);
    }

    pub fn record_removal(&mut self, path: &Path, now: Instant) {
        self.pending.retain(|p| !p.starts_with(path));
        if !self.deleted.iter().any(|p| p == path) {
            self.deleted.push(path.to_path_buf());
        }
        self.touch(now);
    }

    fn touch(&mut self, now: Instant) {
        self.last_change = Some(now);
        self.dirty = true;
    }

    /// Take the pending batch if nothing changed during the last `delay`.
    pub fn take_due(&mut self, now: Instant, delay: Duration) -> Option<PendingPush> {
        if !self.dirty {
            return None;
        }
        match self.last_change {
            Some(last) if now < last + delay => None,
            _ => {
                self.dirty = false;
                Some(PendingPush {
                    changed: std::mem::take(&mut self.pending),
                    deleted: std::mem::take(&mut self.deleted),
                })
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_fatal(&mut self, msg: impl Into<String>) {
        if self.fatal.is_none() {
            self.fatal = Some(msg.into());
        }
    }

    pub fn fatal(&self) -> Option<&str> {
        self.fatal.as_deref()
    }

    /// The event source is gone; no further changes will arrive.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_secs(1);

    #[test]
    fn burst_is_held_until_quiet_for_delay() {
        let mut state = WatchState::new();
        let t0 = Instant::now();

        state.record_change(Path::new("/p/a"), t0);
        state.record_change(Path::new("/p/b"), t0 + Duration::from_millis(600));
        state.record_change(Path::new("/p/a"), t0 + Duration::from_millis(900));

        assert_eq!(state.take_due(t0 + Duration::from_millis(1500), DELAY), None);

        let batch = state.take_due(t0 + Duration::from_millis(1900), DELAY).unwrap();
        assert_eq!(
            batch.changed,
            vec![PathBuf::from("/p/a"), PathBuf::from("/p/b")]
        );
        assert!(!state.is_dirty());
        assert_eq!(state.take_due(t0 + Duration::from_secs(5), DELAY), None);
    }

    #[test]
    fn removal_supersedes_pending_change_and_vice_versa() {
        let mut state = WatchState::new();
        let now = Instant::now();

        state.record_change(Path::new("/p/dir/x"), now);
        state.record_removal(Path::new("/p/dir"), now);
        state.record_removal(Path::new("/p/y"), now);
        state.record_change(Path::new("/p/y"), now);

        let batch = state.take_due(now + DELAY, DELAY).unwrap();
        assert_eq!(batch.changed, vec![PathBuf::from("/p/y")]);
        assert_eq!(batch.deleted, vec![PathBuf::from("/p/dir")]);
    }

    #[test]
    fn first_fatal_error_wins() {
        let mut state = WatchState::new();
        state.set_fatal("first");
        state.set_fatal("second");
        assert_eq!(state.fatal(), Some("first"));
    }
}
