// src/watch/registrar.rs

//! Watch registration and the notify backend.
//!
//! Directories are registered one by one, non-recursively, so ignored
//! subtrees (`.git`, `node_modules`) never cost a watch descriptor. New
//! directories are registered as their create events arrive.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::fs::FileSystem;
use crate::watch::patterns::IgnoreMatcher;

/// A filesystem event reduced to what the push loop cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    /// Created, written or renamed into place.
    Changed(PathBuf),
    /// Removed or renamed away.
    Removed(PathBuf),
    /// The backend failed; the session cannot continue.
    Error(String),
}

pub trait WatchRegistrar: Send {
    fn watch(&mut self, path: &Path) -> Result<()>;
    fn unwatch(&mut self, path: &Path) -> Result<()>;
}

/// Register `start` and every directory below it that is not ignored.
///
/// Returns the number of watches added. A failing registration is returned
/// as an error; the caller treats it as fatal.
pub fn register_tree(
    registrar: &mut dyn WatchRegistrar,
    fs: &dyn FileSystem,
    root: &Path,
    start: &Path,
    ignore: &IgnoreMatcher,
) -> Result<usize> {
    let mut added = 0;
    let mut stack = vec![start.to_path_buf()];

    while let Some(dir) = stack.pop() {
        if ignore.is_ignored(root, &dir) || !fs.is_dir(&dir) {
            continue;
        }
        registrar.watch(&dir)?;
        added += 1;

        let children = match fs.read_dir(&dir) {
            Ok(children) => children,
            // Vanished between the event and the walk.
            Err(err) => {
                debug!(?dir, error = %err, "skipping unreadable directory");
                continue;
            }
        };
        stack.extend(children.into_iter().filter(|c| fs.is_dir(c)));
    }

    Ok(added)
}

/// Registrar backed by the platform's recommended notify watcher.
pub struct NotifyRegistrar {
    watcher: RecommendedWatcher,
}

impl std::fmt::Debug for NotifyRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyRegistrar").finish()
    }
}

impl NotifyRegistrar {
    /// Create the watcher; its callback forwards translated events to `tx`.
    pub fn new(tx: UnboundedSender<FsEvent>) -> Result<Self> {
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                for event in translate(res) {
                    // Receiver gone means the session is over.
                    if tx.send(event).is_err() {
                        return;
                    }
                }
            },
            Config::default(),
        )
        .context("creating file watcher")?;

        Ok(Self { watcher })
    }
}

impl WatchRegistrar for NotifyRegistrar {
    fn watch(&mut self, path: &Path) -> Result<()> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .with_context(|| format!("watching {:?}", path))
    }

    fn unwatch(&mut self, path: &Path) -> Result<()> {
        self.watcher
            .unwatch(path)
            .with_context(|| format!("unwatching {:?}", path))
    }
}

/// Map a notify callback result onto zero or more [`FsEvent`]s.
pub fn translate(res: notify::Result<Event>) -> Vec<FsEvent> {
    let event = match res {
        Ok(event) => event,
        Err(err) => return vec![FsEvent::Error(err.to_string())],
    };

    match event.kind {
        EventKind::Access(_) => Vec::new(),
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.into_iter().map(FsEvent::Removed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            let mut out = Vec::with_capacity(2);
            if let Some(from) = paths.next() {
                out.push(FsEvent::Removed(from));
            }
            out.extend(paths.map(FsEvent::Changed));
            out
        }
        _ => event.paths.into_iter().map(FsEvent::Changed).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::default_ignore_regex;
    use crate::fs::MockFileSystem;
    use notify::event::{AccessKind, CreateKind, RemoveKind};

    #[derive(Default)]
    struct Recorder(Vec<PathBuf>);

    impl WatchRegistrar for Recorder {
        fn watch(&mut self, path: &Path) -> Result<()> {
            self.0.push(path.to_path_buf());
            Ok(())
        }
        fn unwatch(&mut self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn registers_every_directory_except_ignored() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/src/lib/a.js", "a");
        fs.add_file("/p/.git/objects/ab", "x");
        fs.add_file("/p/README.md", "r");
        let ignore = IgnoreMatcher::new(&default_ignore_regex(), &[]).unwrap();

        let mut rec = Recorder::default();
        let n = register_tree(&mut rec, &fs, Path::new("/p"), Path::new("/p"), &ignore).unwrap();

        let mut watched = rec.0;
        watched.sort();
        assert_eq!(n, 3);
        assert_eq!(
            watched,
            vec![
                PathBuf::from("/p"),
                PathBuf::from("/p/src"),
                PathBuf::from("/p/src/lib")
            ]
        );
    }

    #[test]
    fn translation_of_event_kinds() {
        let p = PathBuf::from("/p/a");
        let ev = |kind| Ok(Event::new(kind).add_path(p.clone()));

        assert_eq!(
            translate(ev(EventKind::Create(CreateKind::File))),
            vec![FsEvent::Changed(p.clone())]
        );
        assert_eq!(
            translate(ev(EventKind::Remove(RemoveKind::Any))),
            vec![FsEvent::Removed(p.clone())]
        );
        assert!(translate(ev(EventKind::Access(AccessKind::Any))).is_empty());
        assert!(matches!(
            translate(Err(notify::Error::generic("inotify limit"))).as_slice(),
            [FsEvent::Error(_)]
        ));
    }
}
