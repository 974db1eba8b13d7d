// src/watch/watcher.rs

//! The watch & push loop.
//!
//! Two tasks share one [`WatchState`] behind a mutex:
//!
//! - the event consumer records changed/removed paths and keeps watch
//!   registrations in sync with the tree;
//! - the flush tick, every `delay`, takes the pending batch once no change
//!   arrived for `delay` and hands it to the [`Pusher`].
//!
//! The lock is released before pushing, so changes made during a push are
//! kept for the next batch.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::BoxFuture;
use crate::config::model::ConfigFile;
use crate::errors::{DevloopError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::ui::Console;
use crate::watch::hash::{compute_file_hash, HashIndex};
use crate::watch::patterns::IgnoreMatcher;
use crate::watch::registrar::{register_tree, FsEvent, NotifyRegistrar, WatchRegistrar};
use crate::watch::state::{PendingPush, WatchState};

/// Receives each debounced batch. Errors are logged; the loop keeps going.
pub trait Pusher: Send + Sync {
    fn push<'a>(&'a self, batch: &'a PendingPush) -> BoxFuture<'a, Result<()>>;
}

#[derive(Debug, Clone)]
pub struct WatchParams {
    pub root: PathBuf,
    /// Watch only `root`, which is a file.
    pub single_file: bool,
    pub delay: Duration,
    pub ignore: IgnoreMatcher,
    pub use_hash: bool,
}

impl WatchParams {
    pub fn from_config(cfg: &ConfigFile, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        let ignore = IgnoreMatcher::from_config(&cfg.watch)?;

        Ok(Self {
            single_file: root.is_file(),
            root,
            delay: cfg.timings.watch_delay,
            ignore,
            use_hash: cfg.watch.use_hash,
        })
    }
}

/// Watch `params.root` and push every debounced batch of changes.
///
/// Returns only on a fatal watch error (or if the backend goes away).
pub async fn watch_and_push(params: WatchParams, pusher: &dyn Pusher, console: &Console) -> Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let registrar = NotifyRegistrar::new(tx).map_err(|e| DevloopError::Watch(format!("{e:#}")))?;
    run_watch_loop(
        Box::new(registrar),
        Arc::new(RealFileSystem),
        rx,
        params,
        pusher,
        console,
    )
    .await
}

/// [`watch_and_push`] with the registrar, filesystem and event source
/// supplied by the caller.
pub async fn run_watch_loop(
    mut registrar: Box<dyn WatchRegistrar>,
    fs: Arc<dyn FileSystem>,
    events: UnboundedReceiver<FsEvent>,
    params: WatchParams,
    pusher: &dyn Pusher,
    console: &Console,
) -> Result<()> {
    let registered = if params.single_file {
        registrar.watch(&params.root).map(|_| 1)
    } else {
        register_tree(
            registrar.as_mut(),
            fs.as_ref(),
            &params.root,
            &params.root,
            &params.ignore,
        )
    };
    let registered = registered.map_err(|e| DevloopError::Watch(format!("{e:#}")))?;
    info!(root = ?params.root, watches = registered, "file watcher started");

    let state = Arc::new(Mutex::new(WatchState::new()));
    let consumer = tokio::spawn(consume_events(
        registrar,
        fs,
        events,
        params.clone(),
        Arc::clone(&state),
    ));

    let result = flush_loop(&params, &state, pusher, console).await;
    consumer.abort();
    result
}

fn lock(state: &Mutex<WatchState>) -> MutexGuard<'_, WatchState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

async fn consume_events(
    mut registrar: Box<dyn WatchRegistrar>,
    fs: Arc<dyn FileSystem>,
    mut events: UnboundedReceiver<FsEvent>,
    params: WatchParams,
    state: Arc<Mutex<WatchState>>,
) {
    let mut hashes = HashIndex::new();

    while let Some(event) = events.recv().await {
        debug!(?event, "received watch event");
        match event {
            FsEvent::Error(msg) => {
                error!(error = %msg, "file watcher failed");
                lock(&state).set_fatal(msg);
                return;
            }
            FsEvent::Removed(path) => {
                if params.ignore.is_ignored(&params.root, &path) {
                    continue;
                }
                if let Err(err) = registrar.unwatch(&path) {
                    // Plain files were never registered.
                    debug!(?path, error = %err, "unwatch failed");
                }
                hashes.forget(&path);
                lock(&state).record_removal(&path, Instant::now());
            }
            FsEvent::Changed(path) => {
                if params.ignore.is_ignored(&params.root, &path)
                    || (!params.single_file && path == params.root)
                {
                    continue;
                }

                let (is_file, is_dir) = path_kind(&fs, &path).await;
                if params.use_hash && is_file && !content_changed(&fs, &mut hashes, &path).await {
                    continue;
                }

                lock(&state).record_change(&path, Instant::now());

                if !params.single_file && is_dir {
                    let walk_fs = Arc::clone(&fs);
                    let root = params.root.clone();
                    let ignore = params.ignore.clone();
                    let dir = path.clone();
                    let joined = tokio::task::spawn_blocking(move || {
                        let added =
                            register_tree(registrar.as_mut(), walk_fs.as_ref(), &root, &dir, &ignore);
                        (registrar, added)
                    })
                    .await;

                    let failure = match joined {
                        Ok((back, Ok(n))) => {
                            registrar = back;
                            debug!(?path, watches = n, "registered new directory");
                            continue;
                        }
                        Ok((_, Err(err))) => format!("{err:#}"),
                        Err(err) => format!("registration task failed: {err}"),
                    };
                    error!(?path, error = %failure, "watch registration failed");
                    lock(&state).set_fatal(failure);
                    return;
                }
            }
        }
    }

    debug!("watch event source closed");
    lock(&state).close();
}

/// `(is_file, is_dir)`, checked on the blocking pool like hashing.
async fn path_kind(fs: &Arc<dyn FileSystem>, path: &Path) -> (bool, bool) {
    let fs = Arc::clone(fs);
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || (fs.is_file(&owned), fs.is_dir(&owned)))
        .await
        .unwrap_or((false, false))
}

/// False only when the file's content hash equals the last one seen.
async fn content_changed(fs: &Arc<dyn FileSystem>, hashes: &mut HashIndex, path: &Path) -> bool {
    let fs = Arc::clone(fs);
    let owned = path.to_path_buf();
    match tokio::task::spawn_blocking(move || compute_file_hash(fs.as_ref(), &owned)).await {
        Ok(Ok(hash)) => hashes.update(path, hash),
        Ok(Err(err)) => {
            debug!(?path, error = %err, "hashing failed; treating as changed");
            true
        }
        Err(err) => {
            debug!(?path, error = %err, "hash task failed; treating as changed");
            true
        }
    }
}

async fn flush_loop(
    params: &WatchParams,
    state: &Mutex<WatchState>,
    pusher: &dyn Pusher,
    console: &Console,
) -> Result<()> {
    let mut tick = interval(params.delay);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    print_waiting(console, &params.root);

    loop {
        tick.tick().await;

        let (batch, finished) = {
            let mut st = lock(state);
            if let Some(msg) = st.fatal() {
                return Err(DevloopError::Watch(msg.to_string()));
            }
            let batch = st.take_due(Instant::now(), params.delay);
            (batch, st.is_closed() && !st.is_dirty())
        };

        if let Some(batch) = batch {
            flush(&batch, pusher, console).await;
            print_waiting(console, &params.root);
        } else if finished {
            return Ok(());
        }
    }
}

async fn flush(batch: &PendingPush, pusher: &dyn Pusher, console: &Console) {
    for path in &batch.changed {
        console.line(format!("File {} changed", path.display()));
    }
    for path in &batch.deleted {
        console.line(format!("File {} removed", path.display()));
    }

    info!(
        changed = batch.changed.len(),
        deleted = batch.deleted.len(),
        "pushing changes"
    );
    if let Err(err) = pusher.push(batch).await {
        warn!(error = %err, "push failed; still watching");
        console.line(format!("Push failed: {err}"));
    }
}

fn print_waiting(console: &Console, root: &Path) {
    console.line(format!(
        "Waiting for something to change in {}",
        root.display()
    ));
}
