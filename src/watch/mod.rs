// src/watch/mod.rs

//! File watching and the debounced push loop.
//!
//! - [`patterns`] decides which paths are ignored.
//! - [`registrar`] registers directory watches and adapts `notify` events.
//! - [`state`] is the mutex-guarded debounce state.
//! - [`hash`] drops writes that leave content unchanged (`use_hash`).
//! - [`watcher`] runs the event consumer and flush tick.

pub mod hash;
pub mod path_utils;
pub mod patterns;
pub mod registrar;
pub mod state;
pub mod watcher;

pub use patterns::IgnoreMatcher;
pub use registrar::{register_tree, FsEvent, NotifyRegistrar, WatchRegistrar};
pub use state::{PendingPush, WatchState};
pub use watcher::{run_watch_loop, watch_and_push, Pusher, WatchParams};
