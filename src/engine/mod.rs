// src/engine/mod.rs

//! Development session orchestration.
//!
//! A push is: find the component's running pod, sync changed files into
//! its source-mounting containers, then walk the Build group and the Run
//! (or Debug) group through a [`RunHandler`](crate::handler::RunHandler).
//! [`DevSession`] implements the watch loop's [`Pusher`](crate::watch::Pusher).

pub mod session;
pub mod sync;

pub use session::DevSession;
pub use sync::{remote_path, sync_containers, FileSync};
