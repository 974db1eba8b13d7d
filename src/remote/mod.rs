// src/remote/mod.rs

//! Supervision of long-running commands inside running containers.

pub mod protocol;
pub mod supervisor;

pub use protocol::StatusFileProtocol;
pub use supervisor::{
    RemoteProcessStatus, RemoteProcessSupervisor, StatusCallback, StatusFileSupervisor,
};
