//! ProveNet Daemon
//!
//! Wires the coordinator together: contract projection, pub/sub fabric,
//! dispatcher, sessions and the HTTP ingress.
//!
//! ## Components
//!
//! - **Coordinator**: owns every long-lived task and their shutdown
//!   channels
//! - the binary loads config, starts the coordinator and waits for ctrl-c

mod service;

pub use service::Coordinator;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("config error: {0}")]
    Config(#[from] provenet_core::ConfigError),

    #[error("chain error: {0}")]
    Chain(#[from] provenet_chain::ChainError),

    #[error("contract projection error: {0}")]
    Tracker(#[from] provenet_contract::TrackerError),

    #[error("fabric error: {0}")]
    Fabric(#[from] provenet_pubsub::FabricError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
