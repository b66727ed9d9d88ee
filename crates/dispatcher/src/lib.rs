//! ProveNet Dispatcher
//!
//! Pulls monotonically increasing task ids from persistence, publishes
//! them to project topics, and advances per-project watermarks on terminal
//! state logs received over the same fabric.
//!
//! ## Components
//!
//! - **Persistence**: the storage seam the dispatcher consumes, with an
//!   in-memory implementation for tests and single-node runs
//! - **ProjectDispatcher**: one serial worker per project owning
//!   `next_task_id`
//! - **Dispatcher**: the process-wide root routing inbound envelopes and
//!   lazily creating project dispatchers as the contract projection
//!   observes projects

mod dispatcher;
mod memory;
mod persistence;
mod worker;

pub use dispatcher::Dispatcher;
pub use memory::MemoryPersistence;
pub use persistence::{Persistence, PersistenceError};
pub use worker::ProjectDispatcher;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("fabric error: {0}")]
    Fabric(#[from] provenet_pubsub::FabricError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
