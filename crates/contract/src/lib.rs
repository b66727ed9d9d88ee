//! ProveNet Contract Projection
//!
//! Maintains a block-indexed, in-memory projection of the on-chain Project
//! and Prover registries.
//!
//! ## Components
//!
//! - **Project / Prover**: registry snapshots with non-default-wins merge
//! - **BlockHistory**: bounded ordered sequence of per-block diffs with
//!   collapse-on-overflow, reconstructable at any block in the retention
//!   epoch
//! - **decoder**: topic-hash dispatch of raw contract logs into typed
//!   per-block diffs
//! - **ContractTracker**: list + watch engine that bootstraps the history
//!   from chain state, tails new blocks, and fans out notifications over
//!   bounded channels

pub mod decoder;
mod engine;
mod history;
mod project;
mod prover;

pub use engine::{ContractTracker, TrackerConfig, TrackerError, NOTIFICATION_CAPACITY};
pub use history::{BlockDiff, BlockHistory, Snapshot};
pub use project::Project;
pub use prover::Prover;
