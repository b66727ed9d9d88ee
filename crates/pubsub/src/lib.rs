//! ProveNet Pub/Sub
//!
//! Topic-partitioned fabric carrying task envelopes outbound and state-log
//! envelopes inbound. Topics are `project-<projectID>`, so the dispatcher
//! for a project only ever sees that project's traffic.
//!
//! Delivery is best-effort: envelopes may be dropped or duplicated, and
//! receivers stay idempotent against `(TaskID, State)` replays.
//!
//! Two fabrics implement the same seam:
//!
//! - [`GossipFabric`]: libp2p gossipsub + mDNS, the networked fabric
//! - [`LocalFabric`]: in-process loopback for tests and single-node runs

mod gossip;
mod local;

pub use gossip::{GossipConfig, GossipFabric};
pub use local::LocalFabric;

use async_trait::async_trait;
use thiserror::Error;

use provenet_core::Envelope;

#[derive(Error, Debug)]
pub enum FabricError {
    #[error("topic not registered: {0}")]
    UnknownTopic(String),

    #[error("fabric unavailable: {0}")]
    Unavailable(String),

    #[error("invalid fabric config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, FabricError>;

/// The single global inbound callback: receives every envelope delivered
/// on a subscribed topic.
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    async fn handle(&self, envelope: Envelope);
}

/// Topic registration and fanout.
#[async_trait]
pub trait Fabric: Send + Sync {
    /// Subscribe to a project topic.
    async fn add_topic(&self, project_id: u64) -> Result<()>;

    /// Publish an envelope to a project topic.
    async fn publish(&self, project_id: u64, envelope: &Envelope) -> Result<()>;
}
