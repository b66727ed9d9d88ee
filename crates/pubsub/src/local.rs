//! In-process loopback fabric.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use provenet_core::{project_topic, Envelope};

use crate::{EnvelopeHandler, Fabric, FabricError, Result};

/// Loopback fabric delivering published envelopes to every attached
/// handler, including the publisher's own. Used by tests and single-node
/// deployments where provers run in-process.
#[derive(Default)]
pub struct LocalFabric {
    topics: DashMap<u64, ()>,
    handlers: Mutex<Vec<Arc<dyn EnvelopeHandler>>>,
}

impl LocalFabric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an inbound handler. Every handler sees every delivered
    /// envelope; partitioning happens by topic registration.
    pub fn attach(&self, handler: Arc<dyn EnvelopeHandler>) {
        self.handlers.lock().push(handler);
    }

    pub fn has_topic(&self, project_id: u64) -> bool {
        self.topics.contains_key(&project_id)
    }
}

#[async_trait]
impl Fabric for LocalFabric {
    async fn add_topic(&self, project_id: u64) -> Result<()> {
        self.topics.insert(project_id, ());
        Ok(())
    }

    async fn publish(&self, project_id: u64, envelope: &Envelope) -> Result<()> {
        if !self.topics.contains_key(&project_id) {
            return Err(FabricError::UnknownTopic(project_topic(project_id)));
        }
        let handlers = self.handlers.lock().clone();
        for handler in handlers {
            handler.handle(envelope.clone()).await;
        }
        Ok(())
    }
}
