//! Known clients and their project permissions.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

/// A client identity and the projects it may submit to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub client_did: String,
    projects: HashSet<u64>,
}

impl Client {
    pub fn new(client_did: impl Into<String>, projects: impl IntoIterator<Item = u64>) -> Self {
        Self {
            client_did: client_did.into(),
            projects: projects.into_iter().collect(),
        }
    }

    pub fn has_project_permission(&self, project_id: u64) -> bool {
        self.projects.contains(&project_id)
    }
}

/// Concurrent DID → client mapping.
///
/// Built once at startup from configuration and extended as new clients
/// register; lookups are lock-free reads.
#[derive(Debug, Default)]
pub struct ClientStore {
    clients: DashMap<String, Arc<Client>>,
}

impl ClientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, client: Client) {
        self.clients.insert(client.client_did.clone(), Arc::new(client));
    }

    pub fn client_by_did(&self, client_did: &str) -> Option<Arc<Client>> {
        self.clients.get(client_did).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
