//! Token → client session map.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::{AuthError, Client, ClientStore, Result};

struct SessionEntry {
    client: Arc<Client>,
    created_at: Instant,
}

/// Process-wide token → client mapping.
///
/// Sessions are created on token exchange and live until the process exits
/// unless a TTL is configured; expiry is checked lazily at lookup.
pub struct SessionRegistry {
    sessions: DashMap<String, SessionEntry>,
    clients: Arc<ClientStore>,
    ttl: Option<Duration>,
}

impl SessionRegistry {
    /// `ttl = None` means sessions never expire.
    pub fn new(clients: Arc<ClientStore>, ttl: Option<Duration>) -> Self {
        Self { sessions: DashMap::new(), clients, ttl }
    }

    /// Bind a verified token to a known client.
    pub fn create_session(&self, vc_token: &str, client_did: &str) -> Result<()> {
        let client = self
            .clients
            .client_by_did(client_did)
            .ok_or_else(|| AuthError::UnknownClient(client_did.to_string()))?;
        self.sessions.insert(
            vc_token.to_string(),
            SessionEntry { client, created_at: Instant::now() },
        );
        Ok(())
    }

    /// Resolve a token to its client DID iff the bound client may access
    /// the project.
    pub fn verify_and_authorize(&self, vc_token: &str, project_id: u64) -> Result<String> {
        let client = self.session_client(vc_token)?;
        if !client.has_project_permission(project_id) {
            return Err(AuthError::Forbidden);
        }
        Ok(client.client_did.clone())
    }

    /// Token-less variant used once a token has already been unwrapped
    /// upstream.
    pub fn verify_by_client_did(&self, client_did: &str, project_id: u64) -> Result<()> {
        match self.clients.client_by_did(client_did) {
            Some(client) if client.has_project_permission(project_id) => Ok(()),
            _ => Err(AuthError::Forbidden),
        }
    }

    fn session_client(&self, vc_token: &str) -> Result<Arc<Client>> {
        let expired = match self.sessions.get(vc_token) {
            None => return Err(AuthError::InvalidToken),
            Some(entry) => match self.ttl {
                Some(ttl) if entry.created_at.elapsed() >= ttl => true,
                _ => return Ok(entry.client.clone()),
            },
        };
        if expired {
            self.sessions.remove(vc_token);
        }
        Err(AuthError::InvalidToken)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(ttl: Option<Duration>) -> SessionRegistry {
        let clients = Arc::new(ClientStore::new());
        clients.register(Client::new("did:io:c1", [2]));
        SessionRegistry::new(clients, ttl)
    }

    #[test]
    fn test_create_session_unknown_client() {
        let sessions = registry(None);
        let err = sessions.create_session("token", "did:io:ghost").unwrap_err();
        assert_eq!(err, AuthError::UnknownClient("did:io:ghost".to_string()));
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_authorize_happy_path() {
        let sessions = registry(None);
        sessions.create_session("token", "did:io:c1").unwrap();

        let did = sessions.verify_and_authorize("token", 2).unwrap();
        assert_eq!(did, "did:io:c1");
    }

    #[test]
    fn test_authorize_requires_session_and_permission() {
        let sessions = registry(None);

        // Token never exchanged.
        assert_eq!(sessions.verify_and_authorize("token", 2), Err(AuthError::InvalidToken));

        // Session exists but the project is not in the client's set.
        sessions.create_session("token", "did:io:c1").unwrap();
        assert_eq!(sessions.verify_and_authorize("token", 3), Err(AuthError::Forbidden));
    }

    #[test]
    fn test_verify_by_client_did() {
        let sessions = registry(None);
        assert!(sessions.verify_by_client_did("did:io:c1", 2).is_ok());
        assert_eq!(sessions.verify_by_client_did("did:io:c1", 3), Err(AuthError::Forbidden));
        assert_eq!(sessions.verify_by_client_did("did:io:ghost", 2), Err(AuthError::Forbidden));
    }

    #[test]
    fn test_session_ttl_expiry() {
        let sessions = registry(Some(Duration::from_millis(10)));
        sessions.create_session("token", "did:io:c1").unwrap();
        assert!(sessions.verify_and_authorize("token", 2).is_ok());

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(sessions.verify_and_authorize("token", 2), Err(AuthError::InvalidToken));
        // Expired entries are removed on lookup.
        assert!(sessions.is_empty());
    }
}
