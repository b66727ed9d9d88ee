//! ProveNet Session
//!
//! Binds verifiable-credential tokens to client identities and gates
//! per-project access. The session map is read on every ingress request,
//! so both maps are concurrent and lookups never block writers.

mod clients;
mod sessions;

pub use clients::{Client, ClientStore};
pub use sessions::SessionRegistry;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid token or expired")]
    InvalidToken,

    #[error("project permission denied")]
    Forbidden,

    #[error("client did not exists: {0}")]
    UnknownClient(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
