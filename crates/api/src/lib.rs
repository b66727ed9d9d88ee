//! ProveNet API
//!
//! HTTP ingress for client message submission and task state queries.
//!
//! ## Endpoints
//!
//! - `POST /message` — decrypt, authorize and persist a client message
//! - `GET /message/:id` — processing history of a message's task
//! - `POST /issue_vc` — delegate credential issuance and bind the session
//!
//! Every request carries `Authorization: Bearer <vc-jwt>`; verification
//! and payload decryption are delegated to the external credential
//! service behind [`CredentialService`].

mod credentials;
mod server;

pub use credentials::{CredentialError, CredentialService, HttpCredentialService, IssuedCredential};
pub use server::{router, ApiState};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use provenet_dispatcher::PersistenceError;
use provenet_session::AuthError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Persistence(#[from] PersistenceError),

    #[error("{0}")]
    Credential(#[from] CredentialError),
}

/// The error body every failing endpoint returns.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Credential(e) => match e {
                CredentialError::Verify(_) => StatusCode::UNAUTHORIZED,
                CredentialError::Decrypt(_) => StatusCode::BAD_REQUEST,
                CredentialError::Issue(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse { error: self.to_string() };
        (self.status(), Json(body)).into_response()
    }
}
