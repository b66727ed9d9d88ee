//! Credential service seam.
//!
//! Token verification, payload decryption and credential issuance are
//! external concerns; the coordinator only consumes this interface. The
//! HTTP implementation delegates to the issuer service named in config.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("token verification failed: {0}")]
    Verify(String),

    #[error("failed to decrypt payload: {0}")]
    Decrypt(String),

    #[error("credential issuance failed: {0}")]
    Issue(String),
}

/// An issued credential with the session binding material extracted.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub client_did: String,
    pub token: String,
    /// Raw issuer response forwarded to the caller
    pub response: serde_json::Value,
}

#[async_trait]
pub trait CredentialService: Send + Sync {
    /// Verify a bearer VC-JWT and return the client DID it proves.
    async fn verify_token(&self, token: &str) -> Result<String, CredentialError>;

    /// Decrypt an ingress payload against the server key for a client DID.
    async fn decrypt(&self, client_did: &str, body: &[u8]) -> Result<Vec<u8>, CredentialError>;

    /// Delegate credential issuance to the issuer.
    async fn issue(&self, request: serde_json::Value) -> Result<IssuedCredential, CredentialError>;
}

/// Delegate over HTTP to the external issuer/verifier service.
pub struct HttpCredentialService {
    endpoint: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct VerifyResponse {
    #[serde(rename = "clientDID")]
    client_did: String,
}

#[derive(Deserialize)]
struct DecryptResponse {
    data: String,
}

impl HttpCredentialService {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), http: reqwest::Client::new() }
    }
}

#[async_trait]
impl CredentialService for HttpCredentialService {
    async fn verify_token(&self, token: &str) -> Result<String, CredentialError> {
        let response = self
            .http
            .post(format!("{}/verify", self.endpoint))
            .json(&json!({ "token": token }))
            .send()
            .await
            .map_err(|e| CredentialError::Verify(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CredentialError::Verify(format!("issuer returned {}", response.status())));
        }
        let verified: VerifyResponse =
            response.json().await.map_err(|e| CredentialError::Verify(e.to_string()))?;
        Ok(verified.client_did)
    }

    async fn decrypt(&self, client_did: &str, body: &[u8]) -> Result<Vec<u8>, CredentialError> {
        let response = self
            .http
            .post(format!("{}/decrypt", self.endpoint))
            .json(&json!({ "clientDID": client_did, "data": hex::encode(body) }))
            .send()
            .await
            .map_err(|e| CredentialError::Decrypt(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CredentialError::Decrypt(format!("issuer returned {}", response.status())));
        }
        let decrypted: DecryptResponse =
            response.json().await.map_err(|e| CredentialError::Decrypt(e.to_string()))?;
        hex::decode(&decrypted.data).map_err(|e| CredentialError::Decrypt(e.to_string()))
    }

    async fn issue(&self, request: serde_json::Value) -> Result<IssuedCredential, CredentialError> {
        let response = self
            .http
            .post(format!("{}/issue", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| CredentialError::Issue(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CredentialError::Issue(format!("issuer returned {}", response.status())));
        }
        let body: serde_json::Value =
            response.json().await.map_err(|e| CredentialError::Issue(e.to_string()))?;

        let client_did = body
            .get("clientDID")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CredentialError::Issue("issuer response missing clientDID".to_string()))?
            .to_string();
        let token = body
            .get("token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CredentialError::Issue("issuer response missing token".to_string()))?
            .to_string();
        Ok(IssuedCredential { client_did, token, response: body })
    }
}
