//! axum router and handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use provenet_core::Message;
use provenet_dispatcher::Persistence;
use provenet_session::SessionRegistry;

use crate::{ApiError, CredentialService};

/// State shared across handlers.
pub struct ApiState {
    pub sessions: Arc<SessionRegistry>,
    pub persistence: Arc<dyn Persistence>,
    pub credentials: Arc<dyn CredentialService>,
}

/// Build the ingress router.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/message", post(handle_message))
        .route("/message/:id", get(query_message))
        .route("/issue_vc", post(issue_vc))
        .with_state(state)
}

/// Decoded `POST /message` body after decryption.
#[derive(Debug, Deserialize)]
struct MessageRequest {
    #[serde(rename = "projectID")]
    project_id: u64,
    #[serde(rename = "projectVersion")]
    project_version: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct CreateMessageResponse {
    #[serde(rename = "messageID")]
    message_id: String,
}

#[derive(Debug, Serialize)]
struct MessageStatesResponse {
    #[serde(rename = "messageID")]
    message_id: String,
    states: Vec<StateEntry>,
}

#[derive(Debug, Serialize)]
struct StateEntry {
    state: String,
    comment: String,
    result: String,
    #[serde(rename = "createdAt")]
    created_at: u64,
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Auth(provenet_session::AuthError::InvalidToken))
}

async fn handle_message(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CreateMessageResponse>, ApiError> {
    let token = bearer_token(&headers)?;
    let client_did = state.credentials.verify_token(token).await?;

    let plaintext = state.credentials.decrypt(&client_did, &body).await?;
    let request: MessageRequest = serde_json::from_slice(&plaintext)
        .map_err(|e| ApiError::BadRequest(format!("failed to bind request body: {}", e)))?;

    state.sessions.verify_by_client_did(&client_did, request.project_id)?;

    let message = Message {
        message_id: Uuid::new_v4().to_string(),
        client_did,
        project_id: request.project_id,
        project_version: request.project_version,
        data: request.data.into_bytes(),
        internal_task_id: 0,
    };
    let message_id = message.message_id.clone();
    state.persistence.save_message(message).await?;

    info!("accepted message {} for project {}", message_id, request.project_id);
    Ok(Json(CreateMessageResponse { message_id }))
}

async fn query_message(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(message_id): Path<String>,
) -> Result<Json<MessageStatesResponse>, ApiError> {
    // An unknown message id is an empty result, not a failure, and short-
    // circuits before any credential work.
    let messages = state.persistence.fetch_message(&message_id).await?;
    if messages.is_empty() {
        return Ok(Json(MessageStatesResponse { message_id, states: Vec::new() }));
    }

    let token = bearer_token(&headers)?;
    let client_did = state.credentials.verify_token(token).await?;
    if messages.iter().any(|m| m.client_did != client_did) {
        return Err(ApiError::Auth(provenet_session::AuthError::Forbidden));
    }

    let mut states = Vec::new();
    for message in &messages {
        for task in state.persistence.fetch_task(message.internal_task_id).await? {
            for log in state.persistence.state_logs(task.project_id, task.id).await? {
                states.push(StateEntry {
                    state: log.state.to_string(),
                    comment: log.comment,
                    result: hex::encode(log.result),
                    created_at: log.created_at,
                });
            }
        }
    }
    states.sort_by_key(|entry| entry.created_at);

    Ok(Json(MessageStatesResponse { message_id, states }))
}

async fn issue_vc(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let credential = state.credentials.issue(request).await?;
    state.sessions.create_session(&credential.token, &credential.client_did)?;
    debug!("issued credential and bound session for {}", credential.client_did);
    Ok(Json(credential.response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use provenet_core::{unix_now, StateLog, TaskState};
    use provenet_dispatcher::MemoryPersistence;
    use provenet_session::{Client, ClientStore};

    use crate::{CredentialError, ErrorResponse, IssuedCredential};

    /// Transparent credential service: any `tok-<did>` token verifies to
    /// `<did>` and decryption is the identity.
    struct FakeCredentials;

    #[async_trait]
    impl CredentialService for FakeCredentials {
        async fn verify_token(&self, token: &str) -> Result<String, CredentialError> {
            token
                .strip_prefix("tok-")
                .map(|did| did.to_string())
                .ok_or_else(|| CredentialError::Verify("unknown token".to_string()))
        }

        async fn decrypt(&self, _client_did: &str, body: &[u8]) -> Result<Vec<u8>, CredentialError> {
            if body.is_empty() {
                return Err(CredentialError::Decrypt("empty body".to_string()));
            }
            Ok(body.to_vec())
        }

        async fn issue(&self, request: serde_json::Value) -> Result<IssuedCredential, CredentialError> {
            let client_did = request["clientDID"].as_str().unwrap_or_default().to_string();
            Ok(IssuedCredential {
                token: format!("tok-{}", client_did),
                response: json!({ "token": format!("tok-{}", client_did) }),
                client_did,
            })
        }
    }

    fn test_state() -> (Arc<ApiState>, Arc<MemoryPersistence>) {
        let clients = Arc::new(ClientStore::new());
        clients.register(Client::new("did:io:c1", [2]));
        let persistence = Arc::new(MemoryPersistence::new());
        let state = Arc::new(ApiState {
            sessions: Arc::new(SessionRegistry::new(clients, None)),
            persistence: persistence.clone(),
            credentials: Arc::new(FakeCredentials),
        });
        (state, persistence)
    }

    fn post_message(token: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/message")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_message_accepted() {
        let (state, persistence) = test_state();
        let app = router(state);

        let body = json!({ "projectID": 2, "projectVersion": "0.1", "data": "hello" });
        let response = app.oneshot(post_message("tok-did:io:c1", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let created: serde_json::Value = body_json(response).await;
        let message_id = created["messageID"].as_str().unwrap();
        let stored = persistence.fetch_message(message_id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].project_id, 2);
        assert_eq!(stored[0].data, b"hello");
    }

    #[tokio::test]
    async fn test_message_unauthorized_project() {
        let (state, _) = test_state();
        let app = router(state);

        // Client c1 only holds project 2.
        let body = json!({ "projectID": 3, "projectVersion": "0.1", "data": "hello" });
        let response = app.oneshot(post_message("tok-did:io:c1", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let error: ErrorResponse = body_json(response).await;
        assert!(error.error.contains("permission denied"));
    }

    #[tokio::test]
    async fn test_message_invalid_token() {
        let (state, _) = test_state();
        let app = router(state);

        let body = json!({ "projectID": 2, "projectVersion": "0.1", "data": "hello" });
        let response = app.oneshot(post_message("garbage", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_message_bind_failure() {
        let (state, _) = test_state();
        let app = router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/message")
            .header("authorization", "Bearer tok-did:io:c1")
            .body(Body::from("not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_query_message_states() {
        let (state, persistence) = test_state();
        let app = router(state);

        let body = json!({ "projectID": 2, "projectVersion": "0.1", "data": "hello" });
        let response = app
            .clone()
            .oneshot(post_message("tok-did:io:c1", body))
            .await
            .unwrap();
        let created: serde_json::Value = body_json(response).await;
        let message_id = created["messageID"].as_str().unwrap().to_string();

        let task = persistence.fetch(2, 1).await.unwrap().unwrap();
        let log = StateLog {
            task_id: 1,
            project_id: 2,
            state: TaskState::Received,
            comment: "queued".to_string(),
            result: Vec::new(),
            created_at: unix_now(),
        };
        persistence.create(&log, &task).await.unwrap();

        let request = Request::builder()
            .uri(format!("/message/{}", message_id))
            .header("authorization", "Bearer tok-did:io:c1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let states: serde_json::Value = body_json(response).await;
        assert_eq!(states["messageID"], message_id);
        assert_eq!(states["states"][0]["state"], "received");
        assert_eq!(states["states"][0]["comment"], "queued");
    }

    #[tokio::test]
    async fn test_query_message_owner_mismatch() {
        let (state, persistence) = test_state();
        let app = router(state);

        let body = json!({ "projectID": 2, "projectVersion": "0.1", "data": "hello" });
        let response = app
            .clone()
            .oneshot(post_message("tok-did:io:c1", body))
            .await
            .unwrap();
        let created: serde_json::Value = body_json(response).await;
        let message_id = created["messageID"].as_str().unwrap().to_string();
        assert_eq!(persistence.fetch_message(&message_id).await.unwrap().len(), 1);

        let request = Request::builder()
            .uri(format!("/message/{}", message_id))
            .header("authorization", "Bearer tok-did:io:c2")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_query_unknown_message() {
        let (state, _) = test_state();
        let app = router(state);

        // Unknown message ids answer 200 with an empty history, before any
        // token verification — no authorization header needed.
        let request = Request::builder().uri("/message/nope").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = body_json(response).await;
        assert_eq!(body["messageID"], "nope");
        assert_eq!(body["states"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_issue_vc_binds_session() {
        let (state, _) = test_state();
        let sessions = state.sessions.clone();
        let app = router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/issue_vc")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "clientDID": "did:io:c1" }).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The issued token now authorizes the client's project.
        assert_eq!(sessions.verify_and_authorize("tok-did:io:c1", 2).unwrap(), "did:io:c1");
    }

    #[tokio::test]
    async fn test_issue_vc_unknown_client() {
        let (state, _) = test_state();
        let app = router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/issue_vc")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "clientDID": "did:io:ghost" }).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
