//! Task, state log and ingress message types.

use serde::{Deserialize, Serialize};

/// Processing states a task moves through.
///
/// `Proved`, `Outputted` and `Failed` are terminal: once a terminal state
/// log is persisted the task is finished and the per-project watermark
/// advances past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Accepted by the coordinator
    Received,
    /// Packed into a prover workload
    Packed,
    /// Published to the project topic
    Dispatched,
    /// Proof produced by a prover
    Proved,
    /// Output delivered downstream
    Outputted,
    /// Processing failed
    Failed,
}

impl TaskState {
    /// Whether this state finishes the task.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Proved | Self::Outputted | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Packed => "packed",
            Self::Dispatched => "dispatched",
            Self::Proved => "proved",
            Self::Outputted => "outputted",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of dispatched work.
///
/// Task ids are dense and monotonically increasing per project; the id is
/// assigned by the persistence layer when the ingress message is saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Per-project task id (dense, monotonically increasing)
    pub id: u64,
    #[serde(rename = "projectID")]
    pub project_id: u64,
    #[serde(rename = "clientDID")]
    pub client_did: String,
    #[serde(rename = "projectVersion")]
    pub project_version: String,
    /// Workload payload, hex on the wire
    #[serde(rename = "data", with = "hex_bytes")]
    pub payload: Vec<u8>,
    #[serde(rename = "createdAt")]
    pub created_at: u64,
}

/// One entry in a task's append-only processing history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateLog {
    #[serde(rename = "taskID")]
    pub task_id: u64,
    #[serde(rename = "projectID")]
    pub project_id: u64,
    pub state: TaskState,
    #[serde(default)]
    pub comment: String,
    /// Prover output for terminal states, hex on the wire
    #[serde(default, with = "hex_bytes")]
    pub result: Vec<u8>,
    #[serde(rename = "createdAt")]
    pub created_at: u64,
}

/// The ingress unit persisted by `POST /message`.
///
/// Each message yields exactly one task; `internal_task_id` links the
/// message to the task created from it so `GET /message/:id` can resolve
/// the processing history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "messageID")]
    pub message_id: String,
    #[serde(rename = "clientDID")]
    pub client_did: String,
    #[serde(rename = "projectID")]
    pub project_id: u64,
    #[serde(rename = "projectVersion")]
    pub project_version: String,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    #[serde(rename = "internalTaskID")]
    pub internal_task_id: u64,
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Hex (de)serialization for byte payloads in JSON bodies.
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Proved.is_terminal());
        assert!(TaskState::Outputted.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Received.is_terminal());
        assert!(!TaskState::Packed.is_terminal());
        assert!(!TaskState::Dispatched.is_terminal());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&TaskState::Outputted).unwrap();
        assert_eq!(json, "\"outputted\"");
        let parsed: TaskState = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, TaskState::Failed);
    }

    #[test]
    fn test_task_roundtrip() {
        let task = Task {
            id: 8,
            project_id: 1,
            client_did: "did:io:abc".to_string(),
            project_version: "0.1".to_string(),
            payload: vec![0xde, 0xad],
            created_at: 1000,
        };
        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains("\"data\":\"dead\""));
        let parsed: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, task);
    }

    #[test]
    fn test_state_log_defaults() {
        let parsed: StateLog = serde_json::from_str(
            r#"{"taskID":8,"projectID":1,"state":"proved","createdAt":5}"#,
        )
        .unwrap();
        assert_eq!(parsed.task_id, 8);
        assert!(parsed.comment.is_empty());
        assert!(parsed.result.is_empty());
    }
}
