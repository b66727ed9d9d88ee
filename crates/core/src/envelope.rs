//! Pub/sub wire envelope.
//!
//! Exactly one of `task` / `state_log` is set per message: the coordinator
//! publishes task envelopes outbound, provers reply with state-log
//! envelopes on the same topic.

use serde::{Deserialize, Serialize};

use crate::{StateLog, Task};

/// Topic name prefix; the full topic is `project-<projectID>`.
pub const TOPIC_PREFIX: &str = "project";

/// Topic name for a project.
pub fn project_topic(project_id: u64) -> String {
    format!("{}-{}", TOPIC_PREFIX, project_id)
}

/// Wire message exchanged on a project topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    #[serde(rename = "stateLog", skip_serializing_if = "Option::is_none")]
    pub state_log: Option<StateLog>,
}

impl Envelope {
    /// An outbound task publication.
    pub fn task(task: Task) -> Self {
        Self { task: Some(task), state_log: None }
    }

    /// An inbound prover acknowledgement.
    pub fn state_log(state_log: StateLog) -> Self {
        Self { task: None, state_log: Some(state_log) }
    }

    /// Exactly one discriminant must be set for the envelope to be valid.
    pub fn is_valid(&self) -> bool {
        self.task.is_some() != self.state_log.is_some()
    }

    /// Serialize to JSON bytes for the fabric.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Parse from JSON bytes. Returns `None` for malformed or ambiguous
    /// messages (both or neither discriminant set).
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let envelope: Self = serde_json::from_slice(data).ok()?;
        envelope.is_valid().then_some(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskState;

    fn test_task() -> Task {
        Task {
            id: 1,
            project_id: 7,
            client_did: "did:io:client".to_string(),
            project_version: "0.1".to_string(),
            payload: b"payload".to_vec(),
            created_at: 42,
        }
    }

    #[test]
    fn test_project_topic() {
        assert_eq!(project_topic(12), "project-12");
    }

    #[test]
    fn test_task_envelope_roundtrip() {
        let envelope = Envelope::task(test_task());
        let parsed = Envelope::from_bytes(&envelope.to_bytes()).unwrap();
        assert_eq!(parsed, envelope);
        assert!(parsed.state_log.is_none());
    }

    #[test]
    fn test_state_log_envelope_roundtrip() {
        let envelope = Envelope::state_log(StateLog {
            task_id: 1,
            project_id: 7,
            state: TaskState::Proved,
            comment: String::new(),
            result: vec![1, 2, 3],
            created_at: 42,
        });
        let parsed = Envelope::from_bytes(&envelope.to_bytes()).unwrap();
        assert_eq!(parsed, envelope);
        assert!(parsed.task.is_none());
    }

    #[test]
    fn test_empty_envelope_rejected() {
        assert!(Envelope::from_bytes(b"{}").is_none());
    }

    #[test]
    fn test_ambiguous_envelope_rejected() {
        let both = Envelope {
            task: Some(test_task()),
            state_log: Some(StateLog {
                task_id: 1,
                project_id: 7,
                state: TaskState::Proved,
                comment: String::new(),
                result: Vec::new(),
                created_at: 42,
            }),
        };
        assert!(Envelope::from_bytes(&both.to_bytes()).is_none());
    }
}
