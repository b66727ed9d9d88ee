//! In-memory persistence.
//!
//! Backs tests and single-node deployments; durable engines implement the
//! same trait out of tree.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use provenet_core::{unix_now, Message, StateLog, Task};

use crate::persistence::{Persistence, Result};

#[derive(Default)]
struct Inner {
    /// (project id, task id) → task
    tasks: HashMap<(u64, u64), Task>,
    /// project id → processed watermark
    watermarks: HashMap<u64, u64>,
    /// (project id, task id) → state logs in insertion order
    state_logs: HashMap<(u64, u64), Vec<StateLog>>,
    /// message id → messages
    messages: HashMap<String, Vec<Message>>,
    /// internal task id → tasks
    internal_tasks: HashMap<u64, Vec<Task>>,
    /// project id → next dense task id
    next_task_ids: HashMap<u64, u64>,
    next_internal_id: u64,
}

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct MemoryPersistence {
    inner: Mutex<Inner>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a task directly, keeping the dense id counter consistent.
    /// Test and bootstrap helper; ingress goes through `save_message`.
    pub fn insert_task(&self, task: Task) {
        let mut inner = self.inner.lock();
        let next = inner.next_task_ids.entry(task.project_id).or_insert(1);
        if task.id >= *next {
            *next = task.id + 1;
        }
        inner.tasks.insert((task.project_id, task.id), task);
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn processed_task_id(&self, project_id: u64) -> Result<u64> {
        Ok(self.inner.lock().watermarks.get(&project_id).copied().unwrap_or(0))
    }

    async fn upsert_processed_task(&self, project_id: u64, task_id: u64) -> Result<()> {
        self.inner.lock().watermarks.insert(project_id, task_id);
        Ok(())
    }

    async fn create(&self, state_log: &StateLog, task: &Task) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.tasks.entry((task.project_id, task.id)).or_insert_with(|| task.clone());
        inner
            .state_logs
            .entry((state_log.project_id, state_log.task_id))
            .or_default()
            .push(state_log.clone());
        Ok(())
    }

    async fn fetch(&self, project_id: u64, task_id: u64) -> Result<Option<Task>> {
        Ok(self.inner.lock().tasks.get(&(project_id, task_id)).cloned())
    }

    async fn fetch_message(&self, message_id: &str) -> Result<Vec<Message>> {
        Ok(self.inner.lock().messages.get(message_id).cloned().unwrap_or_default())
    }

    async fn fetch_task(&self, internal_task_id: u64) -> Result<Vec<Task>> {
        Ok(self.inner.lock().internal_tasks.get(&internal_task_id).cloned().unwrap_or_default())
    }

    async fn save_message(&self, message: Message) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.next_internal_id += 1;
        let internal_task_id = inner.next_internal_id;

        let next = inner.next_task_ids.entry(message.project_id).or_insert(1);
        let task_id = *next;
        *next += 1;

        let task = Task {
            id: task_id,
            project_id: message.project_id,
            client_did: message.client_did.clone(),
            project_version: message.project_version.clone(),
            payload: message.data.clone(),
            created_at: unix_now(),
        };
        inner.tasks.insert((message.project_id, task_id), task.clone());
        inner.internal_tasks.entry(internal_task_id).or_default().push(task);

        let stored = Message { internal_task_id, ..message };
        inner.messages.entry(stored.message_id.clone()).or_default().push(stored);
        Ok(())
    }

    async fn state_logs(&self, project_id: u64, task_id: u64) -> Result<Vec<StateLog>> {
        Ok(self
            .inner
            .lock()
            .state_logs
            .get(&(project_id, task_id))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provenet_core::TaskState;

    fn message(project_id: u64, data: &[u8]) -> Message {
        Message {
            message_id: "m-1".to_string(),
            client_did: "did:io:c1".to_string(),
            project_id,
            project_version: "0.1".to_string(),
            data: data.to_vec(),
            internal_task_id: 0,
        }
    }

    #[tokio::test]
    async fn test_watermark_not_found_is_zero() {
        let store = MemoryPersistence::new();
        assert_eq!(store.processed_task_id(1).await.unwrap(), 0);

        store.upsert_processed_task(1, 8).await.unwrap();
        store.upsert_processed_task(1, 9).await.unwrap();
        assert_eq!(store.processed_task_id(1).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_save_message_creates_dense_task_ids() {
        let store = MemoryPersistence::new();
        store.save_message(message(1, b"a")).await.unwrap();
        store.save_message(message(1, b"b")).await.unwrap();
        store.save_message(message(2, b"c")).await.unwrap();

        assert_eq!(store.fetch(1, 1).await.unwrap().unwrap().payload, b"a");
        assert_eq!(store.fetch(1, 2).await.unwrap().unwrap().payload, b"b");
        assert_eq!(store.fetch(2, 1).await.unwrap().unwrap().payload, b"c");
        assert_eq!(store.fetch(1, 3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_message_resolves_to_task() {
        let store = MemoryPersistence::new();
        store.save_message(message(1, b"a")).await.unwrap();

        let stored = store.fetch_message("m-1").await.unwrap();
        assert_eq!(stored.len(), 1);
        let tasks = store.fetch_task(stored[0].internal_task_id).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, 1);

        assert!(store.fetch_message("m-2").await.unwrap().is_empty());
        assert!(store.fetch_task(99).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_appends_state_logs() {
        let store = MemoryPersistence::new();
        store.save_message(message(1, b"a")).await.unwrap();
        let task = store.fetch(1, 1).await.unwrap().unwrap();

        for state in [TaskState::Received, TaskState::Proved] {
            let log = StateLog {
                task_id: 1,
                project_id: 1,
                state,
                comment: String::new(),
                result: Vec::new(),
                created_at: unix_now(),
            };
            store.create(&log, &task).await.unwrap();
        }

        let logs = store.state_logs(1, 1).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].state, TaskState::Received);
        assert_eq!(logs[1].state, TaskState::Proved);
    }

    #[tokio::test]
    async fn test_insert_task_keeps_counter_consistent() {
        let store = MemoryPersistence::new();
        store.insert_task(Task {
            id: 8,
            project_id: 1,
            client_did: "did:io:c1".to_string(),
            project_version: "0.1".to_string(),
            payload: Vec::new(),
            created_at: 0,
        });
        store.save_message(message(1, b"next")).await.unwrap();
        assert_eq!(store.fetch(1, 9).await.unwrap().unwrap().payload, b"next");
    }
}
