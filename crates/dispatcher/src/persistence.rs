//! Storage seam consumed by the dispatcher and the HTTP ingress.
//!
//! "Not found" is a well-defined empty result on every lookup, never an
//! error; errors mean the storage engine itself failed.

use async_trait::async_trait;
use thiserror::Error;

use provenet_core::{Message, StateLog, Task};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

#[async_trait]
pub trait Persistence: Send + Sync {
    /// Highest task id for the project whose terminal state log has been
    /// persisted; 0 when none has.
    async fn processed_task_id(&self, project_id: u64) -> Result<u64>;

    /// Record the per-project processed watermark. Idempotent.
    async fn upsert_processed_task(&self, project_id: u64, task_id: u64) -> Result<()>;

    /// Persist a state log together with its task, atomically for the
    /// pair. Duplicate `(task_id, state)` pairs are upserted.
    async fn create(&self, state_log: &StateLog, task: &Task) -> Result<()>;

    /// Task by project and task id.
    async fn fetch(&self, project_id: u64, task_id: u64) -> Result<Option<Task>>;

    /// Messages recorded under a message id; empty when unknown.
    async fn fetch_message(&self, message_id: &str) -> Result<Vec<Message>>;

    /// Tasks created from an internal task id; empty when unknown.
    async fn fetch_task(&self, internal_task_id: u64) -> Result<Vec<Task>>;

    /// Persist an ingress message and create its task with the next dense
    /// per-project task id.
    async fn save_message(&self, message: Message) -> Result<()>;

    /// State logs recorded for a task, in insertion order.
    async fn state_logs(&self, project_id: u64, task_id: u64) -> Result<Vec<StateLog>>;
}
