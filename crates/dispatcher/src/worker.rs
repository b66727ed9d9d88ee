//! Per-project dispatch worker.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use provenet_core::{Envelope, StateLog};
use provenet_pubsub::Fabric;

use crate::persistence::Persistence;
use crate::Result;

/// Inbound state-log buffer per project. Small on purpose: a backed-up
/// worker applies backpressure to the fabric delivery task.
const INBOUND_CAPACITY: usize = 10;

/// Handle to a project's serial dispatch worker.
///
/// The worker owns `next_task_id` without locks: task publication and
/// state-log handling are serialized on one task, and the handle only
/// passes messages in.
pub struct ProjectDispatcher {
    project_id: u64,
    inbound: mpsc::Sender<StateLog>,
}

impl ProjectDispatcher {
    /// Read the processed watermark and spawn the worker loop.
    pub async fn spawn(
        project_id: u64,
        persistence: Arc<dyn Persistence>,
        fabric: Arc<dyn Fabric>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let processed = persistence.processed_task_id(project_id).await?;
        let (inbound, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

        let worker = Worker {
            project_id,
            next_task_id: processed + 1,
            poll_interval,
            persistence,
            fabric,
            inbound: inbound_rx,
        };
        tokio::spawn(worker.run());

        Ok(Self { project_id, inbound })
    }

    pub fn project_id(&self) -> u64 {
        self.project_id
    }

    /// Forward an inbound state log to the worker. Blocks when the worker
    /// is backed up.
    pub async fn handle(&self, state_log: StateLog) {
        if self.inbound.send(state_log).await.is_err() {
            warn!("project {} dispatcher is gone, dropping state log", self.project_id);
        }
    }
}

struct Worker {
    project_id: u64,
    next_task_id: u64,
    poll_interval: Duration,
    persistence: Arc<dyn Persistence>,
    fabric: Arc<dyn Fabric>,
    inbound: mpsc::Receiver<StateLog>,
}

impl Worker {
    async fn run(mut self) {
        debug!(
            "project {} dispatcher starting at task {}",
            self.project_id, self.next_task_id
        );
        loop {
            tokio::select! {
                maybe_log = self.inbound.recv() => match maybe_log {
                    Some(state_log) => self.record_state_log(state_log).await,
                    None => {
                        debug!("project {} dispatcher stopped", self.project_id);
                        return;
                    }
                },
                _ = tokio::time::sleep(self.poll_interval) => self.try_publish().await,
            }
        }
    }

    /// Publish the task at the watermark, if persisted yet. Publication
    /// never advances `next_task_id`: the same task is republished every
    /// poll until a terminal state log arrives (at-least-once delivery).
    async fn try_publish(&mut self) {
        let task = match self.persistence.fetch(self.project_id, self.next_task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => return,
            Err(e) => {
                warn!("project {} failed to fetch task {}: {}", self.project_id, self.next_task_id, e);
                return;
            }
        };
        if let Err(e) = self.fabric.publish(self.project_id, &Envelope::task(task)).await {
            warn!("project {} failed to publish task {}: {}", self.project_id, self.next_task_id, e);
        }
    }

    async fn record_state_log(&mut self, state_log: StateLog) {
        if state_log.project_id != self.project_id {
            warn!(
                "project {} dispatcher received state log for project {}",
                self.project_id, state_log.project_id
            );
            return;
        }
        let task = match self.persistence.fetch(self.project_id, state_log.task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                warn!(
                    "project {} state log references unknown task {}",
                    self.project_id, state_log.task_id
                );
                return;
            }
            Err(e) => {
                warn!("project {} failed to fetch task {}: {}", self.project_id, state_log.task_id, e);
                return;
            }
        };

        if let Err(e) = self.persistence.create(&state_log, &task).await {
            warn!(
                "project {} failed to record {} for task {}: {}",
                self.project_id, state_log.state, state_log.task_id, e
            );
            return;
        }

        // Only a terminal log advances the watermark; duplicates for
        // already-processed tasks are recorded and otherwise ignored.
        if state_log.state.is_terminal() && state_log.task_id >= self.next_task_id {
            if let Err(e) = self
                .persistence
                .upsert_processed_task(self.project_id, state_log.task_id)
                .await
            {
                warn!(
                    "project {} failed to move watermark to {}: {}",
                    self.project_id, state_log.task_id, e
                );
                return;
            }
            self.next_task_id = state_log.task_id + 1;
            self.try_publish().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use provenet_core::{Task, TaskState};
    use provenet_pubsub::{EnvelopeHandler, LocalFabric};

    use crate::MemoryPersistence;

    const POLL: Duration = Duration::from_millis(10);
    const SETTLE: Duration = Duration::from_millis(120);

    #[derive(Default)]
    struct Recorder {
        published: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl EnvelopeHandler for Recorder {
        async fn handle(&self, envelope: Envelope) {
            if let Some(task) = envelope.task {
                self.published.lock().push(task.id);
            }
        }
    }

    fn task(project_id: u64, id: u64) -> Task {
        Task {
            id,
            project_id,
            client_did: "did:io:c1".to_string(),
            project_version: "0.1".to_string(),
            payload: b"payload".to_vec(),
            created_at: 0,
        }
    }

    fn state_log(project_id: u64, task_id: u64, state: TaskState) -> StateLog {
        StateLog {
            task_id,
            project_id,
            state,
            comment: String::new(),
            result: Vec::new(),
            created_at: 0,
        }
    }

    async fn setup() -> (Arc<MemoryPersistence>, Arc<Recorder>, ProjectDispatcher) {
        let persistence = Arc::new(MemoryPersistence::new());
        persistence.upsert_processed_task(1, 7).await.unwrap();
        persistence.insert_task(task(1, 8));
        persistence.insert_task(task(1, 9));

        let fabric = Arc::new(LocalFabric::new());
        let recorder = Arc::new(Recorder::default());
        fabric.attach(recorder.clone());
        fabric.add_topic(1).await.unwrap();

        let dispatcher =
            ProjectDispatcher::spawn(1, persistence.clone(), fabric, POLL).await.unwrap();
        (persistence, recorder, dispatcher)
    }

    #[tokio::test]
    async fn test_publishes_task_after_watermark() {
        let (_persistence, recorder, _dispatcher) = setup().await;
        tokio::time::sleep(SETTLE).await;

        let published = recorder.published.lock().clone();
        assert!(!published.is_empty());
        // Task 8 is republished, never advanced past, until acknowledged.
        assert!(published.iter().all(|&id| id == 8));
    }

    #[tokio::test]
    async fn test_terminal_log_advances_watermark() {
        let (persistence, recorder, dispatcher) = setup().await;
        tokio::time::sleep(SETTLE).await;

        dispatcher.handle(state_log(1, 8, TaskState::Failed)).await;
        tokio::time::sleep(SETTLE).await;

        assert_eq!(persistence.processed_task_id(1).await.unwrap(), 8);
        let published = recorder.published.lock().clone();
        assert!(published.contains(&9));
        // Strictly increasing: no task 9 before the last task 8.
        let first_nine = published.iter().position(|&id| id == 9).unwrap();
        assert!(published[..first_nine].iter().all(|&id| id == 8));
        assert!(published[first_nine..].iter().all(|&id| id == 9));
    }

    #[tokio::test]
    async fn test_non_terminal_log_does_not_advance() {
        let (persistence, _recorder, dispatcher) = setup().await;

        dispatcher.handle(state_log(1, 8, TaskState::Proved)).await;
        tokio::time::sleep(SETTLE).await;
        assert_eq!(persistence.processed_task_id(1).await.unwrap(), 7);
        assert_eq!(persistence.state_logs(1, 8).await.unwrap().len(), 1);

        dispatcher.handle(state_log(1, 8, TaskState::Outputted)).await;
        tokio::time::sleep(SETTLE).await;
        assert_eq!(persistence.processed_task_id(1).await.unwrap(), 8);
        // Both logs were recorded.
        assert_eq!(persistence.state_logs(1, 8).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_terminal_log_is_idempotent() {
        let (persistence, _recorder, dispatcher) = setup().await;

        dispatcher.handle(state_log(1, 8, TaskState::Failed)).await;
        dispatcher.handle(state_log(1, 8, TaskState::Failed)).await;
        tokio::time::sleep(SETTLE).await;

        assert_eq!(persistence.processed_task_id(1).await.unwrap(), 8);
        assert_eq!(persistence.state_logs(1, 8).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_task_log_ignored() {
        let (persistence, _recorder, dispatcher) = setup().await;

        dispatcher.handle(state_log(1, 42, TaskState::Failed)).await;
        tokio::time::sleep(SETTLE).await;

        assert_eq!(persistence.processed_task_id(1).await.unwrap(), 7);
        assert!(persistence.state_logs(1, 42).await.unwrap().is_empty());
    }
}
