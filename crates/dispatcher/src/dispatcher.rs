//! Process-wide dispatch root.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use provenet_contract::Project;
use provenet_core::Envelope;
use provenet_pubsub::{EnvelopeHandler, Fabric};

use crate::persistence::Persistence;
use crate::worker::ProjectDispatcher;

/// Routes inbound state logs to per-project dispatchers and creates a
/// dispatcher the first time a project is observed on chain.
///
/// The registry is keyed by project id; creation happens only on the run
/// loop, so there is at most one dispatcher per project.
pub struct Dispatcher {
    persistence: Arc<dyn Persistence>,
    fabric: Arc<dyn Fabric>,
    poll_interval: Duration,
    project_dispatchers: DashMap<u64, Arc<ProjectDispatcher>>,
}

impl Dispatcher {
    pub fn new(
        persistence: Arc<dyn Persistence>,
        fabric: Arc<dyn Fabric>,
        poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            persistence,
            fabric,
            poll_interval,
            project_dispatchers: DashMap::new(),
        })
    }

    /// Create dispatchers for every already-known project, then keep
    /// consuming contract projection notifications until shutdown.
    pub async fn run(
        self: Arc<Self>,
        initial_projects: Vec<Project>,
        mut project_notifications: mpsc::Receiver<Project>,
        mut shutdown: mpsc::Receiver<()>,
    ) {
        for project in initial_projects {
            self.ensure_project_dispatcher(&project).await;
        }
        info!("dispatcher running with {} projects", self.project_dispatchers.len());

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("dispatcher stopped");
                    return;
                }
                maybe_project = project_notifications.recv() => match maybe_project {
                    Some(project) => self.ensure_project_dispatcher(&project).await,
                    None => {
                        info!("project notifications closed, dispatcher stopped");
                        return;
                    }
                }
            }
        }
    }

    pub fn has_project(&self, project_id: u64) -> bool {
        self.project_dispatchers.contains_key(&project_id)
    }

    async fn ensure_project_dispatcher(&self, project: &Project) {
        if project.id == 0 || self.project_dispatchers.contains_key(&project.id) {
            return;
        }
        if let Err(e) = self.fabric.add_topic(project.id).await {
            warn!("failed to register topic for project {}: {}", project.id, e);
            return;
        }
        match ProjectDispatcher::spawn(
            project.id,
            self.persistence.clone(),
            self.fabric.clone(),
            self.poll_interval,
        )
        .await
        {
            Ok(dispatcher) => {
                self.project_dispatchers
                    .entry(project.id)
                    .or_insert_with(|| Arc::new(dispatcher));
                debug!("created dispatcher for project {}", project.id);
            }
            Err(e) => warn!("failed to create dispatcher for project {}: {}", project.id, e),
        }
    }
}

#[async_trait]
impl EnvelopeHandler for Dispatcher {
    /// Task envelopes are outbound-only and skipped; state logs route to
    /// their project's worker by message passing.
    async fn handle(&self, envelope: Envelope) {
        let Some(state_log) = envelope.state_log else {
            return;
        };
        let dispatcher = self
            .project_dispatchers
            .get(&state_log.project_id)
            .map(|entry| entry.value().clone());
        match dispatcher {
            Some(dispatcher) => dispatcher.handle(state_log).await,
            None => debug!("no dispatcher for project {}, dropping state log", state_log.project_id),
        }
    }
}
