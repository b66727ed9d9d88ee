//! Chain tailing engine: list + watch.
//!
//! The list phase bootstraps the history rings from current registry state
//! plus one epoch of replayed logs. The watch phase tails the chain one
//! block per tick, folds decoded logs into the rings, and pushes
//! notifications to subscribers over bounded channels — a slow subscriber
//! slows the engine rather than losing events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use provenet_chain::{ChainClient, ChainError, LogFilter, ProjectReader, ProverReader};
use provenet_core::Address;

use crate::decoder::{fold_project_logs, fold_prover_logs, DecodeError, ALL_TOPICS};
use crate::{BlockDiff, BlockHistory, Project, Prover, Snapshot};

/// Buffer size of subscriber channels. Deliberately small: a full channel
/// blocks the engine until the subscriber catches up.
pub const NOTIFICATION_CAPACITY: usize = 10;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Static parameters of the projection engine.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub epoch: u64,
    pub scan_interval: Duration,
    pub project_contract: Address,
    pub prover_contract: Address,
    pub block_number_contract: Address,
    pub multicall_contract: Address,
}

/// Block-indexed projection of the Project and Prover registries.
pub struct ContractTracker {
    config: TrackerConfig,
    client: Arc<ChainClient>,
    project_reader: ProjectReader,
    prover_reader: ProverReader,
    projects: Mutex<BlockHistory<Project>>,
    provers: Mutex<BlockHistory<Prover>>,
    project_subs: Mutex<Vec<mpsc::Sender<Project>>>,
    chain_head_subs: Mutex<Vec<mpsc::Sender<u64>>>,
}

impl ContractTracker {
    pub fn new(client: Arc<ChainClient>, config: TrackerConfig) -> Self {
        let project_reader = ProjectReader::new(
            client.clone(),
            config.project_contract,
            config.block_number_contract,
            config.multicall_contract,
        );
        let prover_reader = ProverReader::new(
            client.clone(),
            config.prover_contract,
            config.block_number_contract,
            config.multicall_contract,
        );
        Self {
            projects: Mutex::new(BlockHistory::new(config.epoch)),
            provers: Mutex::new(BlockHistory::new(config.epoch)),
            project_subs: Mutex::new(Vec::new()),
            chain_head_subs: Mutex::new(Vec::new()),
            project_reader,
            prover_reader,
            client,
            config,
        }
    }

    /// Bootstrap the history and spawn the watch loop. The loop stops after
    /// its current iteration once `shutdown` yields.
    pub async fn start(
        self: &Arc<Self>,
        shutdown: mpsc::Receiver<()>,
    ) -> Result<(), TrackerError> {
        let listed = self.list().await?;
        info!("contract projection listed up to block {}", listed);

        let tracker = self.clone();
        tokio::spawn(async move { tracker.watch(listed, shutdown).await });
        Ok(())
    }

    // === accessors ===

    /// Project state at a block; `None` when the project is unknown.
    pub fn project(&self, project_id: u64, block_number: u64) -> Option<Project> {
        self.projects.lock().entry_at(project_id, block_number)
    }

    /// Current project state; `None` when the project is unknown.
    pub fn latest_project(&self, project_id: u64) -> Option<Project> {
        self.project(project_id, u64::MAX)
    }

    /// Every currently known project.
    pub fn latest_projects(&self) -> Vec<Project> {
        self.projects.lock().latest().entries.into_values().collect()
    }

    /// Every prover as of a block.
    pub fn provers_at(&self, block_number: u64) -> Vec<Prover> {
        self.provers.lock().at(block_number).entries.into_values().collect()
    }

    /// Every currently known prover.
    pub fn latest_provers(&self) -> Vec<Prover> {
        self.provers_at(u64::MAX)
    }

    /// Current prover registered for an operator address.
    pub fn prover_by_operator(&self, operator: &Address) -> Option<Prover> {
        self.latest_provers().into_iter().find(|p| &p.operator == operator)
    }

    // === subscriptions ===

    /// Subscribe to per-project change notifications. The receiver must be
    /// drained; a full channel blocks the watch loop.
    pub fn subscribe_projects(&self) -> mpsc::Receiver<Project> {
        let (tx, rx) = mpsc::channel(NOTIFICATION_CAPACITY);
        self.project_subs.lock().push(tx);
        rx
    }

    /// Subscribe to new chain-head block numbers.
    pub fn subscribe_chain_head(&self) -> mpsc::Receiver<u64> {
        let (tx, rx) = mpsc::channel(NOTIFICATION_CAPACITY);
        self.chain_head_subs.lock().push(tx);
        rx
    }

    async fn notify_projects(&self, diff: &BlockDiff<Project>) {
        let senders = {
            let mut subs = self.project_subs.lock();
            subs.retain(|s| !s.is_closed());
            subs.clone()
        };
        for project in diff.entries.values() {
            for sender in &senders {
                let _ = sender.send(project.clone()).await;
            }
        }
    }

    async fn notify_chain_head(&self, block_number: u64) {
        let senders = {
            let mut subs = self.chain_head_subs.lock();
            subs.retain(|s| !s.is_closed());
            subs.clone()
        };
        for sender in &senders {
            let _ = sender.send(block_number).await;
        }
    }

    // === list phase ===

    async fn list(&self) -> Result<u64, TrackerError> {
        let mut projects = Vec::new();
        let mut id = 1;
        while let Some((state, block_number)) = self.project_reader.read(id).await? {
            projects.push(Project {
                id,
                uri: state.uri,
                hash: state.hash,
                paused: Some(state.paused),
                attributes: HashMap::new(),
                block_number,
            });
            id += 1;
        }

        let mut provers = Vec::new();
        let mut id = 1;
        while let Some((state, block_number)) = self.prover_reader.read(id).await? {
            provers.push(Prover {
                id,
                operator: state.operator,
                node_types: state.node_types,
                paused: Some(state.paused),
                block_number,
            });
            id += 1;
        }

        let observed = projects
            .iter()
            .map(|p| p.block_number)
            .chain(provers.iter().map(|p| p.block_number));
        let (min_seen, max_seen) = match observed.clone().min().zip(observed.max()) {
            Some(bounds) => bounds,
            // Empty registries: anchor the timeline at the current tip.
            None => {
                let tip = self.client.block_number().await?;
                (tip, tip)
            }
        };
        let min_block = min_seen.saturating_sub(self.config.epoch);

        let filter = LogFilter::new(
            &[self.config.prover_contract, self.config.project_contract],
            &ALL_TOPICS,
            min_block,
            max_seen,
        );
        let logs = self.client.get_logs(&filter).await?;
        debug!("list phase replaying {} logs from {} to {}", logs.len(), min_block, max_seen);

        let project_diffs = fold_project_logs(&logs)?;
        let prover_diffs = fold_prover_logs(&logs)?;

        {
            let mut history = self.projects.lock();
            seed_history(&mut history, projects, project_diffs, min_block, max_seen);
        }
        {
            let mut history = self.provers.lock();
            seed_history(&mut history, provers, prover_diffs, min_block, max_seen);
        }

        Ok(max_seen)
    }

    // === watch phase ===

    async fn watch(self: Arc<Self>, listed_block: u64, mut shutdown: mpsc::Receiver<()>) {
        let mut queried_block = listed_block;
        let mut ticker = tokio::time::interval(self.config.scan_interval);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("contract projection stopped at block {}", queried_block);
                    return;
                }
                _ = ticker.tick() => {}
            }

            let target = queried_block + 1;
            let filter = LogFilter::new(
                &[self.config.prover_contract, self.config.project_contract],
                &ALL_TOPICS,
                target,
                target,
            );
            let logs = match self.client.get_logs(&filter).await {
                Ok(logs) => logs,
                Err(e) if e.is_ahead_of_tip() => continue,
                Err(e) => {
                    warn!("failed to filter contract logs: {}", e);
                    continue;
                }
            };

            // Advance only when the whole batch decodes; a partial
            // projection would be worse than a late one.
            let project_diff = match fold_project_logs(&logs) {
                Ok(diffs) => single_block_diff(diffs, target),
                Err(e) => {
                    warn!("failed to decode project logs at block {}: {}", target, e);
                    continue;
                }
            };
            let prover_diff = match fold_prover_logs(&logs) {
                Ok(diffs) => single_block_diff(diffs, target),
                Err(e) => {
                    warn!("failed to decode prover logs at block {}: {}", target, e);
                    continue;
                }
            };

            self.projects.lock().add(project_diff.clone());
            self.provers.lock().add(prover_diff);

            self.notify_projects(&project_diff).await;
            self.notify_chain_head(target).await;

            queried_block = target;
        }
    }
}

/// Collapse the fold output of a single-block query into one diff,
/// substituting an empty diff so the timeline stays dense.
fn single_block_diff<S: Snapshot>(diffs: Vec<BlockDiff<S>>, block_number: u64) -> BlockDiff<S> {
    diffs
        .into_iter()
        .find(|d| d.block_number == block_number)
        .unwrap_or_else(|| BlockDiff::empty(block_number))
}

/// Seed a history ring from listed snapshots and replayed diffs.
///
/// Each snapshot absorbs the older per-block values for its id (newest to
/// oldest), reconstructing field provenance, and is stamped at the baseline
/// block. The ring then gets one diff per block up to `max_block` so every
/// block in the window is represented.
fn seed_history<S: Snapshot>(
    history: &mut BlockHistory<S>,
    snapshots: Vec<S>,
    diffs: Vec<BlockDiff<S>>,
    min_block: u64,
    max_block: u64,
) {
    let mut baseline = BlockDiff::empty(min_block);
    for mut snapshot in snapshots {
        for diff in diffs.iter().rev() {
            if diff.block_number >= snapshot.block_number() {
                continue;
            }
            if let Some(older) = diff.entries.get(&snapshot.id()) {
                snapshot.merge(older);
            }
        }
        snapshot.set_block_number(min_block);
        baseline.entries.insert(snapshot.id(), snapshot);
    }
    history.add(baseline);

    let mut by_block: HashMap<u64, BlockDiff<S>> =
        diffs.into_iter().map(|d| (d.block_number, d)).collect();
    for block in min_block + 1..=max_block {
        let diff = by_block.remove(&block).unwrap_or_else(|| BlockDiff::empty(block));
        history.add(diff);
    }
}
