//! Coordinator wiring.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info};

use provenet_api::{router, ApiState, HttpCredentialService};
use provenet_chain::{parse_address, ChainClient};
use provenet_contract::{ContractTracker, TrackerConfig};
use provenet_core::{CoordinatorConfig, Envelope};
use provenet_dispatcher::{Dispatcher, MemoryPersistence, Persistence};
use provenet_pubsub::{EnvelopeHandler, Fabric, GossipConfig, GossipFabric};
use provenet_session::{Client, ClientStore, SessionRegistry};

use crate::Result;

/// Forwards fabric envelopes to the dispatcher once it exists. The fabric
/// must be built before the dispatcher (the dispatcher publishes through
/// it), so the inbound path is attached late.
#[derive(Default)]
struct LateHandler {
    dispatcher: OnceLock<Arc<Dispatcher>>,
}

#[async_trait]
impl EnvelopeHandler for LateHandler {
    async fn handle(&self, envelope: Envelope) {
        if let Some(dispatcher) = self.dispatcher.get() {
            dispatcher.handle(envelope).await;
        }
    }
}

/// The running coordinator and the shutdown channels of its tasks.
pub struct Coordinator {
    shutdown: Vec<mpsc::Sender<()>>,
}

impl Coordinator {
    /// Construct every component and start the long-lived tasks.
    pub async fn start(config: CoordinatorConfig) -> Result<Self> {
        // Sessions and known clients.
        let clients = Arc::new(ClientStore::new());
        for entry in &config.clients {
            clients.register(Client::new(&entry.client_did, entry.projects.iter().copied()));
        }
        info!("registered {} clients", clients.len());
        let sessions = Arc::new(SessionRegistry::new(clients, config.session_ttl()));

        // Storage. The in-memory adapter backs single-node deployments;
        // durable engines implement the same trait out of tree.
        let persistence: Arc<dyn Persistence> = Arc::new(MemoryPersistence::new());

        // Contract projection.
        let chain = Arc::new(ChainClient::new(&config.chain_endpoint));
        let tracker = Arc::new(ContractTracker::new(
            chain,
            TrackerConfig {
                epoch: config.epoch,
                scan_interval: config.scan_interval(),
                project_contract: parse_address(&config.project_contract)?,
                prover_contract: parse_address(&config.prover_contract)?,
                block_number_contract: parse_address(&config.block_number_contract)?,
                multicall_contract: parse_address(&config.multicall_contract)?,
            },
        ));
        let project_notifications = tracker.subscribe_projects();
        let (tracker_shutdown, tracker_shutdown_rx) = mpsc::channel(1);
        tracker.start(tracker_shutdown_rx).await?;

        // Fabric, then the dispatcher publishing through it.
        let handler = Arc::new(LateHandler::default());
        let fabric: Arc<dyn Fabric> = Arc::new(GossipFabric::spawn(
            GossipConfig {
                listen: config.pubsub.listen.clone(),
                bootstrap: config.pubsub.bootstrap.clone(),
            },
            handler.clone(),
        )?);
        let dispatcher = Dispatcher::new(persistence.clone(), fabric, config.poll_interval());
        let _ = handler.dispatcher.set(dispatcher.clone());

        let (dispatcher_shutdown, dispatcher_shutdown_rx) = mpsc::channel(1);
        let initial_projects = tracker.latest_projects();
        tokio::spawn(dispatcher.run(
            initial_projects,
            project_notifications,
            dispatcher_shutdown_rx,
        ));

        // HTTP ingress.
        let api_state = Arc::new(ApiState {
            sessions,
            persistence,
            credentials: Arc::new(HttpCredentialService::new(&config.credential_endpoint)),
        });
        let listener = tokio::net::TcpListener::bind(&config.api_listen).await?;
        info!("HTTP ingress listening on {}", config.api_listen);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router(api_state)).await {
                error!("HTTP ingress stopped: {}", e);
            }
        });

        Ok(Self { shutdown: vec![tracker_shutdown, dispatcher_shutdown] })
    }

    /// Signal every long-lived task to stop after its current iteration.
    pub async fn stop(&self) {
        for sender in &self.shutdown {
            let _ = sender.send(()).await;
        }
    }
}
