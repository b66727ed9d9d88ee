//! libp2p gossipsub fabric.
//!
//! A single swarm task owns the network; `add_topic` and `publish` are
//! forwarded to it over a command channel, and inbound gossipsub messages
//! are parsed into envelopes and handed to the global handler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::swarm::SwarmEvent;
use libp2p::{gossipsub, mdns, noise, tcp, yamux, Multiaddr, SwarmBuilder};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use provenet_core::{project_topic, Envelope};

use crate::{EnvelopeHandler, Fabric, FabricError};

/// Command buffer between the fabric handle and the swarm task.
const COMMAND_CAPACITY: usize = 64;

/// Gossip fabric settings.
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Listen multiaddr, e.g. `/ip4/0.0.0.0/tcp/8000`
    pub listen: String,
    /// Peers to dial at startup
    pub bootstrap: Vec<String>,
}

#[derive(libp2p::swarm::NetworkBehaviour)]
struct FabricBehaviour {
    gossipsub: gossipsub::Behaviour,
    mdns: mdns::tokio::Behaviour,
}

enum Command {
    AddTopic(u64),
    Publish { project_id: u64, payload: Vec<u8> },
}

/// Networked fabric over gossipsub with mDNS peer discovery.
pub struct GossipFabric {
    commands: mpsc::Sender<Command>,
}

impl GossipFabric {
    /// Build the swarm and spawn its event loop.
    pub fn spawn(config: GossipConfig, handler: Arc<dyn EnvelopeHandler>) -> crate::Result<Self> {
        let mut swarm = SwarmBuilder::with_new_identity()
            .with_tokio()
            .with_tcp(
                tcp::Config::default().nodelay(true),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| FabricError::Unavailable(e.to_string()))?
            .with_behaviour(|key| {
                let gossipsub_config = gossipsub::ConfigBuilder::default()
                    .heartbeat_interval(Duration::from_secs(1))
                    .validation_mode(gossipsub::ValidationMode::Strict)
                    .build()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
                let gossipsub = gossipsub::Behaviour::new(
                    gossipsub::MessageAuthenticity::Signed(key.clone()),
                    gossipsub_config,
                )
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
                let mdns = mdns::tokio::Behaviour::new(
                    mdns::Config::default(),
                    key.public().to_peer_id(),
                )?;
                Ok(FabricBehaviour { gossipsub, mdns })
            })
            .map_err(|e| FabricError::Unavailable(e.to_string()))?
            .build();

        let listen: Multiaddr = config
            .listen
            .parse()
            .map_err(|_| FabricError::Config(format!("bad listen addr: {}", config.listen)))?;
        swarm
            .listen_on(listen)
            .map_err(|e| FabricError::Unavailable(e.to_string()))?;

        for peer in &config.bootstrap {
            match peer.parse::<Multiaddr>() {
                Ok(addr) => {
                    if let Err(e) = swarm.dial(addr) {
                        warn!("failed to dial bootstrap peer {}: {}", peer, e);
                    }
                }
                Err(_) => warn!("ignoring bad bootstrap addr {}", peer),
            }
        }

        let (commands, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        tokio::spawn(run_swarm(swarm, command_rx, handler));
        Ok(Self { commands })
    }
}

#[async_trait]
impl Fabric for GossipFabric {
    async fn add_topic(&self, project_id: u64) -> crate::Result<()> {
        self.commands
            .send(Command::AddTopic(project_id))
            .await
            .map_err(|_| FabricError::Unavailable("fabric task stopped".to_string()))
    }

    async fn publish(&self, project_id: u64, envelope: &Envelope) -> crate::Result<()> {
        self.commands
            .send(Command::Publish { project_id, payload: envelope.to_bytes() })
            .await
            .map_err(|_| FabricError::Unavailable("fabric task stopped".to_string()))
    }
}

async fn run_swarm(
    mut swarm: libp2p::Swarm<FabricBehaviour>,
    mut commands: mpsc::Receiver<Command>,
    handler: Arc<dyn EnvelopeHandler>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                None => {
                    info!("gossip fabric stopped");
                    return;
                }
                Some(Command::AddTopic(project_id)) => {
                    let topic = gossipsub::IdentTopic::new(project_topic(project_id));
                    if let Err(e) = swarm.behaviour_mut().gossipsub.subscribe(&topic) {
                        warn!("failed to subscribe to {}: {}", topic, e);
                    }
                }
                Some(Command::Publish { project_id, payload }) => {
                    let topic = gossipsub::IdentTopic::new(project_topic(project_id));
                    // Best-effort: no peers on the mesh yet is not fatal,
                    // the dispatcher republishes until acknowledged.
                    if let Err(e) = swarm.behaviour_mut().gossipsub.publish(topic, payload) {
                        debug!("publish to project {} deferred: {}", project_id, e);
                    }
                }
            },
            event = swarm.select_next_some() => match event {
                SwarmEvent::Behaviour(FabricBehaviourEvent::Gossipsub(
                    gossipsub::Event::Message { message, .. },
                )) => match Envelope::from_bytes(&message.data) {
                    Some(envelope) => handler.handle(envelope).await,
                    None => debug!("discarding malformed envelope on {}", message.topic),
                },
                SwarmEvent::Behaviour(FabricBehaviourEvent::Mdns(mdns::Event::Discovered(
                    peers,
                ))) => {
                    for (peer_id, _addr) in peers {
                        swarm.behaviour_mut().gossipsub.add_explicit_peer(&peer_id);
                    }
                }
                SwarmEvent::Behaviour(FabricBehaviourEvent::Mdns(mdns::Event::Expired(
                    peers,
                ))) => {
                    for (peer_id, _addr) in peers {
                        swarm.behaviour_mut().gossipsub.remove_explicit_peer(&peer_id);
                    }
                }
                SwarmEvent::NewListenAddr { address, .. } => {
                    info!("gossip fabric listening on {}", address);
                }
                _ => {}
            }
        }
    }
}
