//! An in-memory `Transport` test double and a shared switchboard that wires
//! multiple `MockTransport` instances together, so integration tests can
//! build real multi-hop topologies out of real `MeshNode`s (spec §4.3's
//! contract; this is the test harness SPEC_FULL.md calls for, not a
//! deliverable adapter).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use p2pmesh::error::{Error, Result};
use p2pmesh::protocol::{Peer, PeerId, PeerState, TransportKind};
use p2pmesh::transport::{ConnectedPeer, DiscoveredPeer, InboundFrame, PeerStateChange, Transport};

#[derive(Default)]
struct NetworkInner {
    nodes: HashMap<PeerId, Arc<MockTransport>>,
}

/// Shared registry every `MockTransport` in a test topology joins. `connect`
/// and `send` look the peer up here instead of doing any real I/O.
#[derive(Default, Clone)]
pub struct MockNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, transport: Arc<MockTransport>) {
        self.inner.lock().unwrap().nodes.insert(transport.id.clone(), transport);
    }

    fn get(&self, id: &PeerId) -> Option<Arc<MockTransport>> {
        self.inner.lock().unwrap().nodes.get(id).cloned()
    }
}

pub struct MockTransport {
    id: PeerId,
    username: String,
    network: MockNetwork,
    connected: Mutex<HashSet<PeerId>>,
    discovered_tx: broadcast::Sender<DiscoveredPeer>,
    state_tx: broadcast::Sender<PeerStateChange>,
    inbound_tx: broadcast::Sender<InboundFrame>,
}

impl MockTransport {
    /// Creates and registers a transport for `id`/`username` on `network`.
    pub fn new(network: &MockNetwork, id: impl Into<PeerId>, username: impl Into<String>) -> Arc<Self> {
        let (discovered_tx, _) = broadcast::channel(64);
        let (state_tx, _) = broadcast::channel(64);
        let (inbound_tx, _) = broadcast::channel(64);
        let transport = Arc::new(Self {
            id: id.into(),
            username: username.into(),
            network: network.clone(),
            connected: Mutex::new(HashSet::new()),
            discovered_tx,
            state_tx,
            inbound_tx,
        });
        network.register(transport.clone());
        transport
    }

    /// Test-only hook: simulate this transport discovering `peer` (spec
    /// §4.2's auto-connect path), without requiring a real advertise/scan
    /// cycle.
    pub fn simulate_discovery(&self, peer: &Peer) {
        let _ = self.discovered_tx.send(DiscoveredPeer {
            id: peer.id.clone(),
            username: peer.username.clone(),
            transport_type: peer.transport_type,
        });
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn transport_kind(&self) -> TransportKind {
        TransportKind::Lan
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn start_discovery(&self, _service_name: &str) -> Result<()> {
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<()> {
        Ok(())
    }

    async fn start_advertising(&self, _local_peer: &Peer, _service_name: &str) -> Result<()> {
        Ok(())
    }

    async fn stop_advertising(&self) -> Result<()> {
        Ok(())
    }

    async fn connect(&self, peer_id: &PeerId) -> Result<ConnectedPeer> {
        let target = self
            .network
            .get(peer_id)
            .ok_or_else(|| Error::PeerNotFound(peer_id.to_string()))?;

        self.connected.lock().unwrap().insert(peer_id.clone());
        target.connected.lock().unwrap().insert(self.id.clone());

        let _ = self.state_tx.send(PeerStateChange {
            id: peer_id.clone(),
            state: PeerState::Connected,
        });
        let _ = target.state_tx.send(PeerStateChange {
            id: self.id.clone(),
            state: PeerState::Connected,
        });

        Ok(ConnectedPeer {
            id: peer_id.clone(),
            username: target.username.clone(),
            transport_type: TransportKind::Lan,
        })
    }

    async fn disconnect(&self, peer_id: &PeerId) -> Result<()> {
        self.connected.lock().unwrap().remove(peer_id);
        if let Some(target) = self.network.get(peer_id) {
            target.connected.lock().unwrap().remove(&self.id);
            let _ = target.state_tx.send(PeerStateChange {
                id: self.id.clone(),
                state: PeerState::Disconnected,
            });
        }
        let _ = self.state_tx.send(PeerStateChange {
            id: peer_id.clone(),
            state: PeerState::Disconnected,
        });
        Ok(())
    }

    async fn send(&self, peer_id: &PeerId, text: &str) -> Result<()> {
        let target = self
            .network
            .get(peer_id)
            .ok_or_else(|| Error::TransportUnavailable(peer_id.to_string()))?;
        let _ = target.inbound_tx.send(InboundFrame {
            from: self.id.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn dispose(&self) -> Result<()> {
        Ok(())
    }

    fn connected_peer_ids(&self) -> Vec<PeerId> {
        self.connected.lock().unwrap().iter().cloned().collect()
    }

    fn subscribe_discovered(&self) -> broadcast::Receiver<DiscoveredPeer> {
        self.discovered_tx.subscribe()
    }

    fn subscribe_state_changes(&self) -> broadcast::Receiver<PeerStateChange> {
        self.state_tx.subscribe()
    }

    fn subscribe_inbound(&self) -> broadcast::Receiver<InboundFrame> {
        self.inbound_tx.subscribe()
    }
}
