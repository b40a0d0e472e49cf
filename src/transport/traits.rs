//! The transport adapter contract.
//!
//! The core is polymorphic over any discovery-and-byte-pipe transport
//! (Wi-Fi Aware data path, Wi-Fi Aware message passing, Wi-Fi Direct with
//! out-of-band credential exchange, ...). No concrete adapter ships in this
//! crate; a `MockTransport` test double lives under `tests/` purely to
//! exercise `Router`/`MeshNode` against this contract.
//!
//! Contract guarantees the core relies on:
//! (a) the `peer_id` surfaced in inbound events equals the id previously
//!     reported as connected;
//! (b) `send` is FIFO per peer;
//! (c) disconnect-then-discovered is a valid re-learn sequence;
//! (d) text payloads are delivered whole - any chunking/reassembly below
//!     the MTU line (e.g. a `CHUNK:index:total:` header for message-passing
//!     transports) is the adapter's responsibility, invisible to the core.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::protocol::{Peer, PeerId, PeerState, TransportKind};

/// A peer surfaced by an adapter's discovery stream, before any connection
/// attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPeer {
    pub id: PeerId,
    pub username: String,
    pub transport_type: TransportKind,
}

/// A state transition an adapter reports for one of its peers, as observed
/// at the transport boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerStateChange {
    pub id: PeerId,
    pub state: PeerState,
}

/// One inbound frame: raw text received from a connected peer, not yet
/// decoded into a `Message` (that happens in `mesh` via `protocol::wire`).
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub from: PeerId,
    pub text: String,
}

/// The descriptor returned by a successful `connect`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedPeer {
    pub id: PeerId,
    pub username: String,
    pub transport_type: TransportKind,
}

/// Every adapter the mesh node drives must implement this trait. The three
/// observable streams are exposed as `tokio::sync::broadcast` subscriptions
/// so multiple internal consumers (and, in principle, test harnesses) can
/// observe the same adapter.
#[async_trait]
pub trait Transport: Send + Sync {
    /// A short tag identifying which kind of transport this is, used only
    /// for peer bookkeeping - the core never branches on it.
    fn transport_kind(&self) -> TransportKind;

    /// Platform/hardware probe. Called once at `MeshNode::start` before any
    /// other operation.
    async fn is_available(&self) -> bool;

    /// Idempotent one-time setup.
    async fn initialize(&self) -> Result<()>;

    /// Begin passive learning of nearby peers under `service_name`.
    async fn start_discovery(&self, service_name: &str) -> Result<()>;

    async fn stop_discovery(&self) -> Result<()>;

    /// Make ourselves findable, advertising `local_peer`'s descriptor.
    async fn start_advertising(&self, local_peer: &Peer, service_name: &str) -> Result<()>;

    async fn stop_advertising(&self) -> Result<()>;

    /// Establish a bidirectional byte channel to `peer_id`.
    async fn connect(&self, peer_id: &PeerId) -> Result<ConnectedPeer>;

    async fn disconnect(&self, peer_id: &PeerId) -> Result<()>;

    /// Best-effort text delivery to an already-connected peer. FIFO per
    /// peer (guarantee (b) above).
    async fn send(&self, peer_id: &PeerId, text: &str) -> Result<()>;

    /// Release all resources. Called once during `MeshNode::stop`.
    async fn dispose(&self) -> Result<()>;

    /// Peers this adapter currently holds an open channel to.
    fn connected_peer_ids(&self) -> Vec<PeerId>;

    fn subscribe_discovered(&self) -> broadcast::Receiver<DiscoveredPeer>;

    fn subscribe_state_changes(&self) -> broadcast::Receiver<PeerStateChange>;

    fn subscribe_inbound(&self) -> broadcast::Receiver<InboundFrame>;
}
