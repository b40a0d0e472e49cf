//! Mesh Node: composition of the router with N transport adapters.
//!
//! `MeshNode` is the single owner of the adapter list. It drives the
//! periodic peer-announce protocol, applies auto-connect policy to newly
//! discovered peers, decodes/encodes wire frames at the transport
//! boundary, and dispatches locally delivered messages by type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::config::{NodeConfig, RouterConfig};
use crate::error::{Error, Result};
use crate::protocol::types::now_millis;
use crate::protocol::wire;
use crate::protocol::{
    DataPayload, FileInfo, Message, MessageId, MessageType, Peer, PeerAnnounce, PeerId, PeerState,
};
use crate::router::{DeliveredMessage, LinkSender, Router};
use crate::transport::{DiscoveredPeer, InboundFrame, PeerStateChange, Transport};

/// A `data` message delivered to the local application.
#[derive(Debug, Clone, PartialEq)]
pub struct DataMessageEvent {
    pub source_id: PeerId,
    pub source_username: String,
    pub payload: DataPayload,
}

/// The outward peer-update stream, unifying the router's two event kinds
/// (peer-update, peer-removed) into one subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerUpdate {
    Updated(Peer),
    Removed(PeerId),
}

/// File-transfer progress. Chunk assembly itself is out of scope for this
/// core; this stream is part of the outward API surface but nothing in
/// this crate publishes to it today since `fileChunk`/`fileChunkAck`/
/// `fileComplete` are reserved message types the core dispatch ignores.
#[derive(Debug, Clone, PartialEq)]
pub struct FileProgressEvent {
    pub file_id: String,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

struct RunningState {
    router: Arc<Router>,
    tasks: Vec<JoinHandle<()>>,
    discovered: Arc<RwLock<HashMap<PeerId, DiscoveredPeer>>>,
}

/// Composes a [`Router`] with one or more [`Transport`] adapters and
/// mediates between them.
pub struct MeshNode {
    config: NodeConfig,
    transports: Vec<Arc<dyn Transport>>,
    running: RwLock<Option<RunningState>>,
    message_tx: broadcast::Sender<DataMessageEvent>,
    peer_update_tx: broadcast::Sender<PeerUpdate>,
    file_progress_tx: broadcast::Sender<FileProgressEvent>,
}

impl MeshNode {
    pub fn new(config: NodeConfig, transports: Vec<Arc<dyn Transport>>) -> Result<Arc<Self>> {
        config.validate()?;
        let (message_tx, _) = broadcast::channel(256);
        let (peer_update_tx, _) = broadcast::channel(256);
        let (file_progress_tx, _) = broadcast::channel(32);
        Ok(Arc::new(Self {
            config,
            transports,
            running: RwLock::new(None),
            message_tx,
            peer_update_tx,
            file_progress_tx,
        }))
    }

    fn local_peer_descriptor(&self) -> Peer {
        Peer::new_direct(self.config.peer_id.clone(), self.config.username.clone())
    }

    async fn router(&self) -> Result<Arc<Router>> {
        self.running
            .read()
            .await
            .as_ref()
            .map(|s| s.router.clone())
            .ok_or(Error::NotInitialized)
    }

    // ---- lifecycle (start / stop) ----

    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.read().await.is_some() {
            return Ok(());
        }

        let sender: Arc<dyn LinkSender> = self.clone();
        let router = Router::new(
            self.config.peer_id.clone(),
            self.config.username.clone(),
            RouterConfig::default(),
            sender,
        );

        let mut tasks = router.spawn_maintenance();
        let discovered: Arc<RwLock<HashMap<PeerId, DiscoveredPeer>>> =
            Arc::new(RwLock::new(HashMap::new()));

        tasks.push(self.spawn_delivery_dispatch(router.clone()));
        tasks.push(self.spawn_peer_update_forwarder(router.clone()));
        tasks.push(self.spawn_peer_removal_forwarder(router.clone()));

        for transport in self.transports.iter().cloned() {
            if !transport.is_available().await {
                log::warn!("mesh: transport {:?} unavailable, skipping", transport.transport_kind());
                continue;
            }
            transport.initialize().await?;

            tasks.push(self.spawn_discovery_handler(transport.clone(), router.clone(), discovered.clone()));
            tasks.push(self.spawn_state_change_handler(transport.clone(), router.clone(), discovered.clone()));
            tasks.push(self.spawn_inbound_handler(transport.clone(), router.clone()));

            transport.start_discovery(&self.config.service_name).await?;
            if self.config.auto_advertise {
                transport
                    .start_advertising(&self.local_peer_descriptor(), &self.config.service_name)
                    .await?;
            }
        }

        tasks.push(self.spawn_announce_loop(router.clone()));

        *self.running.write().await = Some(RunningState {
            router,
            tasks,
            discovered,
        });
        log::info!("mesh: node started as {} ({})", self.config.username, self.config.peer_id);
        Ok(())
    }

    pub async fn stop(&self) {
        let state = self.running.write().await.take();
        let Some(state) = state else { return };

        for task in state.tasks {
            task.abort();
        }
        for transport in &self.transports {
            if let Err(e) = transport.stop_discovery().await {
                log::warn!("mesh: stop_discovery failed: {}", e);
            }
            if let Err(e) = transport.stop_advertising().await {
                log::warn!("mesh: stop_advertising failed: {}", e);
            }
            if let Err(e) = transport.dispose().await {
                log::warn!("mesh: dispose failed: {}", e);
            }
        }
        log::info!("mesh: node stopped");
    }

    // ---- background tasks ----

    fn spawn_delivery_dispatch(self: &Arc<Self>, router: Arc<Router>) -> JoinHandle<()> {
        let node = self.clone();
        let mut rx = router.subscribe_messages();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(delivered) => node.dispatch_delivered(&router, delivered).await,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn dispatch_delivered(&self, router: &Arc<Router>, delivered: DeliveredMessage) {
        let DeliveredMessage { message, received_from } = delivered;
        match message.message_type {
            MessageType::Data => match message.decode_payload::<DataPayload>() {
                Ok(payload) => {
                    let _ = self.message_tx.send(DataMessageEvent {
                        source_id: message.source_id,
                        source_username: message.source_username,
                        payload,
                    });
                }
                Err(e) => log::warn!("mesh: dropping data message with undecodable payload: {}", e),
            },
            MessageType::PeerAnnounce => match message.decode_payload::<PeerAnnounce>() {
                Ok(announce) => router.handle_peer_announce(announce, received_from).await,
                Err(e) => log::warn!("mesh: dropping malformed peer announce: {}", e),
            },
            MessageType::Ping => {
                let pong = Message {
                    id: MessageId::new_random(),
                    message_type: MessageType::Pong,
                    source_id: self.config.peer_id.clone(),
                    source_username: self.config.username.clone(),
                    target_ids: vec![message.source_id.clone()],
                    ttl: self.config.default_ttl,
                    created_at: now_millis(),
                    payload: None,
                };
                let pong = match pong.with_payload(&serde_json::json!({"pingId": message.id.as_str()})) {
                    Ok(m) => m,
                    Err(e) => {
                        log::warn!("mesh: failed to encode pong payload: {}", e);
                        return;
                    }
                };
                if let Err(e) = router.send_local(pong).await {
                    log::warn!("mesh: failed to send pong to {}: {}", message.source_id, e);
                }
            }
            _ => {
                // peerSync/routeRequest/routeResponse/ack/file* tags are
                // reserved - the router already forwarded them if addressed
                // elsewhere; local dispatch ignores them.
            }
        }
    }

    fn spawn_peer_update_forwarder(&self, router: Arc<Router>) -> JoinHandle<()> {
        let peer_update_tx = self.peer_update_tx.clone();
        let mut rx = router.subscribe_peer_updates();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(peer) => {
                        let _ = peer_update_tx.send(PeerUpdate::Updated(peer));
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn spawn_peer_removal_forwarder(&self, router: Arc<Router>) -> JoinHandle<()> {
        let peer_update_tx = self.peer_update_tx.clone();
        let mut rx = router.subscribe_peer_removals();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(id) => {
                        let _ = peer_update_tx.send(PeerUpdate::Removed(id));
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn spawn_discovery_handler(
        self: &Arc<Self>,
        transport: Arc<dyn Transport>,
        router: Arc<Router>,
        discovered: Arc<RwLock<HashMap<PeerId, DiscoveredPeer>>>,
    ) -> JoinHandle<()> {
        let node = self.clone();
        let mut rx = transport.subscribe_discovered();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(peer) => {
                        discovered.write().await.insert(peer.id.clone(), peer.clone());
                        if node.config.auto_connect && peer.id != node.config.peer_id {
                            node.maybe_auto_connect(&transport, &router, &peer).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn maybe_auto_connect(
        &self,
        transport: &Arc<dyn Transport>,
        router: &Arc<Router>,
        peer: &DiscoveredPeer,
    ) {
        let already_direct = router.get_peer(&peer.id).await.map(|p| p.is_direct()).unwrap_or(false);
        if already_direct {
            return;
        }
        match transport.connect(&peer.id).await {
            Ok(connected) => {
                let mut direct_peer = Peer::new_direct(connected.id, connected.username);
                direct_peer.transport_type = connected.transport_type;
                router.add_direct_peer(direct_peer).await;
            }
            Err(e) => log::warn!("mesh: auto-connect to {} failed: {}", peer.id, e),
        }
    }

    fn spawn_state_change_handler(
        &self,
        transport: Arc<dyn Transport>,
        router: Arc<Router>,
        discovered: Arc<RwLock<HashMap<PeerId, DiscoveredPeer>>>,
    ) -> JoinHandle<()> {
        let transport_kind = transport.transport_kind();
        let peer_update_tx = self.peer_update_tx.clone();
        tokio::spawn(async move {
            let mut rx = transport.subscribe_state_changes();
            loop {
                match rx.recv().await {
                    Ok(PeerStateChange { id, state: PeerState::Connected }) => {
                        let username = discovered
                            .read()
                            .await
                            .get(&id)
                            .map(|d| d.username.clone())
                            .unwrap_or_else(|| id.to_string());
                        let mut peer = Peer::new_direct(id, username);
                        peer.transport_type = transport_kind;
                        router.add_direct_peer(peer).await;
                    }
                    Ok(PeerStateChange { id, state: PeerState::Disconnected }) => {
                        router.remove_direct_peer(&id).await;
                    }
                    Ok(PeerStateChange { id, state }) => {
                        // Intermediate states (discovered/connecting/degraded/stale)
                        // carry no routing-table action at the mesh-node layer -
                        // the router's own health tick governs `stale` - but every
                        // adapter state change still goes out on the outward
                        // peer-update stream for a peer the router already knows.
                        if let Some(mut peer) = router.get_peer(&id).await {
                            peer.state = state;
                            let _ = peer_update_tx.send(PeerUpdate::Updated(peer));
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn spawn_inbound_handler(&self, transport: Arc<dyn Transport>, router: Arc<Router>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut rx = transport.subscribe_inbound();
            loop {
                match rx.recv().await {
                    Ok(InboundFrame { from, text }) => match wire::decode(&text) {
                        Ok(message) => {
                            let _ = router.process_incoming_message(message, from).await;
                        }
                        Err(e) => log::warn!("mesh: discarding malformed frame from {}: {}", from, e),
                    },
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn spawn_announce_loop(&self, router: Arc<Router>) -> JoinHandle<()> {
        let local_id = self.config.peer_id.clone();
        let local_username = self.config.username.clone();
        let interval = self.config.announce_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let snapshot = router.peers().await;
                let announce = router.build_self_announce(snapshot);
                let message = Message {
                    id: MessageId::new_random(),
                    message_type: MessageType::PeerAnnounce,
                    source_id: local_id.clone(),
                    source_username: local_username.clone(),
                    target_ids: vec![],
                    // Always ttl=1: this guarantees `source_id` equals the
                    // direct peer an announce arrived from, since a 1-ttl
                    // message is never forwarded past its first hop.
                    ttl: 1,
                    created_at: now_millis(),
                    payload: None,
                };
                let message = match message.with_payload(&announce) {
                    Ok(m) => m,
                    Err(e) => {
                        log::warn!("mesh: failed to encode self announce: {}", e);
                        continue;
                    }
                };
                if let Err(e) = router.send_local(message).await {
                    log::warn!("mesh: failed to send periodic announce: {}", e);
                }
            }
        })
    }

    // ---- outward API ----

    pub async fn broadcast(
        &self,
        text: impl Into<String>,
        files: Vec<FileInfo>,
        custom_data: HashMap<String, serde_json::Value>,
        ttl: Option<u32>,
    ) -> Result<()> {
        let router = self.router().await?;
        let message = self.build_data_message(vec![], text, files, custom_data, ttl)?;
        router.send_local(message).await
    }

    pub async fn send_to(
        &self,
        peer_ids: Vec<PeerId>,
        text: impl Into<String>,
        files: Vec<FileInfo>,
        custom_data: HashMap<String, serde_json::Value>,
        ttl: Option<u32>,
    ) -> Result<()> {
        let router = self.router().await?;
        let message = self.build_data_message(peer_ids, text, files, custom_data, ttl)?;
        router.send_local(message).await
    }

    pub async fn send_to_peer(
        &self,
        peer_id: PeerId,
        text: impl Into<String>,
        files: Vec<FileInfo>,
        custom_data: HashMap<String, serde_json::Value>,
        ttl: Option<u32>,
    ) -> Result<()> {
        let router = self.router().await?;
        if router.get_peer(&peer_id).await.is_none() {
            return Err(Error::PeerNotFound(peer_id.to_string()));
        }
        self.send_to(vec![peer_id], text, files, custom_data, ttl).await
    }

    fn build_data_message(
        &self,
        target_ids: Vec<PeerId>,
        text: impl Into<String>,
        files: Vec<FileInfo>,
        custom_data: HashMap<String, serde_json::Value>,
        ttl: Option<u32>,
    ) -> Result<Message> {
        let payload = DataPayload {
            text: text.into(),
            files,
            custom_data,
        };
        let message = Message {
            id: MessageId::new_random(),
            message_type: MessageType::Data,
            source_id: self.config.peer_id.clone(),
            source_username: self.config.username.clone(),
            target_ids,
            ttl: ttl.unwrap_or(self.config.default_ttl),
            created_at: now_millis(),
            payload: None,
        };
        message.with_payload(&payload)
    }

    pub async fn connect_to_peer(&self, peer_id: &PeerId) -> Result<()> {
        let router = self.router().await?;
        for transport in &self.transports {
            match transport.connect(peer_id).await {
                Ok(connected) => {
                    let mut peer = Peer::new_direct(connected.id, connected.username);
                    peer.transport_type = connected.transport_type;
                    router.add_direct_peer(peer).await;
                    return Ok(());
                }
                Err(e) => log::debug!("mesh: connect to {} via adapter failed: {}", peer_id, e),
            }
        }
        Err(Error::PeerNotFound(peer_id.to_string()))
    }

    pub async fn disconnect_peer(&self, peer_id: &PeerId) -> Result<()> {
        let router = self.router().await?;
        for transport in &self.transports {
            if transport.connected_peer_ids().contains(peer_id) {
                transport.disconnect(peer_id).await?;
            }
        }
        router.remove_direct_peer(peer_id).await;
        Ok(())
    }

    // ---- queries ----

    pub async fn peers(&self) -> Result<Vec<Peer>> {
        Ok(self.router().await?.peers().await)
    }

    pub async fn direct_peers(&self) -> Result<Vec<Peer>> {
        Ok(self.router().await?.direct_peers().await)
    }

    pub async fn peer_count(&self) -> Result<usize> {
        Ok(self.router().await?.peer_count().await)
    }

    pub async fn get_peer(&self, id: &PeerId) -> Result<Option<Peer>> {
        Ok(self.router().await?.get_peer(id).await)
    }

    // ---- subscriptions ----

    pub fn on_message(&self) -> broadcast::Receiver<DataMessageEvent> {
        self.message_tx.subscribe()
    }

    pub fn on_peer_update(&self) -> broadcast::Receiver<PeerUpdate> {
        self.peer_update_tx.subscribe()
    }

    pub fn on_file_progress(&self) -> broadcast::Receiver<FileProgressEvent> {
        self.file_progress_tx.subscribe()
    }
}

#[async_trait]
impl LinkSender for MeshNode {
    async fn send_to_direct_peer(&self, peer_id: &PeerId, message: &Message) -> Result<()> {
        let encoded = wire::encode(message)?;
        for transport in &self.transports {
            if transport.connected_peer_ids().contains(peer_id) {
                return transport.send(peer_id, &encoded).await;
            }
        }
        Err(Error::TransportUnavailable(peer_id.to_string()))
    }
}
