//! Router: routing table, dedup cache, TTL-bounded forwarding, peer-health
//! tracking.
//!
//! The router is the single owner of routing state: the routing table, the
//! direct-peer set, and the dedup cache are realized as one composite
//! struct behind a single `tokio::sync::RwLock` rather than one lock per
//! collection, so that `process_incoming_message` is atomic with respect to
//! `add_direct_peer`, `remove_direct_peer`, `handle_peer_announce`, and the
//! two periodic ticks by construction - no multi-lock ordering to get
//! wrong.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::config::RouterConfig;
use crate::error::{Error, Result};
use crate::protocol::types::{now_millis, EpochMillis};
use crate::protocol::{Message, MessageId, Peer, PeerAnnounce, PeerId, PeerState};

/// The callback the router uses to hand a message to a direct peer over
/// whichever transport currently holds it. `MeshNode` is the only
/// implementor in this crate; the router never reaches into adapters
/// itself - the mesh node is single-owner of adapter handles.
#[async_trait]
pub trait LinkSender: Send + Sync {
    async fn send_to_direct_peer(&self, peer_id: &PeerId, message: &Message) -> Result<()>;
}

/// Whether `process_incoming_message` did anything. Dedup hits are not
/// errors; this lets callers distinguish "dropped as a dup" from
/// "processed" without inventing an error for normal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Dropped,
    Processed,
}

/// A message delivered to the local application, paired with the direct
/// peer it arrived from. `MeshNode` needs the latter to install correct
/// `next_hop` pointers when the message is a peer announce: announces are
/// always sent at ttl=1, so `source_id` always equals this field.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredMessage {
    pub message: Message,
    pub received_from: PeerId,
}

/// Read-only diagnostics for callers that want table/cache size without
/// walking the full peer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterStats {
    pub peer_count: usize,
    pub direct_peer_count: usize,
    pub dedup_cache_size: usize,
}

struct DedupCache {
    order: VecDeque<MessageId>,
    seen: HashMap<MessageId, EpochMillis>,
    window: std::time::Duration,
    cap: usize,
}

impl DedupCache {
    fn new(window: std::time::Duration, cap: usize) -> Self {
        Self {
            order: VecDeque::new(),
            seen: HashMap::new(),
            window,
            cap,
        }
    }

    fn contains(&self, id: &MessageId) -> bool {
        self.seen.contains_key(id)
    }

    /// Insert `id` if absent. No-op (not a re-insert) if already present,
    /// matching insertion-order eviction rather than LRU touch-order.
    fn insert(&mut self, id: MessageId, now: EpochMillis) {
        if self.seen.contains_key(&id) {
            return;
        }
        self.order.push_back(id.clone());
        self.seen.insert(id, now);
        while self.order.len() > self.cap {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
    }

    /// Evict entries older than `now - window`. Eviction walks from the
    /// front since insertion order and chronological order coincide (the
    /// clock only moves forward).
    fn cleanup(&mut self, now: EpochMillis) {
        let cutoff = now.saturating_sub(self.window.as_millis() as u64);
        while let Some(oldest) = self.order.front() {
            match self.seen.get(oldest) {
                Some(ts) if *ts < cutoff => {
                    let id = self.order.pop_front().unwrap();
                    self.seen.remove(&id);
                }
                _ => break,
            }
        }
    }

    fn len(&self) -> usize {
        self.seen.len()
    }
}

struct RouterState {
    table: HashMap<PeerId, Peer>,
    direct: HashSet<PeerId>,
    dedup: DedupCache,
}

/// Owns the routing table and dedup cache. Constructed fresh by
/// `MeshNode` on every `start()` - no persistent state across restarts.
pub struct Router {
    local_id: PeerId,
    local_username: String,
    state: RwLock<RouterState>,
    link_sender: Arc<dyn LinkSender>,
    config: RouterConfig,
    message_tx: broadcast::Sender<DeliveredMessage>,
    peer_update_tx: broadcast::Sender<Peer>,
    peer_removed_tx: broadcast::Sender<PeerId>,
}

impl Router {
    pub fn new(
        local_id: PeerId,
        local_username: impl Into<String>,
        config: RouterConfig,
        link_sender: Arc<dyn LinkSender>,
    ) -> Arc<Self> {
        let dedup = DedupCache::new(config.dedup_window, config.max_dedup_cache_size);
        let (message_tx, _) = broadcast::channel(256);
        let (peer_update_tx, _) = broadcast::channel(256);
        let (peer_removed_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            local_id,
            local_username: local_username.into(),
            state: RwLock::new(RouterState {
                table: HashMap::new(),
                direct: HashSet::new(),
                dedup,
            }),
            link_sender,
            config,
            message_tx,
            peer_update_tx,
            peer_removed_tx,
        })
    }

    pub fn subscribe_messages(&self) -> broadcast::Receiver<DeliveredMessage> {
        self.message_tx.subscribe()
    }

    pub fn subscribe_peer_updates(&self) -> broadcast::Receiver<Peer> {
        self.peer_update_tx.subscribe()
    }

    pub fn subscribe_peer_removals(&self) -> broadcast::Receiver<PeerId> {
        self.peer_removed_tx.subscribe()
    }

    fn emit_peer_update(&self, peer: Peer) {
        let _ = self.peer_update_tx.send(peer);
    }

    fn emit_peer_removed(&self, id: PeerId) {
        let _ = self.peer_removed_tx.send(id);
    }

    // ---- queries ----

    pub async fn peers(&self) -> Vec<Peer> {
        self.state.read().await.table.values().cloned().collect()
    }

    pub async fn direct_peers(&self) -> Vec<Peer> {
        let state = self.state.read().await;
        state
            .direct
            .iter()
            .filter_map(|id| state.table.get(id).cloned())
            .collect()
    }

    pub async fn peer_count(&self) -> usize {
        self.state.read().await.table.len()
    }

    pub async fn get_peer(&self, id: &PeerId) -> Option<Peer> {
        self.state.read().await.table.get(id).cloned()
    }

    pub async fn stats(&self) -> RouterStats {
        let state = self.state.read().await;
        RouterStats {
            peer_count: state.table.len(),
            direct_peer_count: state.direct.len(),
            dedup_cache_size: state.dedup.len(),
        }
    }

    // ---- direct peer lifecycle ----

    pub async fn add_direct_peer(&self, mut peer: Peer) {
        peer.hop_count = 0;
        peer.next_hop_peer_id = None;
        peer.state = PeerState::Connected;
        peer.last_seen_at = now_millis();

        let mut state = self.state.write().await;
        state.direct.insert(peer.id.clone());
        state.table.insert(peer.id.clone(), peer.clone());
        drop(state);

        log::info!("router: direct peer added: {}", peer.id);
        self.emit_peer_update(peer);
    }

    /// Cascading by one level: any peer whose `next_hop_peer_id` pointed at
    /// `removed_id` is evicted too. Second-level indirect peers are
    /// re-learned when the remaining direct peers next announce.
    pub async fn remove_direct_peer(&self, removed_id: &PeerId) {
        let mut removed_ids = Vec::new();
        {
            let mut state = self.state.write().await;
            state.direct.remove(removed_id);

            if state.table.remove(removed_id).is_some() {
                removed_ids.push(removed_id.clone());
            }

            let cascade: Vec<PeerId> = state
                .table
                .iter()
                .filter(|(_, p)| p.next_hop_peer_id.as_ref() == Some(removed_id))
                .map(|(id, _)| id.clone())
                .collect();
            for id in cascade {
                state.table.remove(&id);
                removed_ids.push(id);
            }
        }

        for id in removed_ids {
            log::info!("router: peer removed (cascade from {}): {}", removed_id, id);
            self.emit_peer_removed(id);
        }
    }

    // ---- peer announce handling ----

    pub async fn handle_peer_announce(&self, announce: PeerAnnounce, received_from: PeerId) {
        let mut updates = Vec::new();
        {
            let mut state = self.state.write().await;
            let now = now_millis();

            if let Some(existing) = state.table.get_mut(&received_from) {
                existing.last_seen_at = now;
                if existing.state == PeerState::Stale {
                    existing.state = PeerState::Connected;
                    updates.push(existing.clone());
                }
            }

            for known in announce.known_peers.iter() {
                if known.id == self.local_id {
                    continue;
                }
                let candidate_hop_count = known.hop_count + 1;

                let should_install = match state.table.get(&known.id) {
                    None => true,
                    Some(existing) => existing.hop_count > candidate_hop_count,
                };

                if should_install {
                    let installed = Peer {
                        id: known.id.clone(),
                        username: known.username.clone(),
                        transport_type: known.transport_type,
                        state: PeerState::Connected,
                        address: known.address.clone(),
                        port: known.port,
                        last_seen_at: now,
                        hop_count: candidate_hop_count,
                        next_hop_peer_id: Some(received_from.clone()),
                        metadata: known.metadata.clone(),
                    };
                    state.table.insert(known.id.clone(), installed.clone());
                    updates.push(installed);
                } else if let Some(existing) = state.table.get_mut(&known.id) {
                    // Ties and longer routes keep the earlier-learned next
                    // hop - no swap - but being named in an announce at all
                    // is still proof of life for the peer being described.
                    existing.last_seen_at = now;
                    if existing.state == PeerState::Stale {
                        existing.state = PeerState::Connected;
                        updates.push(existing.clone());
                    }
                }
            }
        }

        for peer in updates {
            self.emit_peer_update(peer);
        }
    }

    pub fn build_self_announce(&self, table_snapshot: Vec<Peer>) -> PeerAnnounce {
        let self_peer = Peer {
            id: self.local_id.clone(),
            username: self.local_username.clone(),
            transport_type: crate::protocol::TransportKind::Unknown,
            state: PeerState::Connected,
            address: None,
            port: None,
            last_seen_at: now_millis(),
            hop_count: 0,
            next_hop_peer_id: None,
            metadata: HashMap::new(),
        };
        let known_peers = table_snapshot
            .into_iter()
            .filter(|p| p.id != self.local_id)
            .collect();
        PeerAnnounce {
            peer: self_peer,
            known_peers,
        }
    }

    // ---- next-hop resolution ----

    async fn next_hop(&self, target: &PeerId) -> Option<PeerId> {
        let state = self.state.read().await;
        if state.direct.contains(target) {
            return Some(target.clone());
        }
        state
            .table
            .get(target)
            .and_then(|p| p.next_hop_peer_id.clone())
    }

    // ---- inbound message pipeline ----

    pub async fn process_incoming_message(
        &self,
        message: Message,
        received_from: PeerId,
    ) -> Result<ProcessOutcome> {
        let now = now_millis();
        let mut reactivated = None;
        {
            let mut state = self.state.write().await;
            if state.dedup.contains(&message.id) {
                log::debug!("router: dropping duplicate message {}", message.id);
                return Ok(ProcessOutcome::Dropped);
            }
            state.dedup.insert(message.id.clone(), now);

            if let Some(existing) = state.table.get_mut(&message.source_id) {
                existing.last_seen_at = now;
                if existing.state == PeerState::Stale {
                    existing.state = PeerState::Connected;
                    reactivated = Some(existing.clone());
                }
            }
        }

        if let Some(peer) = reactivated {
            self.emit_peer_update(peer);
        }

        let is_for_us = message.is_addressed_to(&self.local_id);
        if is_for_us {
            let _ = self.message_tx.send(DeliveredMessage {
                message: message.clone(),
                received_from: received_from.clone(),
            });
        }

        let is_broadcast = message.is_broadcast();
        let has_other_target = message
            .target_ids
            .iter()
            .any(|t| t != &self.local_id);
        let should_forward = is_broadcast || has_other_target;

        if should_forward {
            self.forward(message, &received_from).await;
        }

        Ok(ProcessOutcome::Processed)
    }

    /// Forwarding rule: decrement ttl; drop silently if the
    /// post-decrement ttl is `<= 0`; otherwise broadcast to every direct
    /// peer except the one it arrived from, or resolve per-target next
    /// hops (deduplicated, skipping any that bounce back to the sender).
    async fn forward(&self, message: Message, received_from: &PeerId) {
        if message.ttl == 0 {
            return;
        }
        let mut forwarded = message;
        forwarded.ttl -= 1;
        if forwarded.ttl == 0 {
            log::debug!("router: ttl expired for message {}, not forwarding", forwarded.id);
            return;
        }

        if forwarded.is_broadcast() {
            let direct: Vec<PeerId> = {
                let state = self.state.read().await;
                state.direct.iter().cloned().collect()
            };
            let mut any_sent = false;
            for peer_id in direct {
                if &peer_id == received_from {
                    continue;
                }
                match self.link_sender.send_to_direct_peer(&peer_id, &forwarded).await {
                    Ok(()) => any_sent = true,
                    Err(e) => log::warn!("router: forward to {} failed: {}", peer_id, e),
                }
            }
            let _ = any_sent;
        } else {
            let mut next_hops = HashSet::new();
            for target in forwarded.target_ids.iter() {
                if target == &self.local_id {
                    continue;
                }
                if let Some(hop) = self.next_hop(target).await {
                    if &hop == received_from {
                        continue;
                    }
                    next_hops.insert(hop);
                }
            }
            for hop in next_hops {
                if let Err(e) = self.link_sender.send_to_direct_peer(&hop, &forwarded).await {
                    log::warn!("router: forward to {} failed: {}", hop, e);
                }
            }
        }
    }

    // ---- locally originated send ----

    /// Pre-marks the message id as seen so that an echo arriving back (e.g.
    /// via a triangle topology) is suppressed by dedup rather than
    /// delivered or re-forwarded.
    pub async fn send_local(&self, message: Message) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.dedup.insert(message.id.clone(), now_millis());
        }

        if message.is_broadcast() {
            let direct: Vec<PeerId> = {
                let state = self.state.read().await;
                state.direct.iter().cloned().collect()
            };
            for peer_id in direct {
                if let Err(e) = self.link_sender.send_to_direct_peer(&peer_id, &message).await {
                    log::warn!("router: send to {} failed: {}", peer_id, e);
                }
            }
            Ok(())
        } else {
            let mut next_hops = HashSet::new();
            for target in message.target_ids.iter() {
                if let Some(hop) = self.next_hop(target).await {
                    next_hops.insert(hop);
                }
            }
            if next_hops.is_empty() {
                return Err(Error::RoutingUnavailable);
            }
            for hop in next_hops {
                if let Err(e) = self.link_sender.send_to_direct_peer(&hop, &message).await {
                    log::warn!("router: send to {} failed: {}", hop, e);
                }
            }
            Ok(())
        }
    }

    // ---- periodic maintenance ----

    async fn health_tick(&self) {
        let mut updates = Vec::new();
        {
            let mut state = self.state.write().await;
            let now = now_millis();
            let cutoff = now.saturating_sub(self.config.stale_timeout.as_millis() as u64);
            for peer in state.table.values_mut() {
                if peer.last_seen_at < cutoff && peer.state != PeerState::Stale {
                    peer.state = PeerState::Stale;
                    updates.push(peer.clone());
                }
            }
        }
        for peer in updates {
            log::debug!("router: peer {} marked stale", peer.id);
            self.emit_peer_update(peer);
        }
    }

    async fn dedup_cleanup_tick(&self) {
        let mut state = self.state.write().await;
        state.dedup.cleanup(now_millis());
    }

    /// Spawns the health-check and dedup-cleanup timer loops. `MeshNode`
    /// owns the returned handles and aborts them on `stop()`.
    pub fn spawn_maintenance(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let health = {
            let router = self.clone();
            let interval = self.config.health_check_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    router.health_tick().await;
                }
            })
        };
        let dedup = {
            let router = self.clone();
            let interval = self.config.dedup_window;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    router.dedup_cleanup_tick().await;
                }
            })
        };
        vec![health, dedup]
    }
}
