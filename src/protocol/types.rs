//! Core value types for the mesh overlay.
//!
//! Peers, messages and their payloads are immutable value types; nothing
//! here owns a lock or a socket. Mutation of shared state happens only
//! inside the router (`crate::mesh::router`).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, globally unique peer identifier. Wraps a UUIDv4 string by
/// convention but any unique string is accepted (transports may hand us
/// peer ids that predate this crate's involvement).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque, collision-resistant message identifier, assigned once by the
/// originator and never changed by forwarders. Used as the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The transport a peer was last seen over. Purely descriptive; the core
/// does not branch on it (the transport adapter abstraction exists so it
/// never has to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    WifiAware,
    WifiDirect,
    Ble,
    Lan,
    WebRtc,
    Unknown,
}

impl Default for TransportKind {
    fn default() -> Self {
        TransportKind::Unknown
    }
}

/// Lifecycle state of a peer.
///
/// `discovered -> connecting -> connected -> (degraded <-> connected) ->
/// disconnected|stale`. `Stale` is a soft terminal: any later proof of life
/// returns a peer to `Connected`. `Disconnected` only applies while a peer
/// is being evicted; it does not linger in the table in that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
    Discovered,
    Connecting,
    Connected,
    Degraded,
    Stale,
    Disconnected,
}

/// Milliseconds since the Unix epoch, monotonic-ish in practice; we use
/// wall-clock time because it must be comparable across processes (peer
/// announces carry hop counts, not timestamps, so clock skew between
/// nodes never affects routing decisions — only the local staleness check
/// in the health tick reads `now()` against locally-recorded values).
pub type EpochMillis = u64;

pub fn now_millis() -> EpochMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A node in the mesh, as known to the local router. Field invariant:
/// `hop_count == 0 <=> next_hop_peer_id.is_none()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub username: String,
    pub transport_type: TransportKind,
    pub state: PeerState,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub last_seen_at: EpochMillis,
    pub hop_count: u32,
    pub next_hop_peer_id: Option<PeerId>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Peer {
    /// A minimal direct-peer descriptor, as handed to the router by the
    /// mesh node when a transport reports a new connection.
    pub fn new_direct(id: PeerId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            transport_type: TransportKind::Unknown,
            state: PeerState::Connected,
            address: None,
            port: None,
            last_seen_at: now_millis(),
            hop_count: 0,
            next_hop_peer_id: None,
            metadata: HashMap::new(),
        }
    }

    pub fn is_direct(&self) -> bool {
        self.hop_count == 0
    }
}

/// Metadata describing a file without transferring it. Transfer of the
/// actual chunks is out of scope for this core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    #[serde(default)]
    pub sha256: Option<String>,
    pub host_peer_id: PeerId,
    pub chunk_size: u64,
    pub total_chunks: u64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// The payload of a `data` message: free text, file announcements, and an
/// opaque application-defined extension point.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataPayload {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub files: Vec<FileInfo>,
    #[serde(default)]
    pub custom_data: HashMap<String, serde_json::Value>,
}

/// A node's self-description plus its local view of the rest of the mesh,
/// broadcast periodically to bootstrap and maintain routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerAnnounce {
    pub peer: Peer,
    pub known_peers: Vec<Peer>,
}

/// The wire-stable message-type tag set. Only `Data`, `PeerAnnounce`,
/// `Ping`, and `Pong` are interpreted by the core; the rest are reserved
/// and, if addressed elsewhere, forwarded unchanged. An unrecognised tag
/// on the wire decodes to `Unknown` and is dropped by the mesh node's
/// dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    Data,
    PeerAnnounce,
    PeerSync,
    RouteRequest,
    RouteResponse,
    Ack,
    FileAnnounce,
    FileChunk,
    FileChunkAck,
    FileComplete,
    Ping,
    Pong,
    #[serde(other)]
    Unknown,
}

/// The envelope every mesh message travels in, regardless of payload shape.
/// `id` is assigned once by the originator and must not change when
/// forwarded; `ttl` strictly decreases on each forward hop.
///
/// Field names match the wire keys exactly via `camelCase` renaming, so
/// this struct doubles as the wire frame — see
/// `crate::protocol::wire`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub source_id: PeerId,
    pub source_username: String,
    /// Ordered sequence of target peer ids. Empty means broadcast.
    #[serde(default)]
    pub target_ids: Vec<PeerId>,
    pub ttl: u32,
    pub created_at: EpochMillis,
    pub payload: Option<serde_json::Value>,
}

impl Message {
    pub fn is_broadcast(&self) -> bool {
        self.target_ids.is_empty()
    }

    pub fn is_addressed_to(&self, local_id: &PeerId) -> bool {
        self.is_broadcast() || self.target_ids.iter().any(|t| t == local_id)
    }

    pub fn decode_payload<T: serde::de::DeserializeOwned>(&self) -> crate::error::Result<T> {
        let value = self
            .payload
            .clone()
            .ok_or_else(|| crate::error::Error::Decode("message has no payload".into()))?;
        serde_json::from_value(value).map_err(crate::error::Error::Serialization)
    }

    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> crate::error::Result<Self> {
        self.payload = Some(serde_json::to_value(payload).map_err(crate::error::Error::Serialization)?);
        Ok(self)
    }
}
