//! Tunable constants for the mesh core.
//!
//! Every value here is a default; `NodeConfig` and `RouterConfig` let callers
//! override the ones that are meant to be runtime-tunable.

use std::time::Duration;

/// Default remaining-hop budget for locally originated messages.
pub const DEFAULT_MESH_TTL: u32 = 5;

/// Hard ceiling on ttl a caller may request.
pub const MAX_MESH_TTL: u32 = 15;

/// How often the router scans the routing table for stale peers.
pub const PEER_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// A peer not heard from in this long transitions to `Stale`.
pub const PEER_STALE_TIMEOUT: Duration = Duration::from_secs(90);

/// How often the mesh node broadcasts a self peer-announce.
pub const PEER_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(15);

/// Time window after which a dedup-cache entry is eligible for eviction.
pub const MESSAGE_DEDUPLICATION_WINDOW: Duration = Duration::from_secs(300);

/// Hard cap on the number of entries the dedup cache may hold.
pub const MAX_DEDUPLICATION_CACHE_SIZE: usize = 10_000;

/// Default chunk size used when describing file transfers (announcement-only
/// at this layer; see `FileInfo`).
pub const DEFAULT_FILE_CHUNK_SIZE: u64 = 65_536;

/// Default cap on concurrent file transfers per peer (informative; chunk
/// transfer itself is out of scope for this core).
pub const MAX_CONCURRENT_FILE_TRANSFERS: usize = 3;

/// Default service name advertised by transports when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "flutter_p2p_mesh";
