//! Node configuration.
//!
//! Mirrors the teacher's `config::Config` pattern of one struct per concern
//! with a validated constructor, scaled down to the handful of options
//! `MeshNode` recognises. There is no environment-file loading here (the
//! teacher's `ConfigurationManager` reads TOML from disk); this core has no
//! persistent state across restarts, so configuration is supplied
//! programmatically by the embedding application.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::constants::{
    DEFAULT_MESH_TTL, DEFAULT_SERVICE_NAME, PEER_ANNOUNCE_INTERVAL,
};
use crate::protocol::PeerId;

/// Options recognised when constructing a [`crate::mesh::MeshNode`].
///
/// `username` is the only required field; everything else has a sensible
/// default.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub username: String,
    pub peer_id: PeerId,
    pub service_name: String,
    pub default_ttl: u32,
    pub auto_connect: bool,
    pub auto_advertise: bool,
    pub announce_interval: Duration,
}

impl NodeConfig {
    /// A config with a freshly generated `peer_id` and every other default.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            peer_id: PeerId::new_random(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            default_ttl: DEFAULT_MESH_TTL,
            auto_connect: true,
            auto_advertise: true,
            announce_interval: PEER_ANNOUNCE_INTERVAL,
        }
    }

    pub fn with_peer_id(mut self, peer_id: impl Into<PeerId>) -> Self {
        self.peer_id = peer_id.into();
        self
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    pub fn with_default_ttl(mut self, ttl: u32) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    pub fn with_auto_advertise(mut self, enabled: bool) -> Self {
        self.auto_advertise = enabled;
        self
    }

    pub fn with_announce_interval(mut self, interval: Duration) -> Self {
        self.announce_interval = interval;
        self
    }

    /// Validated at `MeshNode::new` time: a missing username or an
    /// out-of-range ttl is a construction-time error, not a panic.
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(Error::Config("username must not be empty".into()));
        }
        if self.peer_id.as_str().trim().is_empty() {
            return Err(Error::Config("peer_id must not be empty".into()));
        }
        if self.default_ttl == 0 {
            return Err(Error::Config("default_ttl must be greater than zero".into()));
        }
        if self.default_ttl > crate::protocol::constants::MAX_MESH_TTL {
            return Err(Error::Config(format!(
                "default_ttl {} exceeds maxMeshTtl {}",
                self.default_ttl,
                crate::protocol::constants::MAX_MESH_TTL
            )));
        }
        Ok(())
    }
}

/// Tunable knobs for the [`crate::router::Router`]. These are not part of
/// `NodeConfig`'s recognised options, but the router needs *some* source
/// for them; the defaults are the only values a conforming node should
/// need in practice.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub health_check_interval: Duration,
    pub stale_timeout: Duration,
    pub dedup_window: Duration,
    pub max_dedup_cache_size: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            health_check_interval: crate::protocol::constants::PEER_HEALTH_CHECK_INTERVAL,
            stale_timeout: crate::protocol::constants::PEER_STALE_TIMEOUT,
            dedup_window: crate::protocol::constants::MESSAGE_DEDUPLICATION_WINDOW,
            max_dedup_cache_size: crate::protocol::constants::MAX_DEDUPLICATION_CACHE_SIZE,
        }
    }
}
