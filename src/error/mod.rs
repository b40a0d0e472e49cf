//! Error types for p2pmesh
//!
//! Mirrors the teacher's pattern: a single `thiserror`-derived `Error` enum,
//! a crate-wide `Result` alias, and `#[from]` wrapping for the library errors
//! that surface at the edges (JSON decode, adapter I/O) rather than
//! stringifying them prematurely.

use thiserror::Error;

/// Result type alias for p2pmesh operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Operation invoked before `start()` or after `stop()`.
    #[error("mesh node not initialized")]
    NotInitialized,

    /// An explicit connect or send targeted a peer the local node has never heard of.
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    /// A targeted send had no resolvable next hop for any target.
    #[error("no route to any target peer")]
    RoutingUnavailable,

    /// No adapter currently holds the direct peer needed to deliver a frame.
    #[error("no transport holds direct peer: {0}")]
    TransportUnavailable(String),

    /// A wire frame failed to decode. Callers that see this at the API
    /// boundary raised it deliberately; internally it is logged and dropped
    /// per the failure semantics of the mesh node (malformed frames must not
    /// disturb other peers' flows).
    #[error("failed to decode wire frame: {0}")]
    Decode(String),

    /// A transport adapter reported an operation failure (connect, send,
    /// disconnect, dispose).
    #[error("transport error: {0}")]
    Transport(String),

    /// Node configuration failed validation (e.g. missing username).
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
