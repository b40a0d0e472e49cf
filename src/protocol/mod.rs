//! Identifiers, message model and wire framing.
//!
//! This module has no knowledge of routing or transports: it is the shared
//! vocabulary `mesh` and `transport` both speak.

pub mod constants;
pub mod types;
pub mod wire;

pub use types::{
    now_millis, DataPayload, EpochMillis, FileInfo, Message, MessageId, MessageType, Peer,
    PeerAnnounce, PeerId, PeerState, TransportKind,
};
