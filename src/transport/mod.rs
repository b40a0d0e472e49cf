//! Transport adapter contract.
//!
//! This module only defines the interface the core drives; it ships no
//! concrete adapter. See `traits::Transport` for the operations and
//! observable streams every adapter must provide. Concrete radio stacks
//! (Wi-Fi Aware session management, Wi-Fi Direct group formation, BLE
//! scan/advertise, ...) are intentionally left out of scope here.

pub mod traits;

pub use traits::{ConnectedPeer, DiscoveredPeer, InboundFrame, PeerStateChange, Transport};
