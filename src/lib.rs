//! p2pmesh - a transport-agnostic peer-to-peer mesh networking core.
//!
//! This crate turns a set of one-hop transports (each able to reach only
//! physically-nearby peers) into a resilient multi-hop overlay: it discovers
//! peers, maintains routing state, forwards application messages across
//! multiple hops with loop prevention, and delivers messages destined for the
//! local node.
//!
//! The crate is organized around the three subsystems a conforming core is
//! built from:
//!
//! - [`protocol`] - identifiers, the message model, and JSON wire framing.
//! - [`transport`] - the adapter contract every concrete radio/byte-pipe
//!   transport must satisfy; no concrete adapter ships here.
//! - [`router`] - the routing table, dedup cache, and forwarding logic.
//! - [`mesh`] - the node orchestrator composing a router with N adapters.
//!
//! Concrete transports (Wi-Fi Aware, Wi-Fi Direct, BLE, ...), file chunk
//! transfer, credential exchange, and platform availability probing are
//! deliberately out of scope; see `mesh::MeshNode` for the outward API a
//! host application drives.

pub mod config;
pub mod error;
pub mod mesh;
pub mod protocol;
pub mod router;
pub mod transport;

pub use config::NodeConfig;
pub use error::{Error, Result};
pub use mesh::MeshNode;
