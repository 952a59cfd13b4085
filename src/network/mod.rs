//! Peer-to-peer overlay
//!
//! The host exchanges framed, typed messages over one-shot TCP streams,
//! keeps a live peer table and discovers new peers from seeds and address
//! gossip without central coordination.

pub mod discovery;
pub mod message;
pub mod server;

pub use discovery::{Discovery, DiscoveryStats, MAX_PEERS, MIN_PEERS};
pub use message::{msg_type, AddrData, GetBlocksData, HeightData, Message, PROTOCOL_ID};
pub use server::{Network, PeerInfo};
