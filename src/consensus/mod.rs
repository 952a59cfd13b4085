//! Consensus loops
//!
//! Periodic block production, broadcast and inbound reconciliation against
//! the chain engine.

pub mod engine;

pub use engine::Engine;
