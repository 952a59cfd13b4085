//! RPC surface
//!
//! The HTTP endpoints the command-line wallet and status tooling depend
//! on: health, height, balance and transaction submission.

pub mod server;

pub use server::RpcServer;
