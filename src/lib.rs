#![forbid(unsafe_code)]

//! Agent Client Protocol engine.
//!
//! JSON-RPC 2.0 agent and client services over exchangeable transports:
//! this process's stdio, a spawned child's stdio, a WebSocket client, and a
//! multiplexing WebSocket server.

pub mod agent;
pub mod client;
pub mod config;
pub mod errors;
pub mod permission;
pub mod protocol;
pub mod rpc;
pub mod sync;
pub mod transport;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
