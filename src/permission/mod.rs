//! Permission negotiation with the client.
//!
//! - `bridge`: correlates outbound `session/requestPermission` requests with
//!   their responses.
//! - `policy`: answers requests locally when a decision is already known.

pub mod bridge;
pub mod policy;

pub use bridge::{OutboundSender, PermissionBridge};
pub use policy::{PermissionPolicy, PermissionRules, RememberingPolicy};
