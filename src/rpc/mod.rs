//! JSON-RPC 2.0 message model and wire codec.
//!
//! - `message`: the [`Message`] tagged union and [`RequestId`].
//! - `error`: the wire error object [`RpcError`] and standard codes.
//! - `codec`: envelope encode/decode plus the newline framer used by
//!   stream transports.
//! - `pending`: id allocation and response correlation for outbound calls.

pub mod codec;
pub mod error;
pub mod message;
pub mod pending;

pub use codec::{decode, encode, LineCodec};
pub use error::RpcError;
pub use message::{Message, Notification, Request, RequestId, Response, ResponsePayload};
pub use pending::{PendingCall, PendingCalls};
