//! Concurrency primitives shared by the transports.
//!
//! - `gate`: bounded in-flight send permits.
//! - `retry`: exponential backoff decisions for reconnect and heartbeat.

pub mod gate;
pub mod retry;

pub use gate::{BackpressureGate, GatePermit};
pub use retry::RetryPolicy;
