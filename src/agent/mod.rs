//! Agent side of the protocol.
//!
//! - `service`: session lifecycle, dispatch, and prompt turns.
//! - `server`: binds the service to a transport.
//! - `session`: the session entity.
//! - `pending`: running-prompt registry and cancellation origins.
//! - `runtime`: prompt execution units.
//! - `cursor`: opaque `session/list` cursors.

pub mod cursor;
pub mod pending;
pub mod runtime;
pub mod server;
pub mod service;
pub mod session;

pub use pending::{CancelOrigin, PendingPrompts};
pub use runtime::{EchoExecutor, Executor, ExecutorFactory, ExecutorFuture};
pub use server::AgentServer;
pub use service::AgentService;
pub use session::Session;
