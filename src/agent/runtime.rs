//! Prompt execution units.
//!
//! The Agent Service owns one [`Executor`] per session and never looks
//! inside it: a prompt goes in as text and the response comes back as text.
//! Model-backed executors live outside this crate; [`EchoExecutor`] is the
//! built-in stand-in.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::Result;

/// Boxed future returned by [`Executor::prompt`].
pub type ExecutorFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// A session's prompt execution unit.
///
/// The future is dropped when the prompt is cancelled or times out, so
/// implementations must not rely on running to completion.
pub trait Executor: Send + Sync {
    /// Run one prompt and return the response text.
    ///
    /// # Errors
    ///
    /// Any error is reported to the client as an internal error.
    fn prompt(&self, text: String) -> ExecutorFuture<'_>;
}

/// Creates the execution unit for a new or forked session.
pub trait ExecutorFactory: Send + Sync {
    /// Executor for `session_id` working in `cwd`.
    fn create(&self, session_id: &str, cwd: &str) -> Arc<dyn Executor>;
}

/// Replies with the prompt text unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoExecutor;

impl Executor for EchoExecutor {
    fn prompt(&self, text: String) -> ExecutorFuture<'_> {
        Box::pin(async move { Ok(text) })
    }
}

impl ExecutorFactory for EchoExecutor {
    fn create(&self, _session_id: &str, _cwd: &str) -> Arc<dyn Executor> {
        Arc::new(Self)
    }
}
