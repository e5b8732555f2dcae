//! Permission request bridge.
//!
//! Sends `session/requestPermission` to the client through an injected
//! sender and waits for the matching response. Exactly one of {response
//! arrives, send fails, timeout fires, [`PermissionBridge::fail_all`]}
//! settles each wait; whichever comes later is a no-op.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::protocol::client::{RequestPermissionRequest, RequestPermissionResponse};
use crate::protocol::methods;
use crate::rpc::{Message, PendingCalls, RequestId, Response};
use crate::{AppError, Result};

/// Injected function that hands a message to the transport writer.
pub type OutboundSender = Arc<dyn Fn(Message) -> Result<()> + Send + Sync>;

/// Correlates agent → client permission requests with their responses.
pub struct PermissionBridge {
    calls: PendingCalls,
    sender: OutboundSender,
    timeout: Option<Duration>,
}

impl PermissionBridge {
    /// Bridge sending through `sender`, waiting at most `timeout` per request.
    #[must_use]
    pub fn new(sender: OutboundSender, timeout: Option<Duration>) -> Self {
        Self {
            calls: PendingCalls::new("permission request"),
            sender,
            timeout,
        }
    }

    /// Send `request` and wait for the client's decision.
    ///
    /// Dropping the returned future withdraws the waiter; a response that
    /// arrives afterwards is ignored.
    ///
    /// # Errors
    ///
    /// - [`AppError::Timeout`] when no response arrives in time.
    /// - [`AppError::Rpc`] when the client answers with an error object.
    /// - [`AppError::InvalidParams`] when the result does not decode.
    /// - The sender's error when the request cannot be written.
    /// - The error passed to [`fail_all`](Self::fail_all).
    pub async fn request(
        &self,
        request: &RequestPermissionRequest,
    ) -> Result<RequestPermissionResponse> {
        let params = serde_json::to_value(request)?;
        let call = self.calls.register(self.timeout);
        let id = call.id().clone();

        debug!(request_id = %id, session_id = %request.session_id, "sending permission request");
        let message = Message::request(id.clone(), methods::SESSION_REQUEST_PERMISSION, Some(params));
        if let Err(err) = (self.sender)(message) {
            self.calls.fail(&id, err);
        }

        let value = call.wait().await?;
        serde_json::from_value(value)
            .map_err(|e| AppError::InvalidParams(format!("invalid permission response: {e}")))
    }

    /// Settle the wait for `response.id`.
    ///
    /// Returns `false`, doing nothing, when no request with that id is
    /// outstanding.
    pub fn resolve(&self, response: Response) -> bool {
        let id = response.id.clone();
        let settled = self.calls.resolve(response);
        if !settled {
            debug!(request_id = %id, "ignoring response for unknown permission request");
        }
        settled
    }

    /// Settle the wait for `id` with `err`.
    pub fn fail(&self, id: &RequestId, err: AppError) -> bool {
        self.calls.fail(id, err)
    }

    /// Whether `id` belongs to an outstanding permission request.
    #[must_use]
    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.calls.contains(id)
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.calls.len()
    }

    /// Settle every outstanding request with `err` and stop their timers.
    pub fn fail_all(&self, err: &AppError) {
        self.calls.fail_all(err);
    }
}
