//! Handlers for requests the agent sends to the client.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::protocol::client::{
    PermissionOptionKind, RequestPermissionOutcome, RequestPermissionRequest,
    RequestPermissionResponse,
};
use crate::{AppError, Result};

/// Boxed future returned by client-side runtimes and handlers.
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Answers one inbound method.
///
/// Errors are turned into JSON-RPC error objects: [`AppError::InvalidParams`]
/// becomes `-32602`, [`AppError::Rpc`] is passed through, and anything
/// unexpected becomes `-32603`.
pub trait RequestHandler: Send + Sync {
    /// Produce the result for `params`.
    fn handle(&self, params: Option<Value>) -> ClientFuture<'_, Value>;
}

/// [`RequestHandler`] decoding params into `Req` and encoding `Resp`.
pub struct TypedHandler<F, Req> {
    f: F,
    _req: PhantomData<fn(Req)>,
}

/// Wrap an async closure over typed params as a [`RequestHandler`].
pub fn typed<F, Fut, Req, Resp>(f: F) -> TypedHandler<F, Req>
where
    F: Fn(Req) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Resp>> + Send,
    Req: DeserializeOwned + Send,
    Resp: Serialize,
{
    TypedHandler {
        f,
        _req: PhantomData,
    }
}

impl<F, Fut, Req, Resp> RequestHandler for TypedHandler<F, Req>
where
    F: Fn(Req) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Resp>> + Send,
    Req: DeserializeOwned + Send,
    Resp: Serialize,
{
    fn handle(&self, params: Option<Value>) -> ClientFuture<'_, Value> {
        let decoded = serde_json::from_value::<Req>(
            params.unwrap_or_else(|| Value::Object(Map::new())),
        )
        .map_err(|err| AppError::InvalidParams(err.to_string()));
        Box::pin(async move {
            let response = (self.f)(decoded?).await?;
            Ok(serde_json::to_value(response)?)
        })
    }
}

/// Decides `session/requestPermission` requests.
pub trait PermissionHandler: Send + Sync {
    /// Pick an outcome for `request`.
    fn decide(&self, request: RequestPermissionRequest) -> ClientFuture<'_, RequestPermissionResponse>;
}

/// Answers every permission request the same way without asking anyone.
#[derive(Debug, Clone, Copy)]
pub struct AutoApprove {
    /// Grant (`allow_once`) when true, refuse (`reject_once`) otherwise.
    pub approve: bool,
}

impl AutoApprove {
    /// The outcome this handler gives for `request`.
    #[must_use]
    pub fn outcome_for(&self, request: &RequestPermissionRequest) -> RequestPermissionOutcome {
        let wanted = if self.approve {
            PermissionOptionKind::AllowOnce
        } else {
            PermissionOptionKind::RejectOnce
        };
        request
            .options
            .iter()
            .find(|option| option.kind == wanted)
            .map_or(RequestPermissionOutcome::Cancelled, |option| {
                RequestPermissionOutcome::selected(option.option_id.clone())
            })
    }
}

impl PermissionHandler for AutoApprove {
    fn decide(&self, request: RequestPermissionRequest) -> ClientFuture<'_, RequestPermissionResponse> {
        let outcome = self.outcome_for(&request);
        Box::pin(async move { Ok(RequestPermissionResponse { outcome }) })
    }
}
