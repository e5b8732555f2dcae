//! JSON-RPC error object and the error codes used on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AppError;

/// Invalid JSON was received.
pub const PARSE_ERROR: i32 = -32700;
/// The JSON sent is not a valid request object.
pub const INVALID_REQUEST: i32 = -32600;
/// The method does not exist or is not available.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i32 = -32602;
/// Internal error.
pub const INTERNAL_ERROR: i32 = -32603;
/// The request was cancelled through `$/cancelRequest`.
pub const REQUEST_CANCELLED: i32 = -32800;

/// Error object carried by a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i32,
    /// Short human-readable description.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Build an error with an arbitrary code.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured detail.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// `-32700`.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, message)
    }

    /// `-32600`.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    /// `-32601` for `method`.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    /// `-32602`.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    /// `-32603`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }

    /// `-32800`.
    #[must_use]
    pub fn request_cancelled() -> Self {
        Self::new(REQUEST_CANCELLED, "request cancelled")
    }

    /// Whether this error reports a protocol-level cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.code == REQUEST_CANCELLED
    }
}

impl From<AppError> for RpcError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Rpc(inner) => inner,
            AppError::InvalidParams(msg) | AppError::NotFound(msg) => Self::invalid_params(msg),
            AppError::Unsupported(msg) => Self::new(METHOD_NOT_FOUND, msg),
            AppError::Cancelled(_) => Self::request_cancelled(),
            other => Self::internal(other.to_string()),
        }
    }
}
