//! JSON-RPC message model.
//!
//! A [`Message`] is exactly one of a request, a notification, or a response.
//! Request ids are either integers or strings; the two kinds never compare
//! equal, so `1` and `"1"` address different requests.

use std::fmt::{Display, Formatter};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::RpcError;

/// JSON-RPC request identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequestId {
    /// Integer id.
    Number(i64),
    /// String id.
    Str(String),
}

impl RequestId {
    /// Convert to the JSON value used on the wire.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::from(*n),
            Self::Str(s) => Value::from(s.as_str()),
        }
    }

    /// Parse from a wire value; `None` for anything but an integer or string.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Number),
            Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "\"{s}\""),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Number(n) => serializer.serialize_i64(*n),
            Self::Str(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value)
            .ok_or_else(|| D::Error::custom("request id must be an integer or a string"))
    }
}

/// A call expecting a response.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation id.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Method parameters, omitted on the wire when `None`.
    pub params: Option<Value>,
}

/// A one-way message; no response is produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Method name.
    pub method: String,
    /// Method parameters, omitted on the wire when `None`.
    pub params: Option<Value>,
}

/// Outcome carried by a response: exactly one of result or error.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    /// Successful result.
    Result(Value),
    /// Error object.
    Error(RpcError),
}

/// Reply to a [`Request`].
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Id of the request being answered.
    pub id: RequestId,
    /// Result or error.
    pub payload: ResponsePayload,
}

impl Response {
    /// Convert into a `Result`, mapping the error object into `AppError::Rpc`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Rpc`](crate::AppError::Rpc) when the peer replied
    /// with an error object.
    pub fn into_result(self) -> crate::Result<Value> {
        match self.payload {
            ResponsePayload::Result(value) => Ok(value),
            ResponsePayload::Error(err) => Err(crate::AppError::Rpc(err)),
        }
    }
}

/// Any JSON-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Request.
    Request(Request),
    /// Notification.
    Notification(Notification),
    /// Response.
    Response(Response),
}

impl Message {
    /// Build a request message.
    pub fn request(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Request(Request {
            id: id.into(),
            method: method.into(),
            params,
        })
    }

    /// Build a notification message.
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification(Notification {
            method: method.into(),
            params,
        })
    }

    /// Build a successful response.
    #[must_use]
    pub fn ok(id: RequestId, result: Value) -> Self {
        Self::Response(Response {
            id,
            payload: ResponsePayload::Result(result),
        })
    }

    /// Build an error response.
    #[must_use]
    pub fn error(id: RequestId, error: RpcError) -> Self {
        Self::Response(Response {
            id,
            payload: ResponsePayload::Error(error),
        })
    }

    /// Method name for requests and notifications.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) => None,
        }
    }

    /// Id for requests and responses.
    #[must_use]
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(r) => Some(&r.id),
            Self::Response(r) => Some(&r.id),
            Self::Notification(_) => None,
        }
    }

    /// Params for requests and notifications.
    #[must_use]
    pub fn params(&self) -> Option<&Value> {
        match self {
            Self::Request(r) => r.params.as_ref(),
            Self::Notification(n) => n.params.as_ref(),
            Self::Response(_) => None,
        }
    }
}
