//! Routing table for the multiplexing WebSocket server.
//!
//! Several client connections share one logical peer. The table rewrites
//! request ids so they cannot collide across connections, learns which
//! connection owns each session from the traffic it observes, and decides
//! where every agent-side message goes. It performs no I/O, so the whole
//! routing discipline is testable without sockets.

use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};

use serde_json::Value;
use tracing::debug;

use crate::protocol::methods;
use crate::rpc::{Message, Notification, Request, RequestId, RpcError};
use crate::{AppError, Result};

/// Handle assigned to a connection when it is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Where an agent-side message should be delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Deliver to one connection.
    To(ConnectionId, Message),
    /// Deliver to every connection.
    Broadcast(Message),
    /// Nobody is waiting for it.
    Drop,
}

#[derive(Debug, Clone)]
struct InFlight {
    connection: ConnectionId,
    original: RequestId,
    method: String,
    session_id: Option<String>,
}

/// Connection, request, and session ownership bookkeeping.
#[derive(Debug, Default)]
pub struct RoutingTable {
    next_connection: u64,
    next_request: i64,
    connections: BTreeSet<ConnectionId>,
    /// Internal id → origin of a client request.
    in_flight: HashMap<RequestId, InFlight>,
    /// `(connection, original id)` → internal id.
    by_original: HashMap<(ConnectionId, RequestId), RequestId>,
    /// Session id → owning connection.
    owners: HashMap<String, ConnectionId>,
    /// Agent-initiated request id → connection it was sent to.
    agent_requests: HashMap<RequestId, ConnectionId>,
}

/// The `sessionId` field of a params object, if any.
fn session_id_of(params: Option<&Value>) -> Option<String> {
    params?
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

impl RoutingTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted connection.
    pub fn open(&mut self) -> ConnectionId {
        self.next_connection += 1;
        let id = ConnectionId(self.next_connection);
        self.connections.insert(id);
        id
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Live connections in accept order.
    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.iter().copied()
    }

    /// Connection that owns `session_id`, if known.
    #[must_use]
    pub fn owner(&self, session_id: &str) -> Option<ConnectionId> {
        self.owners.get(session_id).copied()
    }

    /// Translate a message received from `connection` for the agent.
    ///
    /// Requests get a fresh internal id. A `$/cancelRequest` naming an id
    /// this connection never sent, or one already answered, is dropped and
    /// `None` is returned.
    pub fn inbound(&mut self, connection: ConnectionId, message: Message) -> Option<Message> {
        match message {
            Message::Request(req) => Some(self.inbound_request(connection, req)),
            Message::Notification(note) if note.method == methods::CANCEL_REQUEST => {
                self.remap_cancel(connection, note)
            }
            Message::Notification(note) => Some(Message::Notification(note)),
            Message::Response(resp) => {
                self.agent_requests.remove(&resp.id);
                Some(Message::Response(resp))
            }
        }
    }

    fn inbound_request(&mut self, connection: ConnectionId, req: Request) -> Message {
        self.next_request += 1;
        let internal = RequestId::Number(self.next_request);
        let session_id = session_id_of(req.params.as_ref());

        if matches!(
            req.method.as_str(),
            methods::SESSION_LOAD | methods::SESSION_RESUME
        ) {
            if let Some(ref sid) = session_id {
                self.owners.insert(sid.clone(), connection);
            }
        }

        self.by_original
            .insert((connection, req.id.clone()), internal.clone());
        self.in_flight.insert(
            internal.clone(),
            InFlight {
                connection,
                original: req.id,
                method: req.method.clone(),
                session_id,
            },
        );

        Message::Request(Request {
            id: internal,
            method: req.method,
            params: req.params,
        })
    }

    fn remap_cancel(&mut self, connection: ConnectionId, note: Notification) -> Option<Message> {
        let original = note
            .params
            .as_ref()
            .and_then(|p| p.get("requestId"))
            .and_then(RequestId::from_value)?;
        let Some(internal) = self.by_original.get(&(connection, original.clone())) else {
            debug!(%connection, request_id = %original, "dropping cancel for unknown request");
            return None;
        };

        let mut params = note.params.unwrap_or_default();
        if let Some(obj) = params.as_object_mut() {
            obj.insert("requestId".into(), internal.to_value());
        }
        Some(Message::Notification(Notification {
            method: note.method,
            params: Some(params),
        }))
    }

    /// Decide where a message produced by the agent goes.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] for an agent-initiated request that
    /// cannot be tied to a single connection.
    pub fn outbound(&mut self, message: Message) -> Result<Route> {
        match message {
            Message::Response(mut resp) => {
                let Some(origin) = self.in_flight.remove(&resp.id) else {
                    debug!(request_id = %resp.id, "dropping response for unknown request");
                    return Ok(Route::Drop);
                };
                // A reused original id may already point at a newer request.
                let key = (origin.connection, origin.original.clone());
                if self.by_original.get(&key) == Some(&resp.id) {
                    self.by_original.remove(&key);
                }

                if let crate::rpc::ResponsePayload::Result(ref result) = resp.payload {
                    self.learn_from_result(&origin, result);
                }
                resp.id = origin.original;
                Ok(Route::To(origin.connection, Message::Response(resp)))
            }
            Message::Notification(note) => {
                if note.method == methods::CANCEL_REQUEST {
                    let target = note
                        .params
                        .as_ref()
                        .and_then(|p| p.get("requestId"))
                        .and_then(RequestId::from_value)
                        .and_then(|id| self.agent_requests.get(&id).copied());
                    return Ok(match target {
                        Some(connection) => Route::To(connection, Message::Notification(note)),
                        None => Route::Drop,
                    });
                }
                let owner = session_id_of(note.params.as_ref()).and_then(|sid| self.owner(&sid));
                Ok(match owner {
                    Some(connection) => Route::To(connection, Message::Notification(note)),
                    None => Route::Broadcast(Message::Notification(note)),
                })
            }
            Message::Request(req) => {
                let session_id = session_id_of(req.params.as_ref());
                let owner = session_id.as_deref().and_then(|sid| self.owner(sid));
                let connection = match owner {
                    Some(connection) => connection,
                    None if self.connections.len() == 1 => {
                        *self.connections.iter().next().ok_or(AppError::NotConnected)?
                    }
                    None => {
                        return Err(AppError::Transport(format!(
                            "no connection owns session {} for {}",
                            session_id.as_deref().unwrap_or("<none>"),
                            req.method
                        )))
                    }
                };
                self.agent_requests.insert(req.id.clone(), connection);
                Ok(Route::To(connection, Message::Request(req)))
            }
        }
    }

    fn learn_from_result(&mut self, origin: &InFlight, result: &Value) {
        match origin.method.as_str() {
            methods::SESSION_NEW | methods::SESSION_FORK => {
                if let Some(sid) = result.get("sessionId").and_then(Value::as_str) {
                    debug!(connection = %origin.connection, session_id = sid, "learned session owner");
                    self.owners.insert(sid.to_owned(), origin.connection);
                }
            }
            methods::SESSION_DELETE => {
                if let Some(ref sid) = origin.session_id {
                    self.owners.remove(sid);
                }
            }
            _ => {}
        }
    }

    /// Forget `connection` and everything it owned.
    ///
    /// Returns messages the agent should see as a consequence: a
    /// `$/cancelRequest` for each request the connection left unanswered,
    /// and an error response for each agent request it never answered.
    pub fn close(&mut self, connection: ConnectionId) -> Vec<Message> {
        self.connections.remove(&connection);
        self.owners.retain(|_, owner| *owner != connection);
        self.by_original.retain(|(conn, _), _| *conn != connection);

        let mut synthetic = Vec::new();

        let abandoned: Vec<RequestId> = self
            .in_flight
            .iter()
            .filter(|(_, origin)| origin.connection == connection)
            .map(|(internal, _)| internal.clone())
            .collect();
        for internal in abandoned {
            self.in_flight.remove(&internal);
            synthetic.push(Message::notification(
                methods::CANCEL_REQUEST,
                Some(serde_json::json!({ "requestId": internal.to_value() })),
            ));
        }

        let unanswered: Vec<RequestId> = self
            .agent_requests
            .iter()
            .filter(|(_, conn)| **conn == connection)
            .map(|(id, _)| id.clone())
            .collect();
        for id in unanswered {
            self.agent_requests.remove(&id);
            synthetic.push(Message::error(
                id,
                RpcError::internal(format!("{connection} closed before responding")),
            ));
        }

        synthetic
    }
}
