//! Outstanding-call correlation shared by every requester.
//!
//! [`PendingCalls`] hands out monotonically increasing integer ids and keeps
//! one single-resolution waiter per id. A waiter is settled by exactly one of
//! a matching response, an explicit failure, its timeout, or
//! [`PendingCalls::fail_all`]; every later attempt finds no entry and is a
//! no-op. Timeout tasks are aborted whenever their waiter settles another way.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

use super::{RequestId, Response};
use crate::{AppError, Result};

struct Waiter {
    tx: oneshot::Sender<Result<Value>>,
    timer: Option<JoinHandle<()>>,
}

type WaiterMap = Arc<Mutex<HashMap<RequestId, Waiter>>>;

fn settle(waiters: &WaiterMap, id: &RequestId, outcome: Result<Value>) -> bool {
    let waiter = waiters
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(id);
    let Some(waiter) = waiter else {
        return false;
    };
    if let Some(timer) = waiter.timer {
        timer.abort();
    }
    // The receiver is gone if the caller stopped waiting.
    let _ = waiter.tx.send(outcome);
    true
}

/// Registry of calls awaiting a response.
pub struct PendingCalls {
    label: &'static str,
    next_id: AtomicI64,
    waiters: WaiterMap,
}

/// One registered call; await it with [`PendingCall::wait`].
///
/// Dropping it before the outcome arrives withdraws the waiter.
pub struct PendingCall {
    id: RequestId,
    rx: Option<oneshot::Receiver<Result<Value>>>,
    waiters: WaiterMap,
}

impl PendingCall {
    /// Id assigned to this call.
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Wait for the outcome.
    ///
    /// # Errors
    ///
    /// Returns whatever error settled the call: an [`AppError::Rpc`] carried
    /// by the response, an [`AppError::Timeout`], or the failure passed to
    /// [`PendingCalls::fail`] / [`PendingCalls::fail_all`].
    pub async fn wait(mut self) -> Result<Value> {
        let Some(rx) = self.rx.take() else {
            return Err(AppError::Cancelled("call already awaited".into()));
        };
        rx.await
            .unwrap_or_else(|_| Err(AppError::Cancelled("pending call dropped".into())))
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        let waiter = self
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
        if let Some(Waiter {
            timer: Some(timer), ..
        }) = waiter
        {
            timer.abort();
        }
    }
}

impl PendingCalls {
    /// Empty registry; `label` names the calls in timeout messages.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            next_id: AtomicI64::new(0),
            waiters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Allocate an id and register a waiter that times out after `timeout`.
    #[must_use]
    pub fn register(&self, timeout: Option<Duration>) -> PendingCall {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), Waiter { tx, timer: None });

        if let Some(limit) = timeout {
            let waiters = Arc::clone(&self.waiters);
            let timer_id = id.clone();
            let label = self.label;
            let timer = tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                let err = AppError::Timeout(format!(
                    "{label} {timer_id} not answered within {limit:?}"
                ));
                if settle(&waiters, &timer_id, Err(err)) {
                    warn!(request_id = %timer_id, label, "call timed out");
                }
            });
            match self
                .waiters
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_mut(&id)
            {
                Some(waiter) => waiter.timer = Some(timer),
                None => timer.abort(),
            }
        }

        PendingCall {
            id,
            rx: Some(rx),
            waiters: Arc::clone(&self.waiters),
        }
    }

    /// Settle the waiter for `response.id`; `false` when none is pending.
    pub fn resolve(&self, response: Response) -> bool {
        let id = response.id.clone();
        settle(&self.waiters, &id, response.into_result())
    }

    /// Settle the waiter for `id` with `err`; `false` when none is pending.
    pub fn fail(&self, id: &RequestId, err: AppError) -> bool {
        settle(&self.waiters, id, Err(err))
    }

    /// Settle every waiter with `err` and stop all timers.
    pub fn fail_all(&self, err: &AppError) {
        let drained: Vec<Waiter> = self
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, waiter)| waiter)
            .collect();
        for waiter in drained {
            if let Some(timer) = waiter.timer {
                timer.abort();
            }
            let _ = waiter.tx.send(Err(err.clone()));
        }
    }

    /// Whether `id` is awaiting a response.
    #[must_use]
    pub fn contains(&self, id: &RequestId) -> bool {
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Number of outstanding calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no call is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
