//! Backpressure gate bounding concurrent in-flight sends.
//!
//! A thin wrapper over [`tokio::sync::Semaphore`]: waiters queue in FIFO
//! order, and a permit is returned to the pool when its [`GatePermit`] is
//! dropped. Dropping a blocked [`BackpressureGate::acquire`] future removes
//! the waiter without consuming a permit.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{AppError, Result};

/// Counting semaphore with a fixed capacity.
#[derive(Debug, Clone)]
pub struct BackpressureGate {
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// A held slot; releases itself on drop.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl BackpressureGate {
    /// Create a gate admitting at most `capacity` concurrent holders.
    ///
    /// A capacity of zero is raised to one so the gate can never deadlock.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] if the gate has been closed.
    pub async fn acquire(&self) -> Result<GatePermit> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AppError::Transport("backpressure gate closed".into()))?;
        Ok(GatePermit { _permit: permit })
    }

    /// Take a slot without waiting, if one is free.
    #[must_use]
    pub fn try_acquire(&self) -> Option<GatePermit> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .ok()
            .map(|permit| GatePermit { _permit: permit })
    }

    /// Slots currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fail every current and future waiter.
    pub fn close(&self) {
        self.permits.close();
    }
}
