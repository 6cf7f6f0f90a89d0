//! Bounded pool of CAD application handles
//!
//! Handles are created lazily through a [`HandleFactory`] up to `max_size`.
//! A handle is either idle or leased to exactly one caller. Callers that find
//! the pool exhausted wait, woken on release and re-checking every
//! `poll_interval`, until `acquire_timeout` elapses.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::{CadHandle, HandleFactory};
use crate::error::{ErrorKind, Result, RouterError};

/// Pool sizing and wait configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of live handles
    pub max_size: usize,

    /// How long `acquire` waits on an exhausted pool
    pub acquire_timeout: Duration,

    /// Re-check interval while waiting
    pub poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 4,
            acquire_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
        }
    }
}

struct PooledHandle {
    handle: Arc<dyn CadHandle>,
    in_use: bool,
    created_at: DateTime<Utc>,
    last_used: DateTime<Utc>,
    leases: u64,
}

#[derive(Default)]
struct PoolState {
    entries: Vec<PooledHandle>,
    /// Slots reserved by in-flight factory calls
    creating: usize,
    created_total: u64,
    closed: bool,
}

impl PoolState {
    fn live(&self) -> usize {
        self.entries.len() + self.creating
    }
}

enum Checkout {
    Idle(Arc<dyn CadHandle>),
    Create,
    Exhausted,
}

/// Bounded handle pool
pub struct HandlePool {
    config: PoolConfig,
    factory: Arc<dyn HandleFactory>,
    state: Mutex<PoolState>,
    released: Notify,
}

impl std::fmt::Debug for HandlePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlePool")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish()
    }
}

impl HandlePool {
    pub fn new(factory: Arc<dyn HandleFactory>, config: PoolConfig) -> Self {
        Self {
            config,
            factory,
            state: Mutex::new(PoolState::default()),
            released: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Lease a handle, creating one if the pool has room.
    ///
    /// Fails with `AcquisitionTimeout` when the pool stays exhausted for the
    /// configured timeout, and with `Connection` when the factory fails.
    pub async fn acquire(&self) -> Result<Arc<dyn CadHandle>> {
        let deadline = Instant::now() + self.config.acquire_timeout;

        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.checkout()? {
                Checkout::Idle(handle) => {
                    debug!(handle = handle.id(), "Leased idle handle");
                    return Ok(handle);
                }
                Checkout::Create => return self.create_reserved().await,
                Checkout::Exhausted => {}
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    max_size = self.config.max_size,
                    timeout_ms = self.config.acquire_timeout.as_millis() as u64,
                    "Handle pool exhausted"
                );
                return Err(RouterError::acquisition_timeout(format!(
                    "no handle became available within {}ms (pool size {})",
                    self.config.acquire_timeout.as_millis(),
                    self.config.max_size
                )));
            }

            let wait = self.config.poll_interval.min(deadline - now);
            let _ = tokio::time::timeout(wait, notified).await;
        }
    }

    fn checkout(&self) -> Result<Checkout> {
        let mut state = self.lock();
        if state.closed {
            return Err(RouterError::connection("handle pool has been destroyed"));
        }

        if let Some(entry) = state.entries.iter_mut().find(|e| !e.in_use) {
            entry.in_use = true;
            entry.last_used = Utc::now();
            entry.leases += 1;
            return Ok(Checkout::Idle(Arc::clone(&entry.handle)));
        }

        if state.live() < self.config.max_size {
            state.creating += 1;
            return Ok(Checkout::Create);
        }

        Ok(Checkout::Exhausted)
    }

    async fn create_reserved(&self) -> Result<Arc<dyn CadHandle>> {
        let reservation = Reservation {
            pool: self,
            armed: true,
        };

        let handle = match self.factory.create().await {
            Ok(handle) => handle,
            Err(err) => {
                drop(reservation);
                warn!(error = %err, "Handle factory failed");
                return Err(match err.kind() {
                    ErrorKind::Connection => err,
                    _ => RouterError::connection(format!("failed to create handle: {}", err)),
                });
            }
        };

        let registered = {
            let mut state = self.lock();
            reservation.disarm(&mut state);
            if state.closed {
                None
            } else {
                let now = Utc::now();
                state.entries.push(PooledHandle {
                    handle: Arc::clone(&handle),
                    in_use: true,
                    created_at: now,
                    last_used: now,
                    leases: 1,
                });
                state.created_total += 1;
                Some(state.entries.len())
            }
        };

        match registered {
            Some(size) => {
                info!(handle = handle.id(), size, "Created pooled handle");
                Ok(handle)
            }
            None => {
                let _ = handle.disconnect().await;
                Err(RouterError::connection("handle pool has been destroyed"))
            }
        }
    }

    /// Return a leased handle. Releasing a handle that is not leased is a no-op.
    ///
    /// Entries are matched by identity, not by `id()`, which need not be unique.
    pub fn release(&self, handle: &Arc<dyn CadHandle>) {
        let mut state = self.lock();
        match state
            .entries
            .iter_mut()
            .find(|e| e.in_use && Arc::ptr_eq(&e.handle, handle))
        {
            Some(entry) => {
                entry.in_use = false;
                drop(state);
                debug!(handle = handle.id(), "Released handle");
                self.released.notify_one();
            }
            None => debug!(handle = handle.id(), "Ignoring release of handle that is not leased"),
        }
    }

    /// Lease a handle that is released automatically when the guard drops
    pub async fn lease(&self) -> Result<PoolLease<'_>> {
        let handle = self.acquire().await?;
        Ok(PoolLease { pool: self, handle })
    }

    /// Close the pool and disconnect every handle, leased ones included.
    ///
    /// All handles are disconnected even if some fail; the first failure is returned.
    pub async fn destroy(&self) -> Result<()> {
        let handles: Vec<Arc<dyn CadHandle>> = {
            let mut state = self.lock();
            state.closed = true;
            state.entries.drain(..).map(|e| e.handle).collect()
        };
        self.released.notify_waiters();

        info!(count = handles.len(), "Destroying handle pool");
        let results = join_all(handles.iter().map(|h| h.disconnect())).await;

        let mut first_error = None;
        for (handle, result) in handles.iter().zip(results) {
            if let Err(err) = result {
                warn!(handle = handle.id(), error = %err, "Failed to disconnect handle");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Point-in-time view of the pool
    pub fn status(&self) -> PoolStatus {
        let state = self.lock();
        let in_use = state.entries.iter().filter(|e| e.in_use).count();
        PoolStatus {
            max_size: self.config.max_size,
            size: state.entries.len(),
            idle: state.entries.len() - in_use,
            in_use,
            creating: state.creating,
            created_total: state.created_total,
            closed: state.closed,
            handles: state
                .entries
                .iter()
                .map(|e| HandleInfo {
                    id: e.handle.id().to_string(),
                    in_use: e.in_use,
                    created_at: e.created_at,
                    last_used: e.last_used,
                    leases: e.leases,
                })
                .collect(),
        }
    }
}

/// Frees a creation slot unless the new handle was registered
struct Reservation<'a> {
    pool: &'a HandlePool,
    armed: bool,
}

impl Reservation<'_> {
    fn disarm(mut self, state: &mut PoolState) {
        self.armed = false;
        state.creating -= 1;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.lock().creating -= 1;
            self.pool.released.notify_one();
        }
    }
}

/// A leased handle, returned to the pool on drop
pub struct PoolLease<'a> {
    pool: &'a HandlePool,
    handle: Arc<dyn CadHandle>,
}

impl PoolLease<'_> {
    pub fn handle(&self) -> &Arc<dyn CadHandle> {
        &self.handle
    }
}

impl std::ops::Deref for PoolLease<'_> {
    type Target = dyn CadHandle;

    fn deref(&self) -> &Self::Target {
        self.handle.as_ref()
    }
}

impl Drop for PoolLease<'_> {
    fn drop(&mut self) {
        self.pool.release(&self.handle);
    }
}

/// Pool occupancy
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub max_size: usize,
    pub size: usize,
    pub idle: usize,
    pub in_use: usize,
    pub creating: usize,
    /// Handles created over the pool's lifetime
    pub created_total: u64,
    pub closed: bool,
    pub handles: Vec<HandleInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandleInfo {
    pub id: String,
    pub in_use: bool,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub leases: u64,
}
