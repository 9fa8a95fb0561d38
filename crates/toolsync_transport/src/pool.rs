//! Per-service connection pool.
//!
//! Each service name owns one slot guarded by its own async mutex. Holding
//! the slot's lock *is* the checkout: a second acquirer for the same name
//! waits on the lock until the first releases or the acquire timeout fires.
//! Different services never contend.

use crate::connection::{ToolConnection, TransportError, TransportResult};
use crate::selector::TransportHandle;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Pool errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The slot stayed checked out for the whole acquire window
    #[error("Timed out after {waited_ms}ms waiting for the connection to {service}")]
    Timeout {
        /// Service name
        service: String,
        /// Time waited
        waited_ms: u64,
    },

    /// The factory failed to create a connection
    #[error("Failed to create connection for {service}: {source}")]
    Create {
        /// Service name
        service: String,
        /// Underlying failure
        source: TransportError,
    },
}

/// Pool timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Idle entries older than this are evicted
    pub idle_timeout: Duration,
    /// Maximum wait for a checked-out slot
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// Default timings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set idle timeout
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set acquire timeout
    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// An open connection and the handle it was created from
pub struct PoolEntry {
    connection: Box<dyn ToolConnection>,
    transport: TransportHandle,
    last_used: Instant,
}

impl PoolEntry {
    /// Wrap a freshly opened connection
    #[must_use]
    pub fn new(connection: Box<dyn ToolConnection>, transport: TransportHandle) -> Self {
        Self {
            connection,
            transport,
            last_used: Instant::now(),
        }
    }

    /// Handle the connection was opened with
    #[must_use]
    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    fn is_idle(&self, idle_timeout: Duration) -> bool {
        self.last_used.elapsed() >= idle_timeout
    }

    async fn shutdown(mut self, service: &str) {
        if let Err(e) = self.connection.close().await {
            tracing::warn!(service = %service, error = %e, "error closing connection");
        }
    }
}

type Slot = Arc<Mutex<Option<PoolEntry>>>;

/// Owns at most one live connection per service name
pub struct PoolRegistry {
    config: PoolConfig,
    slots: RwLock<HashMap<String, Slot>>,
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl PoolRegistry {
    /// Create an empty pool
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Pool configuration
    #[must_use]
    pub fn config(&self) -> PoolConfig {
        self.config
    }

    async fn slot(&self, service: &str) -> Slot {
        if let Some(slot) = self.slots.read().await.get(service) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(service.to_string()).or_default())
    }

    /// Check out the connection for `service`, creating it with `factory`
    /// when there is no usable idle entry.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if the slot stays checked out past the acquire
    /// timeout, or `Create` if the factory fails.
    pub async fn acquire<F, Fut>(
        &self,
        service: &str,
        factory: F,
    ) -> Result<PooledConnection, PoolError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TransportResult<PoolEntry>>,
    {
        let slot = self.slot(service).await;
        let mut guard = tokio::time::timeout(self.config.acquire_timeout, slot.lock_owned())
            .await
            .map_err(|_| PoolError::Timeout {
                service: service.to_string(),
                waited_ms: self.config.acquire_timeout.as_millis() as u64,
            })?;

        let reusable = match guard.take() {
            Some(mut entry) => {
                if entry.connection.is_open() && !entry.is_idle(self.config.idle_timeout) {
                    Some(entry)
                } else {
                    tracing::debug!(service = %service, "discarding stale pooled connection");
                    entry.shutdown(service).await;
                    None
                }
            }
            None => None,
        };

        let entry = match reusable {
            Some(entry) => {
                tracing::debug!(service = %service, "reusing pooled connection");
                entry
            }
            None => {
                let entry = factory().await.map_err(|source| PoolError::Create {
                    service: service.to_string(),
                    source,
                })?;
                tracing::debug!(service = %service, "created pooled connection");
                entry
            }
        };

        Ok(PooledConnection {
            service: service.to_string(),
            entry: Some(entry),
            slot: guard,
        })
    }

    /// Whether `service` has an idle entry right now
    pub async fn is_pooled(&self, service: &str) -> bool {
        let Some(slot) = self.slots.read().await.get(service).cloned() else {
            return false;
        };
        slot.try_lock().is_ok_and(|guard| guard.is_some())
    }

    /// Close the entry for `service`, waiting up to the acquire timeout if it
    /// is checked out. Errors are logged, never returned.
    pub async fn close(&self, service: &str) {
        let Some(slot) = self.slots.read().await.get(service).cloned() else {
            return;
        };
        match tokio::time::timeout(self.config.acquire_timeout, slot.lock_owned()).await {
            Ok(mut guard) => {
                if let Some(entry) = guard.take() {
                    tracing::debug!(service = %service, "closing pooled connection");
                    entry.shutdown(service).await;
                }
            }
            Err(_) => {
                tracing::warn!(service = %service, "connection still checked out; not closed");
            }
        }
    }

    /// Drain every entry
    pub async fn close_all(&self) {
        let names: Vec<String> = self.slots.read().await.keys().cloned().collect();
        for name in &names {
            self.close(name).await;
        }
        tracing::debug!(services = names.len(), "connection pool drained");
    }

    /// Close idle entries past the idle window. Checked-out slots are skipped.
    /// Returns how many entries were evicted.
    pub async fn evict_idle(&self) -> usize {
        let slots: Vec<(String, Slot)> = self
            .slots
            .read()
            .await
            .iter()
            .map(|(name, slot)| (name.clone(), Arc::clone(slot)))
            .collect();

        let mut evicted = 0;
        for (name, slot) in slots {
            let Ok(mut guard) = slot.try_lock_owned() else {
                continue;
            };
            if guard
                .as_ref()
                .is_some_and(|entry| entry.is_idle(self.config.idle_timeout))
                && let Some(entry) = guard.take()
            {
                tracing::debug!(service = %name, "evicting idle connection");
                entry.shutdown(&name).await;
                evicted += 1;
            }
        }
        evicted
    }

    /// Run `evict_idle` every `interval` until the returned task is aborted
    #[must_use]
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                pool.evict_idle().await;
            }
        })
    }
}

/// A checked-out connection. Dropping it returns the entry to the pool.
pub struct PooledConnection {
    service: String,
    entry: Option<PoolEntry>,
    slot: OwnedMutexGuard<Option<PoolEntry>>,
}

impl PooledConnection {
    /// Service this connection belongs to
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Handle the connection was opened with
    #[must_use]
    pub fn transport(&self) -> Option<&TransportHandle> {
        self.entry.as_ref().map(PoolEntry::transport)
    }

    /// List operations on the borrowed connection
    ///
    /// # Errors
    ///
    /// Propagates transport failures
    pub async fn list_tools(&mut self) -> TransportResult<Vec<Value>> {
        let entry = self.entry.as_mut().ok_or(TransportError::Closed)?;
        entry.connection.list_tools().await
    }

    /// Call one operation on the borrowed connection
    ///
    /// # Errors
    ///
    /// Propagates transport failures
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> TransportResult<Value> {
        let entry = self.entry.as_mut().ok_or(TransportError::Closed)?;
        entry.connection.call_tool(name, arguments).await
    }

    /// Return the entry to the idle slot
    pub fn release(mut self) {
        self.put_back();
    }

    /// Close the connection instead of returning it
    pub async fn discard(mut self) {
        if let Some(entry) = self.entry.take() {
            tracing::debug!(service = %self.service, "discarding connection");
            entry.shutdown(&self.service).await;
        }
    }

    fn put_back(&mut self) {
        if let Some(mut entry) = self.entry.take() {
            entry.last_used = Instant::now();
            *self.slot = Some(entry);
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.put_back();
    }
}
