//! ConnectionRegistry: the set of currently open connections.
//!
//! Each entry binds a connection's identity to the [`SchedulerHandle`] of its
//! broadcast task.  The registry owns the handle, so removing an entry stops
//! the task; there is no other owner that could keep a timer alive for a
//! closed connection.
//!
//! Iteration ([`ConnectionRegistry::for_each`]) works on a snapshot taken
//! under the lock, so callbacks may add or remove entries freely.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use thiserror::Error;

use crate::application::scheduler::SchedulerHandle;
use crate::domain::connection::ConnectionId;

/// Error type for registry operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection {0} is already registered")]
    Duplicate(ConnectionId),
}

/// Descriptive data about an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer_addr: SocketAddr,
    pub origin: Option<String>,
    pub opened_at: Instant,
}

/// A registered connection and the handle of its broadcast task.
#[derive(Debug)]
pub struct RegistryEntry {
    info: ConnectionInfo,
    scheduler: SchedulerHandle,
}

impl RegistryEntry {
    pub fn new(info: ConnectionInfo, scheduler: SchedulerHandle) -> Self {
        Self { info, scheduler }
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }
}

/// Tracks open connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<ConnectionId, RegistryEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, RegistryEntry>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `entry`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the ID is already present.  The
    /// rejected entry is dropped, which stops its scheduler, so a connection
    /// never has two active tasks.
    pub fn add(&self, entry: RegistryEntry) -> Result<(), RegistryError> {
        let id = entry.info.id;
        let mut entries = self.lock();
        if entries.contains_key(&id) {
            drop(entries);
            entry.scheduler.stop();
            return Err(RegistryError::Duplicate(id));
        }
        entries.insert(id, entry);
        Ok(())
    }

    /// Removes a connection and stops its scheduler before returning.
    ///
    /// Returns `None` if the connection was not registered (already removed).
    pub fn remove(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        let entry = self.lock().remove(&id)?;
        entry.scheduler.stop();
        Some(entry.info)
    }

    /// Calls `f` for every connection open at the time of the call.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&ConnectionInfo),
    {
        let snapshot: Vec<ConnectionInfo> = self.lock().values().map(|e| e.info.clone()).collect();
        for info in &snapshot {
            f(info);
        }
    }

    /// Removes every connection, stopping all schedulers.
    pub fn stop_all(&self) -> Vec<ConnectionInfo> {
        let drained: Vec<RegistryEntry> = self.lock().drain().map(|(_, e)| e).collect();
        drained
            .into_iter()
            .map(|entry| {
                entry.scheduler.stop();
                entry.info
            })
            .collect()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of registered connections whose scheduler is still running.
    pub fn active_schedulers(&self) -> usize {
        self.lock()
            .values()
            .filter(|e| !e.scheduler.is_stopped())
            .count()
    }
}
