//! Lifecycle of the single storage connection.
//!
//! The [`ConnectionManager`] is owned by the worker thread and is the only
//! thing that ever holds a [`rusqlite::Connection`]. It opens lazily,
//! releases on idle, and disposes a handle that has been marked broken
//! before the next request can use it. Failures degrade to
//! [`StoreError::Unavailable`]; they never take the worker down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::config::StorageLocation;
use crate::error::{StoreError, StoreResult};
use crate::schema;

/// Observable state of the cached handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No handle is held.
    Absent,
    /// A handle is held and believed usable.
    Open,
    /// A handle is held but a previous operation showed it cannot be trusted.
    Broken,
}

/// Owns the storage connection and the readiness flag.
pub struct ConnectionManager {
    conn: Option<Connection>,
    broken: bool,
    location: Option<StorageLocation>,
    ready: Arc<AtomicBool>,
}

impl ConnectionManager {
    /// Create a manager with no location and readiness cleared.
    pub fn new(ready: Arc<AtomicBool>) -> Self {
        ready.store(false, Ordering::Release);
        Self {
            conn: None,
            broken: false,
            location: None,
            ready,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match (&self.conn, self.broken) {
            (None, _) => ConnectionState::Absent,
            (Some(_), false) => ConnectionState::Open,
            (Some(_), true) => ConnectionState::Broken,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    /// The storage file, once an initialization has resolved it.
    pub fn location(&self) -> Option<&StorageLocation> {
        self.location.as_ref()
    }

    /// Forget readiness and the resolved location, and drop any handle.
    /// First step of every initialization.
    pub(crate) fn reset(&mut self, location: StorageLocation) {
        self.release();
        self.set_ready(false);
        self.location = Some(location);
    }

    /// Adopt a handle opened by the initializer.
    pub(crate) fn install(&mut self, conn: Connection) {
        self.release();
        self.conn = Some(conn);
    }

    /// Return a usable connection, opening one if needed.
    ///
    /// Refuses without attempting anything when readiness is cleared. A
    /// broken handle is disposed first. An open failure clears readiness,
    /// so later requests are refused until the next initialization.
    pub fn verify_or_open(&mut self) -> StoreResult<&Connection> {
        if !self.is_ready() {
            return Err(StoreError::Unavailable {
                reason: "database not initialized".into(),
            });
        }

        if self.broken {
            warn!("disposing broken connection");
            self.release();
        }

        if self.conn.is_none() {
            let path = match &self.location {
                Some(loc) => loc.file.clone(),
                None => {
                    self.set_ready(false);
                    return Err(StoreError::Unavailable {
                        reason: "no storage location".into(),
                    });
                }
            };
            match schema::open_existing(&path) {
                Ok(conn) => {
                    debug!(path = %path.display(), "connection opened");
                    self.conn = Some(conn);
                }
                Err(e) => {
                    self.set_ready(false);
                    warn!(path = %path.display(), error = %e, "unable to connect to the database");
                    return Err(StoreError::Unavailable {
                        reason: format!("unable to connect to the database: {e}"),
                    });
                }
            }
        }

        match self.conn.as_ref() {
            Some(conn) => Ok(conn),
            None => Err(StoreError::Unavailable {
                reason: "connection missing after open".into(),
            }),
        }
    }

    /// Mark the cached handle as untrustworthy; it is disposed on next use.
    pub fn invalidate(&mut self) {
        if self.conn.is_some() {
            self.broken = true;
        }
    }

    /// Close and drop the handle, if any.
    pub fn release(&mut self) {
        self.broken = false;
        if let Some(conn) = self.conn.take()
            && let Err((_, e)) = conn.close()
        {
            warn!(error = %e, "error closing connection");
        }
    }

    /// Release the handle because no work arrived within the idle window.
    pub(crate) fn reclaim_idle(&mut self) {
        if self.conn.is_some() {
            self.release();
            debug!("idle connection released");
        }
    }

    /// Release everything at engine shutdown.
    pub(crate) fn close(&mut self) {
        if self.conn.is_some() {
            self.release();
            info!("connection closed");
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_manager(dir: &tempfile::TempDir) -> ConnectionManager {
        let location = StorageLocation::resolve("svcwatch", None, Some(dir.path()));
        schema::bootstrap(&location).unwrap();
        let mut mgr = ConnectionManager::new(Arc::new(AtomicBool::new(false)));
        mgr.reset(location);
        mgr.set_ready(true);
        mgr
    }

    #[test]
    fn refuses_when_not_ready() {
        let mut mgr = ConnectionManager::new(Arc::new(AtomicBool::new(true)));
        assert!(!mgr.is_ready());
        assert!(matches!(
            mgr.verify_or_open(),
            Err(StoreError::Unavailable { .. })
        ));
        assert_eq!(mgr.state(), ConnectionState::Absent);
    }

    #[test]
    fn opens_lazily_and_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = ready_manager(&dir);
        assert_eq!(mgr.state(), ConnectionState::Absent);

        mgr.verify_or_open().unwrap();
        assert_eq!(mgr.state(), ConnectionState::Open);
        mgr.verify_or_open().unwrap();
        assert_eq!(mgr.state(), ConnectionState::Open);
    }

    #[test]
    fn idle_reclaim_then_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = ready_manager(&dir);
        mgr.verify_or_open().unwrap();

        mgr.reclaim_idle();
        assert_eq!(mgr.state(), ConnectionState::Absent);
        assert!(mgr.is_ready());

        mgr.verify_or_open().unwrap();
        assert_eq!(mgr.state(), ConnectionState::Open);
    }

    #[test]
    fn broken_handle_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = ready_manager(&dir);
        mgr.verify_or_open().unwrap();

        mgr.invalidate();
        assert_eq!(mgr.state(), ConnectionState::Broken);

        mgr.verify_or_open().unwrap();
        assert_eq!(mgr.state(), ConnectionState::Open);
    }

    #[test]
    fn open_failure_clears_readiness() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = ready_manager(&dir);
        let file = mgr.location().unwrap().file.clone();
        std::fs::remove_file(&file).unwrap();

        assert!(matches!(
            mgr.verify_or_open(),
            Err(StoreError::Unavailable { .. })
        ));
        assert!(!mgr.is_ready());
        assert!(!file.exists());
    }
}
