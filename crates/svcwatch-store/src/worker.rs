//! The single consumer of the request queue.
//!
//! # Loop
//!
//! ```text
//!          +-----------------------------+
//!          |  select!                    |
//!          |    stop      -> drain, exit |
//!          |    request   -> handle      |
//!          |    idle tick -> release conn|
//!          +-----------------------------+
//! ```
//!
//! Initialization is handled before generic dispatch because it is the only
//! request allowed to run without a usable connection. Every other request
//! first goes through [`ConnectionManager::verify_or_open`]; if that fails
//! the request is cancelled. Handler errors and panics cancel only the
//! request being handled.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crossbeam::channel::{Receiver, TryRecvError, select};
use rusqlite::Connection;
use tracing::{debug, error, info, warn};

use crate::config::StorageLocation;
use crate::config_store;
use crate::connection::ConnectionManager;
use crate::error::{StoreError, StoreResult};
use crate::models::InitReport;
use crate::request::Request;
use crate::schema;
use crate::user_store;

pub(crate) struct Worker {
    requests: Receiver<Request>,
    stop: Receiver<()>,
    connection: ConnectionManager,
    idle_timeout: Duration,
    data_root: Option<PathBuf>,
}

impl Worker {
    pub(crate) fn new(
        requests: Receiver<Request>,
        stop: Receiver<()>,
        ready: Arc<AtomicBool>,
        idle_timeout: Duration,
        data_root: Option<PathBuf>,
    ) -> Self {
        Self {
            requests,
            stop,
            connection: ConnectionManager::new(ready),
            idle_timeout,
            data_root,
        }
    }

    /// Run until the stop signal fires or every sender is gone.
    pub(crate) fn run(mut self) {
        info!(idle_timeout_ms = self.idle_timeout.as_millis() as u64, "store worker started");

        let requests = self.requests.clone();
        let stop = self.stop.clone();

        loop {
            // Stop takes priority over queued work.
            match stop.try_recv() {
                Err(TryRecvError::Empty) => {}
                Ok(()) | Err(TryRecvError::Disconnected) => break,
            }

            select! {
                recv(stop) -> _ => break,
                recv(requests) -> msg => match msg {
                    Ok(request) => self.handle(request),
                    Err(_) => break,
                },
                default(self.idle_timeout) => self.connection.reclaim_idle(),
            }
        }

        self.finish();
    }

    fn finish(&mut self) {
        self.connection.close();
        self.connection.set_ready(false);

        let mut cancelled = 0usize;
        for request in self.requests.try_iter() {
            debug!(kind = request.kind(), "cancelling queued request at shutdown");
            drop(request);
            cancelled += 1;
        }
        if cancelled > 0 {
            warn!(cancelled, "cancelled requests still queued at shutdown");
        }
        info!("store worker stopped");
    }

    fn handle(&mut self, request: Request) {
        self.handle_with(request, dispatch);
    }

    /// Route `request` through `run`, isolating its errors and panics.
    fn handle_with<F>(&mut self, request: Request, run: F)
    where
        F: FnOnce(&Connection, Request) -> StoreResult<()>,
    {
        let kind = request.kind();
        debug!(kind, "dispatching request");

        let request = match request {
            Request::Initialize {
                program_name,
                path_override,
                reply,
            } => {
                let report = self.initialize(&program_name, path_override.as_deref());
                reply.complete(report);
                return;
            }
            other => other,
        };

        let conn = match self.connection.verify_or_open() {
            Ok(conn) => conn,
            Err(e) => {
                warn!(kind, error = %e, "request cancelled");
                return;
            }
        };

        match panic::catch_unwind(AssertUnwindSafe(|| run(conn, request))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(kind, error = %e, "error processing request");
                if e.is_connection_fault() {
                    self.connection.invalidate();
                }
            }
            Err(_) => {
                error!(kind, "request handler panicked");
                self.connection.invalidate();
            }
        }
    }

    fn initialize(&mut self, program_name: &str, path_override: Option<&Path>) -> InitReport {
        let location =
            StorageLocation::resolve(program_name, path_override, self.data_root.as_deref());
        self.connection.reset(location.clone());

        match schema::initialize(&location) {
            Ok((conn, seeded)) => {
                self.connection.install(conn);
                self.connection.set_ready(true);
                info!(path = %location.file.display(), bootstrapped = seeded.is_some(), "database ready");
                InitReport::success(seeded)
            }
            Err(e) => {
                error!(path = %location.file.display(), error = %e, "unable to start the database");
                InitReport::failure(e)
            }
        }
    }
}

/// Run one request against `conn` and resolve its ticket.
///
/// An `Err` return means the responder was dropped, i.e. the request was
/// cancelled.
fn dispatch(conn: &Connection, request: Request) -> StoreResult<()> {
    match request {
        // Intercepted in `Worker::handle`.
        Request::Initialize { reply, .. } => {
            reply.cancel();
            return Err(StoreError::InvalidArgument(
                "initialize cannot be dispatched as a query".into(),
            ));
        }
        Request::GetAllConfig { reply } => reply.complete(config_store::get_all(conn)?),
        Request::GetConfig {
            category,
            setting,
            reply,
        } => reply.complete(config_store::get(conn, &category, &setting)?),
        Request::SetConfig { entry, reply } => {
            config_store::upsert(conn, &entry)?;
            reply.complete(true);
        }
        Request::ListUsers { reply } => reply.complete(user_store::list(conn)?),
        Request::GetUserById { id, reply } => reply.complete(user_store::get_by_id(conn, id)?),
        Request::GetUserByEmail { email, reply } => {
            reply.complete(user_store::get_by_email(conn, &email)?)
        }
        Request::Authenticate {
            email,
            password,
            reply,
        } => reply.complete(user_store::authenticate(conn, &email, &password)?),
        Request::SaveUser { user, reply } => reply.complete(user_store::save(conn, user)?),
        Request::DeleteUser { id, reply } => reply.complete(user_store::delete(conn, id)?),
        Request::ClearMailGateway { gateway_id, reply } => {
            reply.complete(user_store::clear_mail_gateway(conn, gateway_id)?)
        }
    }
    Ok(())
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam::channel::{self, Sender};

    use super::*;
    use crate::connection::ConnectionState;
    use crate::request::Ticket;

    struct Harness {
        worker: Worker,
        _requests: Sender<Request>,
        _stop: Sender<()>,
        _dir: tempfile::TempDir,
    }

    fn initialized_worker() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let (req_tx, req_rx) = channel::unbounded();
        let (stop_tx, stop_rx) = channel::bounded(1);
        let mut worker = Worker::new(
            req_rx,
            stop_rx,
            Arc::new(AtomicBool::new(false)),
            Duration::from_millis(50),
            Some(dir.path().to_path_buf()),
        );
        let report = worker.initialize("svcwatch", None);
        assert!(report.is_ok(), "{:?}", report.message());
        Harness {
            worker,
            _requests: req_tx,
            _stop: stop_tx,
            _dir: dir,
        }
    }

    fn corrupt() -> StoreError {
        StoreError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CORRUPT),
            None,
        ))
    }

    fn get_version() -> (Request, Ticket<Option<String>>) {
        Request::get_config("System", "Version")
    }

    #[test]
    fn handler_error_cancels_only_that_request() {
        let mut h = initialized_worker();

        let (req, ticket) = get_version();
        h.worker.handle_with(req, |_, _| {
            Err(StoreError::InvalidArgument("rejected".into()))
        });
        assert!(matches!(ticket.wait(), Err(StoreError::Cancelled)));
        assert_eq!(h.worker.connection.state(), ConnectionState::Open);
        assert!(h.worker.connection.is_ready());

        let (req, ticket) = get_version();
        h.worker.handle(req);
        assert_eq!(ticket.wait().unwrap().as_deref(), Some(schema::COMPATIBLE_VERSION));
    }

    #[test]
    fn connection_fault_invalidates_then_reopens() {
        let mut h = initialized_worker();

        let (req, ticket) = get_version();
        h.worker.handle_with(req, |_, _| Err(corrupt()));
        assert!(matches!(ticket.wait(), Err(StoreError::Cancelled)));
        assert_eq!(h.worker.connection.state(), ConnectionState::Broken);
        assert!(h.worker.connection.is_ready());

        let (req, ticket) = get_version();
        h.worker.handle(req);
        assert_eq!(ticket.wait().unwrap().as_deref(), Some(schema::COMPATIBLE_VERSION));
        assert_eq!(h.worker.connection.state(), ConnectionState::Open);
    }

    #[test]
    fn handler_panic_is_contained() {
        let mut h = initialized_worker();

        let (req, ticket) = get_version();
        h.worker.handle_with(req, |_, _| panic!("handler blew up"));
        assert!(matches!(ticket.wait(), Err(StoreError::Cancelled)));
        assert_eq!(h.worker.connection.state(), ConnectionState::Broken);

        let (req, ticket) = get_version();
        h.worker.handle(req);
        assert!(ticket.wait().unwrap().is_some());
        assert_eq!(h.worker.connection.state(), ConnectionState::Open);
    }

    #[test]
    fn initialize_is_never_dispatched_as_a_query() {
        let mut h = initialized_worker();
        let conn = h.worker.connection.verify_or_open().unwrap();

        let (req, ticket) = Request::initialize("svcwatch", None);
        assert!(matches!(
            dispatch(conn, req),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(ticket.wait(), Err(StoreError::Cancelled)));
    }
}
