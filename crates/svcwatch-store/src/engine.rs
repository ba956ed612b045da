//! Public façade over the request queue and its worker thread.
//!
//! An [`Engine`] is a cheap, cloneable handle. Every operation builds a
//! [`Request`], enqueues it, and hands back the [`Ticket`] for its result.
//! Nothing here touches storage directly; only the worker thread does.
//!
//! The worker stops on [`Engine::shutdown`] or when the last handle is
//! dropped. Requests still queued at that point are cancelled, and any
//! request submitted afterwards comes back already cancelled.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;

use crossbeam::channel::{self, Sender};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::models::{ConfigEntry, InitReport, User};
use crate::request::{Request, Ticket};
use crate::schema;
use crate::worker::Worker;

const WORKER_THREAD_NAME: &str = "svcwatch-store";

/// Handle to the serialized data-access engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    /// `None` once shutdown has begun.
    requests: RwLock<Option<Sender<Request>>>,
    /// Dropping this sender is the stop signal.
    stop: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    ready: Arc<AtomicBool>,
    config: StoreConfig,
}

impl Engine {
    /// Spawn the worker thread. The storage is not touched until an
    /// [`Engine::initialize`] request is processed.
    pub fn start(config: &StoreConfig) -> StoreResult<Self> {
        let (req_tx, req_rx) = channel::unbounded();
        let (stop_tx, stop_rx) = channel::bounded(1);
        let ready = Arc::new(AtomicBool::new(false));

        let worker = Worker::new(
            req_rx,
            stop_rx,
            Arc::clone(&ready),
            config.idle_timeout(),
            config.data_root.clone(),
        );
        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || worker.run())
            .map_err(|e| StoreError::Worker(format!("failed to spawn worker thread: {e}")))?;

        info!(program = %config.program_name, "store engine started");

        Ok(Self {
            inner: Arc::new(EngineInner {
                requests: RwLock::new(Some(req_tx)),
                stop: Mutex::new(Some(stop_tx)),
                worker: Mutex::new(Some(handle)),
                ready,
                config: config.clone(),
            }),
        })
    }

    /// The configuration this engine was started with.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// `true` after a successful initialization and until a later
    /// initialization or open fails.
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// `true` until shutdown begins.
    pub fn is_running(&self) -> bool {
        self.inner
            .requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Enqueue a pre-built request.
    ///
    /// After shutdown the request is dropped on the spot, which resolves
    /// its ticket as cancelled.
    pub fn submit(&self, request: Request) {
        let guard = self
            .inner
            .requests
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let kind = request.kind();
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(request).is_err() {
                    warn!(kind, "worker gone, request cancelled");
                } else {
                    debug!(kind, "request queued");
                }
            }
            None => warn!(kind, "engine shut down, request cancelled"),
        }
    }

    fn enqueue<T>(&self, (request, ticket): (Request, Ticket<T>)) -> Ticket<T> {
        self.submit(request);
        ticket
    }

    // ── operations ──────────────────────────────────────────────────

    /// Resolve the storage file, bootstrap it if missing, then open and
    /// version-check it.
    pub fn initialize(
        &self,
        program_name: impl Into<String>,
        path_override: Option<PathBuf>,
    ) -> Ticket<InitReport> {
        self.enqueue(Request::initialize(program_name, path_override))
    }

    /// [`Engine::initialize`] with the program name and database path from
    /// the engine's configuration.
    pub fn initialize_from_config(&self) -> Ticket<InitReport> {
        let config = &self.inner.config;
        self.initialize(config.program_name.clone(), config.database.clone())
    }

    pub fn get_all_config(&self) -> Ticket<Vec<ConfigEntry>> {
        self.enqueue(Request::get_all_config())
    }

    pub fn get_config(
        &self,
        category: impl Into<String>,
        setting: impl Into<String>,
    ) -> Ticket<Option<String>> {
        self.enqueue(Request::get_config(category, setting))
    }

    /// Upsert one value. Resolves `true` once written.
    pub fn set_config(
        &self,
        category: impl Into<String>,
        setting: impl Into<String>,
        value: impl Into<String>,
    ) -> Ticket<bool> {
        self.enqueue(Request::set_config(ConfigEntry::new(
            category, setting, value,
        )))
    }

    pub fn list_users(&self) -> Ticket<Vec<User>> {
        self.enqueue(Request::list_users())
    }

    pub fn get_user_by_id(&self, id: i64) -> Ticket<Option<User>> {
        self.enqueue(Request::get_user_by_id(id))
    }

    pub fn get_user_by_email(&self, email: impl Into<String>) -> Ticket<Option<User>> {
        self.enqueue(Request::get_user_by_email(email))
    }

    /// Resolves to the account when the email is known, the account is
    /// enabled, and the password matches.
    pub fn authenticate(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Ticket<Option<User>> {
        self.enqueue(Request::authenticate(email, password))
    }

    pub fn save_user(&self, user: User) -> Ticket<User> {
        self.enqueue(Request::save_user(user))
    }

    pub fn delete_user(&self, id: i64) -> Ticket<bool> {
        self.enqueue(Request::delete_user(id))
    }

    pub fn clear_mail_gateway(&self, gateway_id: i64) -> Ticket<usize> {
        self.enqueue(Request::clear_mail_gateway(gateway_id))
    }

    /// Built-in default for a configuration key; never touches storage.
    pub fn default_config_value(&self, category: &str, setting: &str) -> &'static str {
        schema::default_config_value(category, setting)
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// Queued requests are cancelled. Calling this more than once is a
    /// no-op.
    pub fn shutdown(&self) -> StoreResult<()> {
        self.inner.stop()
    }
}

impl EngineInner {
    fn stop(&self) -> StoreResult<()> {
        // Taking the sender under the write lock waits out in-flight submits.
        let sender = self
            .requests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return Ok(());
        }
        info!("store engine shutdown requested");

        drop(
            self.stop
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        drop(sender);

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => handle
                .join()
                .map_err(|_| StoreError::Worker("worker thread panicked".into())),
            None => Ok(()),
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "store engine did not stop cleanly");
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
