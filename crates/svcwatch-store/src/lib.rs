//! # svcwatch-store
//!
//! Serialized SQLite data-access engine for the svcwatch fleet monitor.
//!
//! Every read and write goes through one FIFO queue drained by a single
//! worker thread that exclusively owns the storage connection. Callers get
//! a [`Ticket`] back for each request and either block on it or `.await`
//! it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Engine (cloneable façade, returns Tickets)  │
//! ├──────────────────────────────────────────────┤
//! │  Request queue (crossbeam, unbounded, FIFO)  │
//! ├──────────────────────────────────────────────┤
//! │  Worker thread                               │
//! │    ConnectionManager (lazy / idle / broken)  │
//! │    schema      (bootstrap + version gate)    │
//! │    config_store, user_store                  │
//! ├──────────────────────────────────────────────┤
//! │  rusqlite (bundled SQLite, WAL)              │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use svcwatch_store::{Engine, StoreConfig};
//!
//! let engine = Engine::start(&StoreConfig::load("config/default.toml")?)?;
//! let report = engine.initialize_from_config().wait()?;
//! if let Some(msg) = report.message() {
//!     eprintln!("{msg}");
//! }
//! let relay = engine.get_config("Mail", "Relay").wait()?;
//! ```

pub mod config;
pub mod config_store;
pub mod connection;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod models;
pub mod request;
pub mod schema;
pub mod user_store;

mod worker;

// ── re-exports ───────────────────────────────────────────────────────

pub use config::{StorageLocation, StoreConfig};
pub use connection::ConnectionState;
pub use engine::Engine;
pub use error::{StoreError, StoreResult};
pub use models::{ConfigEntry, InitReport, User};
pub use request::{Request, Responder, Ticket};
pub use schema::{COMPATIBLE_VERSION, SEEDED_ADMIN_EMAIL, SEEDED_ADMIN_NAME, default_config_value};
