//! Requests and their single-assignment result channels.
//!
//! Every request carries its immutable inputs and one [`Responder`]. The
//! caller keeps the paired [`Ticket`]. A responder is consumed by
//! [`Responder::complete`], so a request can resolve at most once, and
//! dropping it without completing resolves the ticket as cancelled, so a
//! request can never stay unresolved once the worker lets go of it.
//!
//! ```text
//! caller                         worker
//!   |  (Request, Ticket) = ...     |
//!   |  submit(Request) ----------> |  dispatch
//!   |  ticket.wait()               |  responder.complete(v)  -> Ok(v)
//!   |                              |  drop(responder)        -> Err(Cancelled)
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{StoreError, StoreResult};
use crate::models::{ConfigEntry, InitReport, User};

/// Caller side of a request: resolves once with the value or cancellation.
///
/// Block on it with [`Ticket::wait`] from ordinary threads, or `.await` it
/// from async code.
#[must_use = "a ticket does nothing unless waited on"]
#[derive(Debug)]
pub struct Ticket<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Ticket<T> {
    /// Block the calling thread until the worker completes or cancels the
    /// request.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async execution context; `.await`
    /// the ticket there instead.
    pub fn wait(self) -> StoreResult<T> {
        self.rx.blocking_recv().map_err(|_| StoreError::Cancelled)
    }

    /// A ticket that is already cancelled.
    #[cfg(test)]
    pub(crate) fn cancelled() -> Self {
        let (_, rx) = oneshot::channel();
        Self { rx }
    }
}

impl<T> Future for Ticket<T> {
    type Output = StoreResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.map_err(|_| StoreError::Cancelled))
    }
}

/// Worker side of a request. Written at most once.
#[derive(Debug)]
pub struct Responder<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Responder<T> {
    /// Resolve the ticket with `value`. A caller that already dropped its
    /// ticket is not an error.
    pub fn complete(self, value: T) {
        let _ = self.tx.send(value);
    }

    /// Resolve the ticket as cancelled.
    pub fn cancel(self) {
        drop(self);
    }
}

fn pair<T>() -> (Responder<T>, Ticket<T>) {
    let (tx, rx) = oneshot::channel();
    (Responder { tx }, Ticket { rx })
}

/// The closed set of operations the worker understands.
pub enum Request {
    /// Bootstrap (if needed), open and version-check the storage file.
    Initialize {
        program_name: String,
        path_override: Option<PathBuf>,
        reply: Responder<InitReport>,
    },
    GetAllConfig {
        reply: Responder<Vec<ConfigEntry>>,
    },
    GetConfig {
        category: String,
        setting: String,
        reply: Responder<Option<String>>,
    },
    SetConfig {
        entry: ConfigEntry,
        reply: Responder<bool>,
    },
    ListUsers {
        reply: Responder<Vec<User>>,
    },
    GetUserById {
        id: i64,
        reply: Responder<Option<User>>,
    },
    GetUserByEmail {
        email: String,
        reply: Responder<Option<User>>,
    },
    Authenticate {
        email: String,
        password: String,
        reply: Responder<Option<User>>,
    },
    /// Insert or update; the saved entity comes back with its id filled in.
    SaveUser {
        user: User,
        reply: Responder<User>,
    },
    DeleteUser {
        id: i64,
        reply: Responder<bool>,
    },
    /// Detach every user from a mail gateway; yields the number of rows touched.
    ClearMailGateway {
        gateway_id: i64,
        reply: Responder<usize>,
    },
}

impl Request {
    pub fn initialize(
        program_name: impl Into<String>,
        path_override: Option<PathBuf>,
    ) -> (Self, Ticket<InitReport>) {
        let (reply, ticket) = pair();
        let req = Self::Initialize {
            program_name: program_name.into(),
            path_override,
            reply,
        };
        (req, ticket)
    }

    pub fn get_all_config() -> (Self, Ticket<Vec<ConfigEntry>>) {
        let (reply, ticket) = pair();
        (Self::GetAllConfig { reply }, ticket)
    }

    pub fn get_config(
        category: impl Into<String>,
        setting: impl Into<String>,
    ) -> (Self, Ticket<Option<String>>) {
        let (reply, ticket) = pair();
        let req = Self::GetConfig {
            category: category.into(),
            setting: setting.into(),
            reply,
        };
        (req, ticket)
    }

    pub fn set_config(entry: ConfigEntry) -> (Self, Ticket<bool>) {
        let (reply, ticket) = pair();
        (Self::SetConfig { entry, reply }, ticket)
    }

    pub fn list_users() -> (Self, Ticket<Vec<User>>) {
        let (reply, ticket) = pair();
        (Self::ListUsers { reply }, ticket)
    }

    pub fn get_user_by_id(id: i64) -> (Self, Ticket<Option<User>>) {
        let (reply, ticket) = pair();
        (Self::GetUserById { id, reply }, ticket)
    }

    pub fn get_user_by_email(email: impl Into<String>) -> (Self, Ticket<Option<User>>) {
        let (reply, ticket) = pair();
        let req = Self::GetUserByEmail {
            email: email.into(),
            reply,
        };
        (req, ticket)
    }

    pub fn authenticate(
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> (Self, Ticket<Option<User>>) {
        let (reply, ticket) = pair();
        let req = Self::Authenticate {
            email: email.into(),
            password: password.into(),
            reply,
        };
        (req, ticket)
    }

    pub fn save_user(user: User) -> (Self, Ticket<User>) {
        let (reply, ticket) = pair();
        (Self::SaveUser { user, reply }, ticket)
    }

    pub fn delete_user(id: i64) -> (Self, Ticket<bool>) {
        let (reply, ticket) = pair();
        (Self::DeleteUser { id, reply }, ticket)
    }

    pub fn clear_mail_gateway(gateway_id: i64) -> (Self, Ticket<usize>) {
        let (reply, ticket) = pair();
        (Self::ClearMailGateway { gateway_id, reply }, ticket)
    }

    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::GetAllConfig { .. } => "get_all_config",
            Self::GetConfig { .. } => "get_config",
            Self::SetConfig { .. } => "set_config",
            Self::ListUsers { .. } => "list_users",
            Self::GetUserById { .. } => "get_user_by_id",
            Self::GetUserByEmail { .. } => "get_user_by_email",
            Self::Authenticate { .. } => "authenticate",
            Self::SaveUser { .. } => "save_user",
            Self::DeleteUser { .. } => "delete_user",
            Self::ClearMailGateway { .. } => "clear_mail_gateway",
        }
    }
}
