//! CLI argument definitions for svcwatch.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// svcwatch -- manage the fleet monitor's configuration database.
#[derive(Parser)]
#[command(
    name = "svcwatch",
    version,
    about = "svcwatch -- fleet monitor configuration database tool",
    long_about = "Initializes the shared configuration database and inspects or edits its \
                  settings and user accounts through the serialized storage engine."
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, global = true, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Use this storage file instead of the configured one.
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database if missing and check its version.
    Init,

    /// Inspect or edit System settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Manage user accounts.
    Users {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Authentication helpers.
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

/// Actions on System settings.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// List every setting.
    List,
    /// Print one setting.
    Get {
        category: String,
        setting: String,
    },
    /// Insert or replace one setting.
    Set {
        category: String,
        setting: String,
        value: String,
    },
}

/// Actions on user accounts.
#[derive(Subcommand)]
pub enum UserAction {
    /// List all users.
    List,
    /// Show one user, by id or email.
    Show {
        /// Numeric id or email address.
        user: String,
    },
    /// Create a new user.
    Add {
        /// Display name.
        display_name: String,
        /// Email address, used to sign in.
        email: String,
        /// Initial password.
        #[arg(long, short)]
        password: String,
        /// Grant administrator rights.
        #[arg(long)]
        admin: bool,
        /// Receive alert mail.
        #[arg(long)]
        maildrop: bool,
        /// Mail gateway to send alerts through.
        #[arg(long)]
        mail_gateway: Option<i64>,
    },
    /// Set a new password.
    Passwd {
        /// Numeric id or email address.
        user: String,
        #[arg(long, short)]
        password: String,
    },
    /// Enable or disable an account.
    Enable {
        /// Numeric id or email address.
        user: String,
        /// Disable instead of enable.
        #[arg(long)]
        off: bool,
    },
    /// Delete a user.
    Delete {
        /// Numeric id or email address.
        user: String,
    },
    /// Detach every user from a mail gateway.
    ClearGateway {
        gateway_id: i64,
    },
}

/// Authentication actions.
#[derive(Subcommand)]
pub enum AuthAction {
    /// Check an email and password against the stored accounts.
    Check {
        email: String,
        #[arg(long, short)]
        password: String,
    },
}
