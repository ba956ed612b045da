//! CLI entry point for svcwatch.
//!
//! This binary provides the `svcwatch` command. Every subcommand starts a
//! storage engine, initializes it against the configured database and then
//! drives one or more requests through it.

mod cli;

use anyhow::{Context, Result, bail};
use clap::Parser;
use svcwatch_store::{Engine, StoreConfig, User, default_config_value};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{AuthAction, Cli, Commands, ConfigAction, UserAction};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    init_tracing("warn");

    let cli = Cli::parse();

    let mut config = StoreConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    if let Some(path) = cli.database {
        config.database = Some(path);
    }
    debug!(?config, "configuration loaded");

    let engine = Engine::start(&config).context("failed to start storage engine")?;
    let report = engine
        .initialize_from_config()
        .await
        .context("initialization was cancelled")?;
    if let Some(message) = report.message() {
        bail!(message);
    }

    let result = match cli.command {
        Commands::Init => {
            match report.seeded_admin_password {
                Some(password) => {
                    println!("Created a new database.");
                    println!("  Administrator login: {}", svcwatch_store::SEEDED_ADMIN_EMAIL);
                    println!("  Password:            {password}");
                    println!("Change this password with `svcwatch users passwd`.");
                }
                None => println!("Database is ready (version {}).", svcwatch_store::COMPATIBLE_VERSION),
            }
            Ok(())
        }
        Commands::Config { action } => cmd_config(&engine, action).await,
        Commands::Users { action } => cmd_users(&engine, action).await,
        Commands::Auth { action } => cmd_auth(&engine, action).await,
    };

    engine.shutdown().context("storage engine did not stop cleanly")?;
    result
}

// ---------------------------------------------------------------------------
// Subcommand: config
// ---------------------------------------------------------------------------

async fn cmd_config(engine: &Engine, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::List => {
            let entries = engine.get_all_config().await?;
            if entries.is_empty() {
                println!("No settings.");
            }
            for entry in entries {
                println!("{}.{} = {}", entry.category, entry.setting, entry.value);
            }
        }
        ConfigAction::Get { category, setting } => {
            match engine.get_config(category.clone(), setting.clone()).await? {
                Some(value) => println!("{value}"),
                None => {
                    let default = default_config_value(&category, &setting);
                    println!("(not set, default: {default:?})");
                }
            }
        }
        ConfigAction::Set {
            category,
            setting,
            value,
        } => {
            engine
                .set_config(category.clone(), setting.clone(), value)
                .await?;
            info!(%category, %setting, "setting updated");
            println!("Updated {category}.{setting}.");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: users
// ---------------------------------------------------------------------------

async fn cmd_users(engine: &Engine, action: UserAction) -> Result<()> {
    match action {
        UserAction::List => {
            let users = engine.list_users().await?;
            if users.is_empty() {
                println!("No users.");
            }
            for user in users {
                print_user_line(&user);
            }
        }
        UserAction::Show { user } => {
            let user = find_user(engine, &user).await?;
            println!("{user}");
            println!("  id:           {}", user.id.unwrap_or_default());
            println!("  enabled:      {}", user.enabled);
            println!("  admin:        {}", user.admin);
            println!("  maildrop:     {}", user.maildrop);
            match user.mail_gateway_id {
                Some(id) => println!("  mail gateway: {id}"),
                None => println!("  mail gateway: -"),
            }
        }
        UserAction::Add {
            display_name,
            email,
            password,
            admin,
            maildrop,
            mail_gateway,
        } => {
            if engine.get_user_by_email(email.clone()).await?.is_some() {
                bail!("a user with email {email} already exists");
            }
            let user = User::new(display_name, email)
                .with_admin(admin)
                .with_maildrop(maildrop)
                .with_mail_gateway(mail_gateway)
                .with_password(&password)?;
            let saved = engine.save_user(user).await?;
            println!("Created user {} ({saved}).", saved.id.unwrap_or_default());
        }
        UserAction::Passwd { user, password } => {
            let mut user = find_user(engine, &user).await?;
            user.set_password(&password)?;
            let saved = engine.save_user(user).await?;
            println!("Password updated for {saved}.");
        }
        UserAction::Enable { user, off } => {
            let user = find_user(engine, &user).await?.with_enabled(!off);
            let saved = engine.save_user(user).await?;
            let state = if saved.enabled { "enabled" } else { "disabled" };
            println!("{saved} is now {state}.");
        }
        UserAction::Delete { user } => {
            let user = find_user(engine, &user).await?;
            let id = user.id.context("stored user has no id")?;
            if engine.delete_user(id).await? {
                println!("Deleted {user}.");
            } else {
                bail!("user {id} was already gone");
            }
        }
        UserAction::ClearGateway { gateway_id } => {
            let count = engine.clear_mail_gateway(gateway_id).await?;
            println!("Detached {count} user(s) from mail gateway {gateway_id}.");
        }
    }
    Ok(())
}

/// Look a user up by numeric id, or by email otherwise.
async fn find_user(engine: &Engine, key: &str) -> Result<User> {
    let found = match key.parse::<i64>() {
        Ok(id) => engine.get_user_by_id(id).await?,
        Err(_) => engine.get_user_by_email(key).await?,
    };
    found.with_context(|| format!("no such user: {key}"))
}

fn print_user_line(user: &User) {
    let mut flags = Vec::new();
    if user.admin {
        flags.push("admin");
    }
    if user.maildrop {
        flags.push("maildrop");
    }
    if !user.enabled {
        flags.push("disabled");
    }
    println!(
        "{:>5}  {user}  {}",
        user.id.unwrap_or_default(),
        flags.join(",")
    );
}

// ---------------------------------------------------------------------------
// Subcommand: auth
// ---------------------------------------------------------------------------

async fn cmd_auth(engine: &Engine, action: AuthAction) -> Result<()> {
    match action {
        AuthAction::Check { email, password } => {
            match engine.authenticate(email.clone(), password).await? {
                Some(user) => println!("OK: {user}"),
                None => bail!("authentication failed for {email}"),
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with an env filter.
///
/// Reads `RUST_LOG` if set, otherwise falls back to `default_level`.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
