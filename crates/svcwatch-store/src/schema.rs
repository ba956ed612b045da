//! Storage file layout, first-run bootstrap and the version gate.
//!
//! Bootstrap runs only when the storage file does not exist yet: it creates
//! the directory and file, every table and index, the default `System` rows
//! and one administrator account with a generated password. Every later
//! start only checks that the stored `(System, Version)` tag equals
//! [`COMPATIBLE_VERSION`].

use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info, warn};

use crate::config::StorageLocation;
use crate::config_store;
use crate::credentials;
use crate::error::{StoreError, StoreResult};
use crate::models::{ConfigEntry, User};
use crate::user_store;

/// Version tag this build reads and writes.
pub const COMPATIBLE_VERSION: &str = "1.0";

/// Email of the account seeded into a fresh storage file.
pub const SEEDED_ADMIN_EMAIL: &str = "admin@local";

/// Display name of the seeded account.
pub const SEEDED_ADMIN_NAME: &str = "Administrator";

/// Tables and indexes, in creation order.
static TABLES: &[(&str, &str)] = &[
    (
        "System",
        // Configuration and version data. The unique index makes writes upserts.
        r#"
            CREATE TABLE System (Category TEXT, Setting TEXT, Value TEXT);
            CREATE UNIQUE INDEX idx_System_CategorySetting ON System(Category, Setting);
        "#,
    ),
    (
        "User",
        r#"
            CREATE TABLE User (
                UserID        INTEGER PRIMARY KEY,
                DisplayName   TEXT,
                Email         TEXT,
                Salt          TEXT NOT NULL,
                PassHash      TEXT NOT NULL,
                Enabled       INTEGER NOT NULL,
                Admin         INTEGER NOT NULL,
                Maildrop      INTEGER NOT NULL,
                MailGatewayID INTEGER
            );
        "#,
    ),
    (
        "ManagerService",
        // Distributes configs, receives logs and sends commands to watchdogs.
        r#"
            CREATE TABLE ManagerService (
                ManagerServiceID INTEGER PRIMARY KEY,
                DisplayName      TEXT,
                IPAddress        TEXT NOT NULL,
                Port             INTEGER NOT NULL,
                Enabled          INTEGER NOT NULL
            );
        "#,
    ),
    (
        "WatchdogService",
        // Monitors services on a client and reports to a manager.
        r#"
            CREATE TABLE WatchdogService (
                WatchdogServiceID INTEGER PRIMARY KEY,
                DisplayName       TEXT,
                ServiceToken      TEXT NOT NULL,
                Enabled           INTEGER NOT NULL
            );
        "#,
    ),
    (
        "TemplateGroup",
        r#"
            CREATE TABLE TemplateGroup (
                TemplateGroupID INTEGER PRIMARY KEY,
                DisplayName     TEXT NOT NULL
            );
        "#,
    ),
    (
        "TemplateService",
        // ControlMode: 0 = monitor only, 1 = manual start/stop,
        // 2 = restart after RestartDelaySec when stopped.
        r#"
            CREATE TABLE TemplateService (
                TemplateServiceID INTEGER PRIMARY KEY,
                TemplateGroupID   INTEGER,
                DisplayName       TEXT NOT NULL,
                SVCName           TEXT NOT NULL,
                ControlMode       INTEGER NOT NULL,
                RestartDelaySec   INTEGER NOT NULL
            );
        "#,
    ),
    (
        "TemplateFile",
        r#"
            CREATE TABLE TemplateFile (
                TemplateFileID  INTEGER PRIMARY KEY,
                TemplateGroupID INTEGER,
                DisplayName     TEXT NOT NULL,
                Path            TEXT NOT NULL
            );
        "#,
    ),
];

/// `System` rows written into every new storage file.
static DEFAULT_CONFIG: &[(&str, &str, &str)] = &[("System", "Version", COMPATIBLE_VERSION)];

/// Compiled-in default for a `System` key, or an empty string if none.
pub fn default_config_value(category: &str, setting: &str) -> &'static str {
    DEFAULT_CONFIG
        .iter()
        .find(|(c, s, _)| *c == category && *s == setting)
        .map(|(_, _, v)| *v)
        .unwrap_or("")
}

/// Create every table and index on `conn`.
pub(crate) fn create_tables(conn: &Connection) -> StoreResult<()> {
    for (name, sql) in TABLES {
        conn.execute_batch(sql)?;
        debug!(table = *name, "table created");
    }
    Ok(())
}

/// Apply per-connection settings.
pub(crate) fn apply_pragmas(conn: &Connection) -> StoreResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5_000_i32)?;
    Ok(())
}

/// Open an existing storage file. Never creates one.
pub(crate) fn open_existing(path: &Path) -> StoreResult<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
        | OpenFlags::SQLITE_OPEN_URI;
    let conn = Connection::open_with_flags(path, flags)?;
    apply_pragmas(&conn)?;
    Ok(conn)
}

/// Format a brand-new storage file at `location`.
///
/// Returns the generated administrator password. On failure the partially
/// written file is removed so the next initialization starts over.
pub(crate) fn bootstrap(location: &StorageLocation) -> StoreResult<String> {
    info!(path = %location.file.display(), "creating new database");

    if !location.directory.as_os_str().is_empty() {
        std::fs::create_dir_all(&location.directory)?;
    }

    match format_new(&location.file) {
        Ok(password) => Ok(password),
        Err(source) => {
            if let Err(e) = std::fs::remove_file(&location.file) {
                warn!(path = %location.file.display(), error = %e, "could not remove partial database");
            }
            Err(StoreError::Bootstrap {
                path: location.file.clone(),
                source: Box::new(source),
            })
        }
    }
}

fn format_new(path: &Path) -> StoreResult<String> {
    let mut conn = Connection::open(path)?;
    apply_pragmas(&conn)?;

    let tx = conn.transaction()?;
    create_tables(&tx)?;

    for (category, setting, value) in DEFAULT_CONFIG {
        config_store::upsert(&tx, &ConfigEntry::new(*category, *setting, *value))?;
    }

    let password = credentials::generate_nonce(credentials::GENERATED_PASSWORD_LEN)?;
    let admin = User::new(SEEDED_ADMIN_NAME, SEEDED_ADMIN_EMAIL)
        .with_admin(true)
        .with_password(&password)?;
    let admin = user_store::save(&tx, admin)?;
    tx.commit()?;

    info!(user_id = ?admin.id, email = SEEDED_ADMIN_EMAIL, "seeded administrator account");
    Ok(password)
}

/// Bootstrap the file if it does not exist yet, open it and check the
/// version tag.
///
/// Returns the open connection and, for a freshly created file, the seeded
/// administrator password.
pub(crate) fn initialize(location: &StorageLocation) -> StoreResult<(Connection, Option<String>)> {
    let seeded = if location.file.is_file() {
        debug!(path = %location.file.display(), "using existing database");
        None
    } else {
        Some(bootstrap(location)?)
    };

    let conn = open_existing(&location.file)?;
    check_version(&conn)?;
    Ok((conn, seeded))
}

/// Fail unless the stored version tag equals [`COMPATIBLE_VERSION`].
pub(crate) fn check_version(conn: &Connection) -> StoreResult<()> {
    let found = config_store::get(conn, "System", "Version")?;
    if found.as_deref() == Some(COMPATIBLE_VERSION) {
        Ok(())
    } else {
        Err(StoreError::SchemaIncompatible {
            found,
            expected: COMPATIBLE_VERSION,
        })
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_location(dir: &tempfile::TempDir) -> StorageLocation {
        StorageLocation::resolve("svcwatch", None, Some(dir.path()))
    }

    #[test]
    fn create_tables_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        for (name, _) in TABLES {
            let count: i64 = conn
                .query_row(&format!("SELECT count(*) FROM {name}"), [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, 0, "table {name} should exist and be empty");
        }
    }

    #[test]
    fn unique_index_rejects_plain_duplicate_insert() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn.execute("INSERT INTO System VALUES ('A', 'b', '1')", []).unwrap();
        assert!(conn.execute("INSERT INTO System VALUES ('A', 'b', '2')", []).is_err());
    }

    #[test]
    fn bootstrap_creates_directory_file_and_seeds() {
        let dir = tempfile::tempdir().unwrap();
        let location = temp_location(&dir);

        let password = bootstrap(&location).unwrap();
        assert_eq!(password.len(), credentials::GENERATED_PASSWORD_LEN);
        assert!(location.file.exists());

        let conn = open_existing(&location.file).unwrap();
        check_version(&conn).unwrap();

        let admin = user_store::authenticate(&conn, SEEDED_ADMIN_EMAIL, &password)
            .unwrap()
            .expect("seeded admin authenticates with generated password");
        assert!(admin.admin);
        assert!(admin.enabled);
        assert_eq!(admin.display_name, SEEDED_ADMIN_NAME);
    }

    #[test]
    fn each_bootstrap_generates_a_different_admin_password() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let pa = bootstrap(&temp_location(&a)).unwrap();
        let pb = bootstrap(&temp_location(&b)).unwrap();
        assert_ne!(pa, pb);
    }

    #[test]
    fn version_mismatch_is_incompatible() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        config_store::upsert(&conn, &ConfigEntry::new("System", "Version", "0.5")).unwrap();

        match check_version(&conn) {
            Err(StoreError::SchemaIncompatible { found, expected }) => {
                assert_eq!(found.as_deref(), Some("0.5"));
                assert_eq!(expected, COMPATIBLE_VERSION);
            }
            other => panic!("expected SchemaIncompatible, got {other:?}"),
        }
    }

    #[test]
    fn missing_version_row_is_incompatible() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        assert!(matches!(
            check_version(&conn),
            Err(StoreError::SchemaIncompatible { found: None, .. })
        ));
    }

    #[test]
    fn initialize_bootstraps_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let location = temp_location(&dir);

        let (conn, seeded) = initialize(&location).unwrap();
        assert!(seeded.is_some());
        config_store::upsert(&conn, &ConfigEntry::new("Mail", "Relay", "smtp.local")).unwrap();
        drop(conn);

        let (conn, seeded) = initialize(&location).unwrap();
        assert!(seeded.is_none());
        assert_eq!(
            config_store::get(&conn, "Mail", "Relay").unwrap().as_deref(),
            Some("smtp.local")
        );
        assert_eq!(user_store::list(&conn).unwrap().len(), 1);
    }

    #[test]
    fn initialize_rejects_foreign_version() {
        let dir = tempfile::tempdir().unwrap();
        let location = temp_location(&dir);
        let (conn, _) = initialize(&location).unwrap();
        config_store::upsert(&conn, &ConfigEntry::new("System", "Version", "2.0")).unwrap();
        drop(conn);

        assert!(matches!(
            initialize(&location),
            Err(StoreError::SchemaIncompatible { .. })
        ));
    }

    #[test]
    fn open_existing_does_not_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.db");
        assert!(open_existing(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn default_values() {
        assert_eq!(default_config_value("System", "Version"), COMPATIBLE_VERSION);
        assert_eq!(default_config_value("System", "Unknown"), "");
    }
}
