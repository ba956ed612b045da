//! `User` table: account persistence and authentication.
//!
//! Booleans are stored as `0`/`1` integers. Email lookups are
//! case-insensitive. Saving is an upsert keyed on the storage-assigned
//! `UserID`: a stale id (row deleted in the meantime) degrades to an insert
//! and the entity comes back with its fresh id.

use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, instrument};

use crate::credentials;
use crate::error::StoreResult;
use crate::models::User;

const USER_COLUMNS: &str =
    "UserID, DisplayName, Email, Salt, PassHash, Enabled, Admin, Maildrop, MailGatewayID";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: Some(row.get(0)?),
        display_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        email: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        salt: row.get(3)?,
        pass_hash: row.get(4)?,
        enabled: row.get::<_, i64>(5)? > 0,
        admin: row.get::<_, i64>(6)? > 0,
        maildrop: row.get::<_, i64>(7)? > 0,
        mail_gateway_id: row.get(8)?,
    })
}

/// All accounts, in id order.
#[instrument(skip(conn))]
pub fn list(conn: &Connection) -> StoreResult<Vec<User>> {
    let mut stmt = conn.prepare_cached(&format!("SELECT {USER_COLUMNS} FROM User ORDER BY UserID"))?;
    let users = stmt
        .query_map([], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

/// Fetch by id, returning `None` if not found.
#[instrument(skip(conn))]
pub fn get_by_id(conn: &Connection, id: i64) -> StoreResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM User WHERE UserID = ?1"),
            rusqlite::params![id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// Fetch by email, ignoring case.
#[instrument(skip(conn))]
pub fn get_by_email(conn: &Connection, email: &str) -> StoreResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM User WHERE Email = ?1 COLLATE NOCASE"),
            rusqlite::params![email],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// Look up by email and check the password.
///
/// Returns `None` for an unknown email, a wrong password, or a disabled
/// account.
#[instrument(skip(conn, password))]
pub fn authenticate(conn: &Connection, email: &str, password: &str) -> StoreResult<Option<User>> {
    let Some(user) = get_by_email(conn, email)? else {
        debug!("authentication failed: unknown email");
        return Ok(None);
    };

    // Disabled accounts cannot authenticate.
    if !user.enabled {
        debug!(user_id = ?user.id, "authentication refused: account disabled");
        return Ok(None);
    }

    if credentials::validate(&user, password) {
        Ok(Some(user))
    } else {
        debug!(user_id = ?user.id, "authentication failed: bad password");
        Ok(None)
    }
}

/// Insert or update `user`, returning it with its id filled in.
#[instrument(skip(conn, user), fields(user_id = ?user.id, email = %user.email))]
pub fn save(conn: &Connection, mut user: User) -> StoreResult<User> {
    if let Some(id) = user.id {
        if get_by_id(conn, id)?.is_some() {
            conn.execute(
                "UPDATE User SET DisplayName = ?1, Email = ?2, Salt = ?3, PassHash = ?4, \
                 Enabled = ?5, Admin = ?6, Maildrop = ?7, MailGatewayID = ?8 WHERE UserID = ?9",
                rusqlite::params![
                    user.display_name,
                    user.email,
                    user.salt,
                    user.pass_hash,
                    i64::from(user.enabled),
                    i64::from(user.admin),
                    i64::from(user.maildrop),
                    user.mail_gateway_id,
                    id,
                ],
            )?;
            debug!("user updated");
            return Ok(user);
        }

        debug!(stale_id = id, "user row no longer exists, inserting");
        user.id = None;
    }

    conn.execute(
        "INSERT INTO User (DisplayName, Email, Salt, PassHash, Enabled, Admin, Maildrop, MailGatewayID) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            user.display_name,
            user.email,
            user.salt,
            user.pass_hash,
            i64::from(user.enabled),
            i64::from(user.admin),
            i64::from(user.maildrop),
            user.mail_gateway_id,
        ],
    )?;
    user.id = Some(conn.last_insert_rowid());
    debug!(new_id = ?user.id, "user inserted");
    Ok(user)
}

/// Delete by id, returning `true` if a row was removed.
#[instrument(skip(conn))]
pub fn delete(conn: &Connection, id: i64) -> StoreResult<bool> {
    let deleted = conn.execute("DELETE FROM User WHERE UserID = ?1", rusqlite::params![id])?;
    Ok(deleted > 0)
}

/// Null out `MailGatewayID` on every user that references `gateway_id`.
#[instrument(skip(conn))]
pub fn clear_mail_gateway(conn: &Connection, gateway_id: i64) -> StoreResult<usize> {
    let updated = conn.execute(
        "UPDATE User SET MailGatewayID = NULL WHERE MailGatewayID = ?1",
        rusqlite::params![gateway_id],
    )?;
    Ok(updated)
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    fn setup_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        conn
    }

    fn alice() -> User {
        User::new("Alice", "alice@example.com")
            .with_password("s3cret")
            .unwrap()
    }

    #[test]
    fn insert_assigns_id_and_round_trips() {
        let conn = setup_conn();
        let saved = save(&conn, alice()).unwrap();
        let id = saved.id.expect("id assigned on insert");

        let loaded = get_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(loaded, saved);
    }

    #[test]
    fn update_existing_row_keeps_id() {
        let conn = setup_conn();
        let mut saved = save(&conn, alice()).unwrap();
        let id = saved.id.unwrap();

        saved.display_name = "Alice B.".into();
        saved.admin = true;
        let updated = save(&conn, saved).unwrap();

        assert_eq!(updated.id, Some(id));
        assert_eq!(list(&conn).unwrap().len(), 1);
        let loaded = get_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(loaded.display_name, "Alice B.");
        assert!(loaded.admin);
    }

    #[test]
    fn stale_id_degrades_to_insert() {
        let conn = setup_conn();
        let saved = save(&conn, alice()).unwrap();
        let old_id = saved.id.unwrap();
        assert!(delete(&conn, old_id).unwrap());

        let reinserted = save(&conn, saved).unwrap();
        let new_id = reinserted.id.unwrap();
        assert!(get_by_id(&conn, new_id).unwrap().is_some());
        assert_eq!(list(&conn).unwrap().len(), 1);
    }

    #[test]
    fn email_lookup_ignores_case() {
        let conn = setup_conn();
        save(&conn, alice()).unwrap();
        let found = get_by_email(&conn, "ALICE@Example.COM").unwrap();
        assert_eq!(found.unwrap().display_name, "Alice");
    }

    #[test]
    fn authenticate_checks_password() {
        let conn = setup_conn();
        save(&conn, alice()).unwrap();

        assert!(authenticate(&conn, "alice@example.com", "s3cret").unwrap().is_some());
        assert!(authenticate(&conn, "alice@example.com", "wrong").unwrap().is_none());
        assert!(authenticate(&conn, "nobody@example.com", "s3cret").unwrap().is_none());
    }

    #[test]
    fn disabled_account_never_authenticates() {
        let conn = setup_conn();
        save(&conn, alice().with_enabled(false)).unwrap();
        assert!(authenticate(&conn, "alice@example.com", "s3cret").unwrap().is_none());
    }

    #[test]
    fn flags_are_stored_as_integers() {
        let conn = setup_conn();
        let saved = save(&conn, alice().with_admin(true).with_maildrop(true)).unwrap();
        let (enabled, admin, maildrop): (i64, i64, i64) = conn
            .query_row(
                "SELECT Enabled, Admin, Maildrop FROM User WHERE UserID = ?1",
                rusqlite::params![saved.id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!((enabled, admin, maildrop), (1, 1, 1));
    }

    #[test]
    fn delete_nonexistent() {
        let conn = setup_conn();
        assert!(!delete(&conn, 42).unwrap());
    }

    #[test]
    fn clear_mail_gateway_detaches_users() {
        let conn = setup_conn();
        save(&conn, alice().with_mail_gateway(Some(7))).unwrap();
        save(
            &conn,
            User::new("Bob", "bob@example.com").with_mail_gateway(Some(7)),
        )
        .unwrap();
        save(
            &conn,
            User::new("Carol", "carol@example.com").with_mail_gateway(Some(8)),
        )
        .unwrap();

        assert_eq!(clear_mail_gateway(&conn, 7).unwrap(), 2);
        let remaining: Vec<_> = list(&conn)
            .unwrap()
            .into_iter()
            .filter_map(|u| u.mail_gateway_id)
            .collect();
        assert_eq!(remaining, vec![8]);
    }
}
