//! Row types exchanged with the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::credentials;
use crate::error::{StoreError, StoreResult};

/// One `(Category, Setting) -> Value` row of the `System` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub category: String,
    pub setting: String,
    pub value: String,
}

impl ConfigEntry {
    pub fn new(
        category: impl Into<String>,
        setting: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            setting: setting.into(),
            value: value.into(),
        }
    }
}

/// A user account.
///
/// `id` is `None` until the row has been inserted; saving a user with no id
/// inserts, saving one with an id updates (or re-inserts if the row is gone).
/// The salt and hash are never serialized outward, and users are never
/// deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Storage-assigned identity.
    pub id: Option<i64>,
    pub display_name: String,
    pub email: String,
    #[serde(skip)]
    pub salt: String,
    #[serde(skip)]
    pub pass_hash: String,
    /// Disabled accounts never authenticate.
    pub enabled: bool,
    pub admin: bool,
    pub maildrop: bool,
    /// Optional mail gateway this user's mail is routed through.
    pub mail_gateway_id: Option<i64>,
}

impl User {
    /// A new, enabled, non-admin account with no credential yet.
    pub fn new(display_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: None,
            display_name: display_name.into(),
            email: email.into(),
            salt: String::new(),
            pass_hash: String::new(),
            enabled: true,
            admin: false,
            maildrop: false,
            mail_gateway_id: None,
        }
    }

    /// Set a new password, always regenerating the salt.
    pub fn set_password(&mut self, password: &str) -> StoreResult<()> {
        credentials::generate_hash(self, password)
    }

    /// Builder form of [`User::set_password`].
    pub fn with_password(mut self, password: &str) -> StoreResult<Self> {
        self.set_password(password)?;
        Ok(self)
    }

    /// Check `password` against the stored salt and hash.
    pub fn verify_password(&self, password: &str) -> bool {
        credentials::validate(self, password)
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_maildrop(mut self, maildrop: bool) -> Self {
        self.maildrop = maildrop;
        self
    }

    pub fn with_mail_gateway(mut self, gateway_id: Option<i64>) -> Self {
        self.mail_gateway_id = gateway_id;
        self
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.display_name, self.email)
    }
}

/// Outcome of an initialization request.
///
/// `error` is `None` on success. On a freshly bootstrapped storage file the
/// generated administrator password is handed back exactly once.
#[derive(Debug, Default)]
pub struct InitReport {
    pub error: Option<StoreError>,
    pub seeded_admin_password: Option<String>,
}

impl InitReport {
    pub(crate) fn success(seeded_admin_password: Option<String>) -> Self {
        Self {
            error: None,
            seeded_admin_password,
        }
    }

    pub(crate) fn failure(error: StoreError) -> Self {
        Self {
            error: Some(error),
            seeded_admin_password: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Operator-facing description of the failure, if any.
    pub fn message(&self) -> Option<String> {
        self.error
            .as_ref()
            .map(|e| format!("Unable to start the database. {e}"))
    }

    /// Convert into a `Result`, dropping the seeded password on failure.
    pub fn into_result(self) -> StoreResult<Option<String>> {
        match self.error {
            None => Ok(self.seeded_admin_password),
            Some(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_display_form() {
        let user = User::new("Administrator", "admin@local");
        assert_eq!(user.to_string(), "Administrator <admin@local>");
    }

    #[test]
    fn new_user_is_enabled_and_unsaved() {
        let user = User::new("A", "a@example.com");
        assert!(user.id.is_none());
        assert!(user.enabled);
        assert!(!user.admin);
        assert!(!user.maildrop);
    }

    #[test]
    fn serialized_user_omits_credentials() {
        let user = User::new("A", "a@example.com").with_password("pw").unwrap();
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("salt").is_none());
        assert!(json.get("pass_hash").is_none());
        assert_eq!(json["email"], "a@example.com");

        // Serializing never strips the credential from the entity itself.
        assert!(user.verify_password("pw"));
    }

    #[test]
    fn failed_report_carries_message() {
        let report = InitReport::failure(StoreError::SchemaIncompatible {
            found: Some("0.1".into()),
            expected: "1.0",
        });
        assert!(!report.is_ok());
        let msg = report.message().unwrap();
        assert!(msg.starts_with("Unable to start the database."));
        assert!(msg.contains("incompatible database version"));
    }
}
