use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use crate::error::{EnqueteError, Result};
use crate::models::Identity;

use super::SqliteSurveyStore;

#[derive(Debug, Clone)]
pub(crate) struct AccountRow {
    pub(crate) user_id: String,
    pub(crate) email: String,
    pub(crate) password_salt: String,
    pub(crate) password_digest: String,
}

impl SqliteSurveyStore {
    pub(crate) fn create_account(
        &self,
        email: &str,
        full_name: Option<&str>,
        password_salt: &str,
        password_digest: &str,
    ) -> Result<Identity> {
        self.with_tx(|tx| {
            let existing = tx
                .query_row(
                    "SELECT user_id FROM accounts WHERE email = ?1",
                    params![email],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            if existing.is_some() {
                return Err(EnqueteError::Conflict(format!(
                    "an account already exists for {email}"
                )));
            }

            let user_id = Uuid::new_v4().to_string();
            tx.execute(
                r"
                INSERT INTO accounts(user_id, email, full_name, password_salt, password_digest, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
                params![
                    user_id,
                    email,
                    full_name,
                    password_salt,
                    password_digest,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(Identity {
                user_id,
                email: email.to_string(),
            })
        })
    }

    pub(crate) fn find_account(&self, email: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    r"
                    SELECT user_id, email, password_salt, password_digest
                    FROM accounts
                    WHERE email = ?1
                    ",
                    params![email],
                    |row| {
                        Ok(AccountRow {
                            user_id: row.get(0)?,
                            email: row.get(1)?,
                            password_salt: row.get(2)?,
                            password_digest: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub(crate) fn set_signed_in(&self, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                r"
                INSERT INTO signed_in_state(slot, user_id, signed_in_at)
                VALUES (0, ?1, ?2)
                ON CONFLICT(slot) DO UPDATE SET
                  user_id = excluded.user_id,
                  signed_in_at = excluded.signed_in_at
                ",
                params![user_id, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Returns whether a signed-in identity was present.
    pub(crate) fn clear_signed_in(&self) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM signed_in_state WHERE slot = 0", [])?;
            Ok(removed > 0)
        })
    }

    pub(crate) fn signed_in_identity(&self) -> Result<Option<Identity>> {
        self.with_conn(|conn| {
            let identity = conn
                .query_row(
                    r"
                    SELECT accounts.user_id, accounts.email
                    FROM signed_in_state
                    JOIN accounts ON accounts.user_id = signed_in_state.user_id
                    WHERE signed_in_state.slot = 0
                    ",
                    [],
                    |row| {
                        Ok(Identity {
                            user_id: row.get(0)?,
                            email: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(identity)
        })
    }
}
