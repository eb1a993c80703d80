use chrono::Utc;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use lanes_core::UserId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// A signed-in identity, keyed by the provider that vouched for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    pub id: UserId,
    pub provider: String,
    pub provider_account_id: String,
    pub name: String,
    pub email: Option<String>,
    pub created_at: String,
}

const USER_COLUMNS: &str = "id, provider, provider_account_id, name, email, created_at";

pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Find the user for `(provider, account_id)` or register a new one.
    /// An existing user keeps its id; name and email are refreshed.
    #[instrument(skip(self, name, email))]
    pub fn get_or_create(
        &self,
        provider: &str,
        account_id: &str,
        name: &str,
        email: Option<&str>,
    ) -> Result<UserRow, StoreError> {
        self.db.transaction(|conn| {
            let existing = conn
                .query_row(
                    &format!(
                        "SELECT {USER_COLUMNS} FROM users WHERE provider = ?1 AND provider_account_id = ?2"
                    ),
                    [provider, account_id],
                    |row| Ok(row_to_user(row)),
                )
                .optional()?
                .transpose()?;

            if let Some(mut user) = existing {
                conn.execute(
                    "UPDATE users SET name = ?1, email = ?2 WHERE id = ?3",
                    rusqlite::params![name, email, user.id.as_str()],
                )?;
                user.name = name.to_string();
                user.email = email.map(str::to_string);
                return Ok(user);
            }

            let user = UserRow {
                id: UserId::new(),
                provider: provider.to_string(),
                provider_account_id: account_id.to_string(),
                name: name.to_string(),
                email: email.map(str::to_string),
                created_at: row_helpers::format_timestamp(Utc::now()),
            };
            conn.execute(
                &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                rusqlite::params![
                    user.id.as_str(),
                    user.provider,
                    user.provider_account_id,
                    user.name,
                    user.email,
                    user.created_at,
                ],
            )?;
            tracing::info!(user_id = %user.id, "user registered");
            Ok(user)
        })
    }

    #[instrument(skip(self), fields(user_id = %id))]
    pub fn get(&self, id: &UserId) -> Result<Option<UserRow>, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id.as_str()],
                |row| Ok(row_to_user(row)),
            )
            .optional()?
            .transpose()
        })
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> Result<UserRow, StoreError> {
    Ok(UserRow {
        id: UserId::from_raw(row_helpers::get::<String>(row, 0, "users", "id")?),
        provider: row_helpers::get(row, 1, "users", "provider")?,
        provider_account_id: row_helpers::get(row, 2, "users", "provider_account_id")?,
        name: row_helpers::get(row, 3, "users", "name")?,
        email: row_helpers::get_opt(row, 4, "users", "email")?,
        created_at: row_helpers::get(row, 5, "users", "created_at")?,
    })
}
