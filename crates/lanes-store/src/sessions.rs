//! Bearer-token sessions.
//!
//! The raw token is handed to the caller once and never stored: the table
//! keeps its SHA-256 digest, so a leaked database cannot be replayed.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rusqlite::OptionalExtension;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use lanes_core::UserId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// A freshly minted token. Only its digest is persisted.
#[derive(Debug)]
pub struct IssuedToken {
    pub token: SecretString,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionRepo {
    db: Database,
}

impl SessionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn issue(&self, user_id: &UserId, ttl: Duration) -> Result<IssuedToken, StoreError> {
        let token = generate_token();
        let now = Utc::now();
        let expires_at = now + ttl;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    hash_token(&token),
                    user_id.as_str(),
                    row_helpers::format_timestamp(now),
                    row_helpers::format_timestamp(expires_at),
                ],
            )?;
            Ok(())
        })?;

        Ok(IssuedToken {
            token: SecretString::from(token),
            user_id: user_id.clone(),
            expires_at,
        })
    }

    /// The owner of a live token. Unknown and expired tokens resolve to `None`.
    #[instrument(skip_all)]
    pub fn resolve(&self, token: &SecretString) -> Result<Option<UserId>, StoreError> {
        let digest = hash_token(token.expose_secret());
        let found = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT user_id, expires_at FROM sessions WHERE token_hash = ?1",
                    [&digest],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?)
        })?;

        let Some((user_id, expires_at)) = found else {
            debug!("unknown token");
            return Ok(None);
        };
        let expires_at = row_helpers::parse_timestamp(&expires_at, "sessions", "expires_at")?;
        if expires_at <= Utc::now() {
            debug!(user_id = %user_id, "expired token");
            return Ok(None);
        }
        Ok(Some(UserId::from_raw(user_id)))
    }

    /// Returns whether a session was removed.
    #[instrument(skip_all)]
    pub fn revoke(&self, token: &SecretString) -> Result<bool, StoreError> {
        let digest = hash_token(token.expose_secret());
        self.db.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM sessions WHERE token_hash = ?1", [&digest])?;
            Ok(changed > 0)
        })
    }

    /// Drop sessions past their expiry. Returns how many were removed.
    #[instrument(skip(self))]
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = row_helpers::format_timestamp(Utc::now());
        self.db.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [&now])?)
        })
    }
}

/// 32 random bytes, URL-safe base64 without padding.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}
