//! Settings type definitions.
//!
//! Every section is `#[serde(default)]` so a partial JSON file only needs the
//! keys it overrides. Keys are camelCase on disk.

use serde::{Deserialize, Serialize};

use lanes_core::todo::is_color_tag;
use lanes_core::{DeletePolicy, DEFAULT_COLOR};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LanesSettings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub todos: TodoSettings,
    pub logging: LoggingSettings,
}

impl LanesSettings {
    /// Reject values that load fine as JSON but make no sense.
    pub fn validate(&self) -> Result<()> {
        if !is_color_tag(&self.todos.default_color) {
            return Err(SettingsError::InvalidValue(format!(
                "todos.defaultColor must be a #hex tag, got {}",
                self.todos.default_color
            )));
        }
        if self.auth.session_ttl_hours == 0 {
            return Err(SettingsError::InvalidValue(
                "auth.sessionTtlHours must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Upper bound on one RPC, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9300,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: lanes_dir().join("database/lanes.db").display().to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Lifetime of a bearer token issued by `issue-token`.
    pub session_ttl_hours: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            session_ttl_hours: 24 * 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TodoSettings {
    pub delete_policy: DeletePolicy,
    pub default_color: String,
}

impl Default for TodoSettings {
    fn default() -> Self {
        Self {
            delete_policy: DeletePolicy::Detach,
            default_color: DEFAULT_COLOR.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `trace` | `debug` | `info` | `warn` | `error`. `RUST_LOG` wins over this.
    pub level: String,
    /// Persist warn+ events to a SQLite log database.
    pub log_to_sqlite: bool,
    pub log_db_path: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_sqlite: true,
            log_db_path: lanes_dir().join("database/logs.db").display().to_string(),
        }
    }
}

/// `~/.lanes`, falling back to `/tmp/.lanes` without a home directory.
pub fn lanes_dir() -> std::path::PathBuf {
    std::env::var("HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("/tmp"))
        .join(".lanes")
}
