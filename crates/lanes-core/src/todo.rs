//! The `Todo` entity and the payloads that create and patch it.
//!
//! Patch convention: a field missing from a [`TodoPatch`] leaves the stored
//! value unchanged. An explicit `null` clears the nullable fields
//! (`description`, `dueDate`, `parentId`) and is ignored for the rest.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::ids::{TodoId, UserId};

/// Colour given to todos created without one.
pub const DEFAULT_COLOR: &str = "#ef4444";

/// Priority lane a todo sits in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Lanes in board order, most pressing first.
    pub const LANES: [Priority; 4] = [Self::Urgent, Self::High, Self::Normal, Self::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Self::Low),
            "NORMAL" => Ok(Self::Normal),
            "HIGH" => Ok(Self::High),
            "URGENT" => Ok(Self::Urgent),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// A persisted todo row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: TodoId,
    pub user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub color: String,
    pub position: i64,
    pub parent_id: Option<TodoId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    pub fn is_subtask(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// A top-level todo together with its subtasks, in display order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TodoWithSubtasks {
    #[serde(flatten)]
    pub todo: Todo,
    pub subtasks: Vec<Todo>,
}

impl TodoWithSubtasks {
    pub fn leaf(todo: Todo) -> Self {
        Self {
            todo,
            subtasks: Vec::new(),
        }
    }
}

/// Fields accepted when creating a todo.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTodo {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub parent_id: Option<TodoId>,
}

/// Partial update. `Option<Option<T>>` fields distinguish "absent"
/// (`None`) from "clear" (`Some(None)`).
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub parent_id: Option<Option<TodoId>>,
}

impl TodoPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Present-but-null deserializes to `Some(None)`; absence is handled by `#[serde(default)]`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// What happens to a todo's subtasks when it is deleted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletePolicy {
    /// Subtasks become top-level todos, appended after the existing ones.
    #[default]
    Detach,
    /// Subtasks are deleted with their parent.
    Cascade,
}

impl std::str::FromStr for DeletePolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "detach" => Ok(Self::Detach),
            "cascade" => Ok(Self::Cascade),
            other => Err(format!("unknown delete policy: {other}")),
        }
    }
}

/// One entry of a batched reorder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: TodoId,
    pub position: i64,
}

/// Trim a title and reject it if nothing is left.
pub fn normalize_title(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// `#rgb`, `#rrggbb` or `#rrggbbaa`.
pub fn is_color_tag(s: &str) -> bool {
    let Some(hex) = s.strip_prefix('#') else {
        return false;
    };
    matches!(hex.len(), 3 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit())
}
