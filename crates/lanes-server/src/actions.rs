//! Authenticated todo operations.
//!
//! Each action resolves the caller, validates input, asks the ranking engine
//! for positions where ordering changes, persists through the store in one
//! transaction, and drops the caller's cached view. An anonymous caller gets
//! an empty list or `None`, never an error.

use serde::Serialize;
use tracing::{debug, instrument};

use lanes_core::ranking::{self, MoveRequest, PartitionKey, RankEntry};
use lanes_core::todo::{is_color_tag, normalize_title};
use lanes_core::{
    Board, DeletePolicy, MovePlan, NewTodo, PositionUpdate, Priority, Todo, TodoId, TodoPatch,
    TodoWithSubtasks, UserId, DEFAULT_COLOR,
};
use lanes_store::{Database, StoreError, TodoRepo};

use crate::cache::ViewCache;

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// Rejected before anything was written.
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ActionResult<T> = Result<T, ActionError>;

fn invalid<T>(msg: impl Into<String>) -> ActionResult<T> {
    Err(ActionError::Validation(msg.into()))
}

/// Who is making the request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Caller {
    #[default]
    Anonymous,
    User(UserId),
}

impl Caller {
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Anonymous => None,
            Self::User(id) => Some(id),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ActionConfig {
    pub delete_policy: DeletePolicy,
    pub default_color: String,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            delete_policy: DeletePolicy::Detach,
            default_color: DEFAULT_COLOR.to_string(),
        }
    }
}

/// Result of a server-side drag-end.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MoveOutcome {
    pub todo: Todo,
    /// Every position written, destination lane first.
    pub positions: Vec<PositionUpdate>,
}

pub struct TodoActions {
    todos: TodoRepo,
    cache: ViewCache,
    config: ActionConfig,
}

impl TodoActions {
    pub fn new(db: Database, config: ActionConfig) -> Self {
        Self {
            todos: TodoRepo::new(db),
            cache: ViewCache::new(),
            config,
        }
    }

    pub fn config(&self) -> &ActionConfig {
        &self.config
    }

    /// Top-level todos with their subtasks, in display order.
    #[instrument(skip(self))]
    pub fn list(&self, caller: &Caller) -> ActionResult<Vec<TodoWithSubtasks>> {
        let Some(user_id) = caller.user_id() else {
            return Ok(Vec::new());
        };
        let view = self
            .cache
            .get_or_try_load(user_id, || self.todos.list_top_level(user_id))?;
        Ok(view.as_ref().clone())
    }

    /// The list grouped into the four priority lanes.
    #[instrument(skip(self))]
    pub fn board(&self, caller: &Caller) -> ActionResult<Board> {
        Ok(Board::from_todos(self.list(caller)?))
    }

    #[instrument(skip(self, input))]
    pub fn create(
        &self,
        caller: &Caller,
        mut input: NewTodo,
    ) -> ActionResult<Option<TodoWithSubtasks>> {
        let Some(user_id) = caller.user_id() else {
            return Ok(None);
        };

        let Some(title) = normalize_title(&input.title) else {
            return invalid("title must not be empty");
        };
        input.title = title;
        if let Some(color) = &input.color {
            check_color(color)?;
        }
        if let Some(parent_id) = &input.parent_id {
            match self.todos.get(user_id, parent_id)? {
                None => return Ok(None),
                Some(parent) if parent.is_subtask() => {
                    return invalid("subtasks cannot have subtasks");
                }
                Some(_) => {}
            }
        }

        let created = self
            .todos
            .create(user_id, &input, &self.config.default_color)?;
        if created.is_some() {
            self.cache.invalidate(user_id);
        }
        Ok(created.map(TodoWithSubtasks::leaf))
    }

    #[instrument(skip(self, patch))]
    pub fn update(
        &self,
        caller: &Caller,
        id: &TodoId,
        mut patch: TodoPatch,
    ) -> ActionResult<Option<Todo>> {
        let Some(user_id) = caller.user_id() else {
            return Ok(None);
        };

        if let Some(title) = &patch.title {
            match normalize_title(title) {
                Some(title) => patch.title = Some(title),
                None => return invalid("title must not be empty"),
            }
        }
        if let Some(color) = &patch.color {
            check_color(color)?;
        }
        if let Some(position) = patch.position {
            check_position(position)?;
        }
        if let Some(Some(parent_id)) = &patch.parent_id {
            if parent_id == id {
                return invalid("a todo cannot be its own parent");
            }
            match self.todos.get(user_id, parent_id)? {
                None => return Ok(None),
                Some(parent) if parent.is_subtask() => {
                    return invalid("subtasks cannot have subtasks");
                }
                Some(_) => {}
            }
            if self.todos.has_subtasks(user_id, id)? {
                return invalid("a todo with subtasks cannot become a subtask");
            }
        }

        let updated = self.todos.update(user_id, id, &patch)?;
        if updated.is_some() {
            self.cache.invalidate(user_id);
        }
        Ok(updated)
    }

    /// Returns whether a row was removed.
    #[instrument(skip(self))]
    pub fn delete(&self, caller: &Caller, id: &TodoId) -> ActionResult<bool> {
        let Some(user_id) = caller.user_id() else {
            return Ok(false);
        };
        let deleted = self.todos.delete(user_id, id, self.config.delete_policy)?;
        if deleted {
            self.cache.invalidate(user_id);
        }
        Ok(deleted)
    }

    /// Persist a batch of positions. `false` means nothing was written.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub fn reorder(&self, caller: &Caller, items: &[PositionUpdate]) -> ActionResult<bool> {
        let Some(user_id) = caller.user_id() else {
            return Ok(false);
        };
        for item in items {
            check_position(item.position)?;
        }
        let applied = self.todos.reorder(user_id, items)?;
        if applied {
            self.cache.invalidate(user_id);
        }
        Ok(applied)
    }

    /// Drop `id` at `index` of the `priority` lane among its siblings.
    #[instrument(skip(self))]
    pub fn move_todo(
        &self,
        caller: &Caller,
        id: &TodoId,
        priority: Priority,
        index: i64,
    ) -> ActionResult<Option<MoveOutcome>> {
        let Some(user_id) = caller.user_id() else {
            return Ok(None);
        };

        let moved = self
            .todos
            .move_todo(user_id, id, |todo, siblings| plan(todo, siblings, priority, index))?;
        let Some((todo, move_plan)) = moved else {
            return Ok(None);
        };
        self.cache.invalidate(user_id);
        Ok(Some(MoveOutcome {
            todo,
            positions: move_plan.into_updates(),
        }))
    }
}

fn plan(moved: &Todo, siblings: &[Todo], priority: Priority, index: i64) -> Option<MovePlan> {
    let entries: Vec<RankEntry> = siblings.iter().map(RankEntry::from).collect();
    let source = PartitionKey::of(moved);
    let request = MoveRequest {
        moved_id: moved.id.clone(),
        destination: source.with_priority(priority),
        source,
        dest_index: index,
    };
    match ranking::plan_move(&entries, &request) {
        Ok(plan) => Some(plan),
        Err(e) => {
            debug!(error = %e, "move planning declined");
            None
        }
    }
}

fn check_color(color: &str) -> ActionResult<()> {
    if is_color_tag(color) {
        Ok(())
    } else {
        invalid(format!("color must be a #hex tag, got {color}"))
    }
}

fn check_position(position: i64) -> ActionResult<()> {
    if position < 0 {
        return invalid(format!("position must not be negative, got {position}"));
    }
    Ok(())
}
