//! The `todos` table.
//!
//! Every statement is scoped by `user_id`: a row owned by someone else is
//! indistinguishable from a missing one. Multi-row writes run in a single
//! transaction and either all land or none do.

use std::collections::HashMap;

use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, instrument, warn};

use lanes_core::ranking::append_position;
use lanes_core::{
    DeletePolicy, MovePlan, NewTodo, PositionUpdate, Priority, Todo, TodoId, TodoPatch,
    TodoWithSubtasks, UserId,
};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const TODO_COLUMNS: &str = "id, user_id, title, description, completed, priority, due_date, \
                            color, position, parent_id, created_at, updated_at";

/// Matches `lanes_core::ranking::display_order`.
const DISPLAY_ORDER: &str = "ORDER BY position ASC, created_at DESC, id ASC";

pub struct TodoRepo {
    db: Database,
}

impl TodoRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a todo at the end of its `(user, parent)` group.
    ///
    /// The caller has already validated `input`; `title` is stored as given.
    /// A `parent_id` that the user does not own yields `None`.
    #[instrument(skip(self, input), fields(user_id = %user_id, parent_id = ?input.parent_id))]
    pub fn create(
        &self,
        user_id: &UserId,
        input: &NewTodo,
        default_color: &str,
    ) -> Result<Option<Todo>, StoreError> {
        self.db.transaction(|conn| {
            if let Some(parent_id) = &input.parent_id {
                if fetch_one(conn, user_id, parent_id)?.is_none() {
                    debug!(%parent_id, "parent not found for user");
                    return Ok(None);
                }
            }

            let now = row_helpers::now();
            let todo = Todo {
                id: TodoId::new(),
                user_id: user_id.clone(),
                title: input.title.clone(),
                description: input.description.clone(),
                completed: input.completed.unwrap_or(false),
                priority: input.priority.unwrap_or_default(),
                due_date: input.due_date,
                color: input.color.clone().unwrap_or_else(|| default_color.to_string()),
                position: next_position(conn, user_id, input.parent_id.as_ref(), None)?,
                parent_id: input.parent_id.clone(),
                created_at: now,
                updated_at: now,
            };

            conn.execute(
                &format!(
                    "INSERT INTO todos ({TODO_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                rusqlite::params![
                    todo.id.as_str(),
                    todo.user_id.as_str(),
                    todo.title,
                    todo.description,
                    todo.completed,
                    todo.priority.as_str(),
                    todo.due_date.map(|d| d.to_string()),
                    todo.color,
                    todo.position,
                    todo.parent_id.as_ref().map(TodoId::as_str),
                    row_helpers::format_timestamp(todo.created_at),
                    row_helpers::format_timestamp(todo.updated_at),
                ],
            )?;
            Ok(Some(todo))
        })
    }

    #[instrument(skip(self), fields(user_id = %user_id, todo_id = %id))]
    pub fn get(&self, user_id: &UserId, id: &TodoId) -> Result<Option<Todo>, StoreError> {
        self.db.with_conn(|conn| fetch_one(conn, user_id, id))
    }

    /// Every todo of the user, subtasks included, in display order.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn list_all(&self, user_id: &UserId) -> Result<Vec<Todo>, StoreError> {
        self.db
            .with_conn(|conn| select(conn, "user_id = ?1", &[&user_id.as_str()]))
    }

    /// Top-level todos in display order, each carrying its subtasks in
    /// display order.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn list_top_level(&self, user_id: &UserId) -> Result<Vec<TodoWithSubtasks>, StoreError> {
        let rows = self.list_all(user_id)?;
        let (top, subs): (Vec<Todo>, Vec<Todo>) = rows.into_iter().partition(|t| !t.is_subtask());

        let mut out: Vec<TodoWithSubtasks> = top.into_iter().map(TodoWithSubtasks::leaf).collect();
        let index: HashMap<TodoId, usize> = out
            .iter()
            .enumerate()
            .map(|(i, t)| (t.todo.id.clone(), i))
            .collect();
        for sub in subs {
            let parent = sub.parent_id.as_ref().and_then(|p| index.get(p).copied());
            match parent {
                Some(i) => out[i].subtasks.push(sub),
                None => warn!(todo_id = %sub.id, "subtask without a top-level parent"),
            }
        }
        Ok(out)
    }

    /// Todos sharing `(user, parent)` across all priorities: the working set
    /// for a move.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn siblings(
        &self,
        user_id: &UserId,
        parent_id: Option<&TodoId>,
    ) -> Result<Vec<Todo>, StoreError> {
        self.db.with_conn(|conn| select_siblings(conn, user_id, parent_id))
    }

    #[instrument(skip(self), fields(user_id = %user_id, todo_id = %id))]
    pub fn has_subtasks(&self, user_id: &UserId, id: &TodoId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM todos WHERE user_id = ?1 AND parent_id = ?2",
                [user_id.as_str(), id.as_str()],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }

    /// Apply a partial update. `None` when the todo is not the user's.
    ///
    /// A patch that actually changes the parent or the lane, without an
    /// explicit `position`, appends the todo to its new group. Any other patch
    /// leaves `position` alone.
    #[instrument(skip(self, patch), fields(user_id = %user_id, todo_id = %id))]
    pub fn update(
        &self,
        user_id: &UserId,
        id: &TodoId,
        patch: &TodoPatch,
    ) -> Result<Option<Todo>, StoreError> {
        if patch.is_empty() {
            return self.get(user_id, id);
        }

        self.db.transaction(|conn| {
            let Some(current) = fetch_one(conn, user_id, id)? else {
                debug!("todo not found for user");
                return Ok(None);
            };
            let parent_id = patch
                .parent_id
                .clone()
                .unwrap_or_else(|| current.parent_id.clone());
            let regrouped = parent_id != current.parent_id
                || patch.priority.is_some_and(|p| p != current.priority);

            let mut sets: Vec<&'static str> = Vec::new();
            let mut values: Vec<Box<dyn ToSql>> = Vec::new();
            let mut set = |column: &'static str, value: Box<dyn ToSql>| {
                sets.push(column);
                values.push(value);
            };

            if let Some(title) = &patch.title {
                set("title", Box::new(title.clone()));
            }
            if let Some(description) = &patch.description {
                set("description", Box::new(description.clone()));
            }
            if let Some(completed) = patch.completed {
                set("completed", Box::new(completed));
            }
            if let Some(priority) = patch.priority {
                set("priority", Box::new(priority.as_str()));
            }
            if let Some(due_date) = patch.due_date {
                set("due_date", Box::new(due_date.map(|d| d.to_string())));
            }
            if let Some(color) = &patch.color {
                set("color", Box::new(color.clone()));
            }
            if parent_id != current.parent_id {
                set("parent_id", Box::new(parent_id.as_ref().map(|p| p.to_string())));
            }
            match patch.position {
                Some(position) => set("position", Box::new(position)),
                None if regrouped => {
                    let position = next_position(conn, user_id, parent_id.as_ref(), Some(id))?;
                    set("position", Box::new(position));
                }
                None => {}
            }
            set("updated_at", Box::new(row_helpers::format_timestamp(row_helpers::now())));

            let assignments: Vec<String> = sets
                .iter()
                .enumerate()
                .map(|(i, column)| format!("{column} = ?{}", i + 1))
                .collect();
            let n = values.len();
            let sql = format!(
                "UPDATE todos SET {} WHERE id = ?{} AND user_id = ?{}",
                assignments.join(", "),
                n + 1,
                n + 2
            );
            values.push(Box::new(id.to_string()));
            values.push(Box::new(user_id.to_string()));

            let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
            let changed = conn.execute(&sql, refs.as_slice())?;
            if changed == 0 {
                debug!("todo not found for user");
                return Ok(None);
            }
            fetch_one(conn, user_id, id)
        })
    }

    /// Delete one todo. Returns `false` when it is not the user's.
    #[instrument(skip(self), fields(user_id = %user_id, todo_id = %id))]
    pub fn delete(
        &self,
        user_id: &UserId,
        id: &TodoId,
        policy: DeletePolicy,
    ) -> Result<bool, StoreError> {
        self.db.transaction(|conn| {
            if fetch_one(conn, user_id, id)?.is_none() {
                return Ok(false);
            }

            match policy {
                DeletePolicy::Cascade => {
                    let removed = conn.execute(
                        "DELETE FROM todos WHERE user_id = ?1 AND parent_id = ?2",
                        [user_id.as_str(), id.as_str()],
                    )?;
                    debug!(removed, "subtasks deleted with parent");
                }
                DeletePolicy::Detach => {
                    let children = select(
                        conn,
                        "user_id = ?1 AND parent_id = ?2",
                        &[&user_id.as_str(), &id.as_str()],
                    )?;
                    let base = next_position(conn, user_id, None, Some(id))?;
                    let now = row_helpers::format_timestamp(row_helpers::now());
                    for (child, position) in children.iter().zip(base..) {
                        conn.execute(
                            "UPDATE todos SET parent_id = NULL, position = ?1, updated_at = ?2
                             WHERE id = ?3 AND user_id = ?4",
                            rusqlite::params![position, now, child.id.as_str(), user_id.as_str()],
                        )?;
                    }
                    if !children.is_empty() {
                        debug!(detached = children.len(), "subtasks promoted to top level");
                    }
                }
            }

            conn.execute(
                "DELETE FROM todos WHERE id = ?1 AND user_id = ?2",
                [id.as_str(), user_id.as_str()],
            )?;
            Ok(true)
        })
    }

    /// Write a batch of positions atomically. If any id is not the user's,
    /// nothing is written and `false` is returned.
    #[instrument(skip(self, items), fields(user_id = %user_id, count = items.len()))]
    pub fn reorder(&self, user_id: &UserId, items: &[PositionUpdate]) -> Result<bool, StoreError> {
        all_or_nothing(self.db.transaction(|conn| {
            write_positions(conn, user_id, items, &row_helpers::format_timestamp(row_helpers::now()))
        }))
    }

    /// Load the moved todo and its siblings, let `plan` decide the new
    /// arrangement, and persist it in one transaction.
    ///
    /// `None` when the todo is not the user's or `plan` declines.
    #[instrument(skip(self, plan), fields(user_id = %user_id, todo_id = %id))]
    pub fn move_todo<F>(
        &self,
        user_id: &UserId,
        id: &TodoId,
        plan: F,
    ) -> Result<Option<(Todo, MovePlan)>, StoreError>
    where
        F: FnOnce(&Todo, &[Todo]) -> Option<MovePlan>,
    {
        self.db.transaction(|conn| {
            let Some(moved) = fetch_one(conn, user_id, id)? else {
                return Ok(None);
            };
            let siblings = select_siblings(conn, user_id, moved.parent_id.as_ref())?;
            let Some(move_plan) = plan(&moved, &siblings) else {
                return Ok(None);
            };

            let now = row_helpers::format_timestamp(row_helpers::now());
            if let Some(priority) = move_plan.new_priority {
                set_priority(conn, user_id, id, priority, &now)?;
            }
            write_positions(conn, user_id, &move_plan.destination, &now)?;
            write_positions(conn, user_id, &move_plan.source, &now)?;

            let todo = fetch_one(conn, user_id, id)?
                .ok_or_else(|| StoreError::NotFound(format!("todo {id}")))?;
            Ok(Some((todo, move_plan)))
        })
    }
}

/// `NotFound` raised inside a batch means "roll back and report not applied".
fn all_or_nothing(result: Result<(), StoreError>) -> Result<bool, StoreError> {
    match result {
        Ok(()) => Ok(true),
        Err(StoreError::NotFound(what)) => {
            warn!(%what, "batch rejected, nothing written");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn write_positions(
    conn: &Connection,
    user_id: &UserId,
    items: &[PositionUpdate],
    now: &str,
) -> Result<(), StoreError> {
    let mut stmt = conn.prepare_cached(
        "UPDATE todos SET position = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
    )?;
    for item in items {
        let changed = stmt.execute(rusqlite::params![
            item.position,
            now,
            item.id.as_str(),
            user_id.as_str()
        ])?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("todo {}", item.id)));
        }
    }
    Ok(())
}

fn set_priority(
    conn: &Connection,
    user_id: &UserId,
    id: &TodoId,
    priority: Priority,
    now: &str,
) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE todos SET priority = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
        rusqlite::params![priority.as_str(), now, id.as_str(), user_id.as_str()],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!("todo {id}")));
    }
    Ok(())
}

/// Append position within `(user, parent)`, ignoring `exclude`.
fn next_position(
    conn: &Connection,
    user_id: &UserId,
    parent_id: Option<&TodoId>,
    exclude: Option<&TodoId>,
) -> Result<i64, StoreError> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(position) FROM todos
         WHERE user_id = ?1 AND parent_id IS ?2 AND id IS NOT ?3",
        rusqlite::params![
            user_id.as_str(),
            parent_id.map(TodoId::as_str),
            exclude.map(TodoId::as_str)
        ],
        |row| row.get(0),
    )?;
    Ok(append_position(max))
}

fn fetch_one(conn: &Connection, user_id: &UserId, id: &TodoId) -> Result<Option<Todo>, StoreError> {
    conn.query_row(
        &format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1 AND user_id = ?2"),
        [id.as_str(), user_id.as_str()],
        |row| Ok(row_to_todo(row)),
    )
    .optional()?
    .transpose()
}

fn select_siblings(
    conn: &Connection,
    user_id: &UserId,
    parent_id: Option<&TodoId>,
) -> Result<Vec<Todo>, StoreError> {
    select(
        conn,
        "user_id = ?1 AND parent_id IS ?2",
        &[&user_id.as_str(), &parent_id.map(TodoId::as_str)],
    )
}

fn select(conn: &Connection, filter: &str, params: &[&dyn ToSql]) -> Result<Vec<Todo>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TODO_COLUMNS} FROM todos WHERE {filter} {DISPLAY_ORDER}"
    ))?;
    let rows = stmt.query_map(params, |row| Ok(row_to_todo(row)))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row??);
    }
    Ok(out)
}

fn row_to_todo(row: &rusqlite::Row<'_>) -> Result<Todo, StoreError> {
    const T: &str = "todos";
    let priority: String = row_helpers::get(row, 5, T, "priority")?;
    let due_date: Option<String> = row_helpers::get_opt(row, 6, T, "due_date")?;
    let created_at: String = row_helpers::get(row, 10, T, "created_at")?;
    let updated_at: String = row_helpers::get(row, 11, T, "updated_at")?;

    Ok(Todo {
        id: TodoId::from_raw(row_helpers::get::<String>(row, 0, T, "id")?),
        user_id: UserId::from_raw(row_helpers::get::<String>(row, 1, T, "user_id")?),
        title: row_helpers::get(row, 2, T, "title")?,
        description: row_helpers::get_opt(row, 3, T, "description")?,
        completed: row_helpers::get(row, 4, T, "completed")?,
        priority: row_helpers::parse_enum(&priority, T, "priority")?,
        due_date: due_date
            .map(|raw| row_helpers::parse_date(&raw, T, "due_date"))
            .transpose()?,
        color: row_helpers::get(row, 7, T, "color")?,
        position: row_helpers::get(row, 8, T, "position")?,
        parent_id: row_helpers::get_opt::<String>(row, 9, T, "parent_id")?.map(TodoId::from_raw),
        created_at: row_helpers::parse_timestamp(&created_at, T, "created_at")?,
        updated_at: row_helpers::parse_timestamp(&updated_at, T, "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use lanes_core::ranking::{plan_move, MoveRequest, PartitionKey, RankEntry};
    use lanes_core::DEFAULT_COLOR;

    use crate::users::UserRepo;

    struct Fixture {
        repo: TodoRepo,
        alice: UserId,
        bob: UserId,
    }

    fn setup() -> Fixture {
        let db = Database::in_memory().unwrap();
        let users = UserRepo::new(db.clone());
        let alice = users.get_or_create("github", "1", "Alice", None).unwrap().id;
        let bob = users.get_or_create("github", "2", "Bob", None).unwrap().id;
        Fixture {
            repo: TodoRepo::new(db),
            alice,
            bob,
        }
    }

    fn new(title: &str) -> NewTodo {
        NewTodo {
            title: title.into(),
            ..Default::default()
        }
    }

    fn with_priority(title: &str, priority: Priority) -> NewTodo {
        NewTodo {
            priority: Some(priority),
            ..new(title)
        }
    }

    fn subtask(title: &str, parent: &TodoId) -> NewTodo {
        NewTodo {
            parent_id: Some(parent.clone()),
            ..new(title)
        }
    }

    impl Fixture {
        fn create(&self, input: NewTodo) -> Todo {
            self.repo
                .create(&self.alice, &input, DEFAULT_COLOR)
                .unwrap()
                .unwrap()
        }

        fn titles(&self) -> Vec<(String, i64)> {
            self.repo
                .list_top_level(&self.alice)
                .unwrap()
                .into_iter()
                .map(|t| (t.todo.title, t.todo.position))
                .collect()
        }
    }

    fn planner(
        priority: Priority,
        index: i64,
    ) -> impl FnOnce(&Todo, &[Todo]) -> Option<MovePlan> {
        move |moved: &Todo, siblings: &[Todo]| {
            let entries: Vec<RankEntry> = siblings.iter().map(RankEntry::from).collect();
            let source = PartitionKey::of(moved);
            let request = MoveRequest {
                moved_id: moved.id.clone(),
                destination: source.with_priority(priority),
                source,
                dest_index: index,
            };
            plan_move(&entries, &request).ok()
        }
    }

    #[test]
    fn create_in_empty_partition_is_zero() {
        let f = setup();
        let todo = f.create(new("first"));
        assert_eq!(todo.position, 0);
        assert_eq!(todo.priority, Priority::Normal);
        assert_eq!(todo.color, DEFAULT_COLOR);
        assert!(!todo.completed);
        assert!(todo.id.as_str().starts_with("todo_"));
    }

    #[test]
    fn create_appends_after_max() {
        let f = setup();
        f.create(new("a"));
        f.create(with_priority("b", Priority::Urgent));
        let c = f.create(new("c"));
        assert_eq!(c.position, 2);
    }

    #[test]
    fn subtasks_number_within_their_parent() {
        let f = setup();
        let parent = f.create(new("parent"));
        f.create(new("sibling"));
        let s0 = f.create(subtask("s0", &parent.id));
        let s1 = f.create(subtask("s1", &parent.id));
        assert_eq!((s0.position, s1.position), (0, 1));
        assert_eq!(s0.parent_id.as_ref(), Some(&parent.id));
    }

    #[test]
    fn create_under_foreign_parent_is_none() {
        let f = setup();
        let parent = f.create(new("alice's"));
        let result = f
            .repo
            .create(&f.bob, &subtask("sneaky", &parent.id), DEFAULT_COLOR)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn create_keeps_optional_fields() {
        let f = setup();
        let due = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let todo = f.create(NewTodo {
            description: Some("two litres".into()),
            due_date: Some(due),
            color: Some("#3b82f6".into()),
            completed: Some(true),
            ..new("milk")
        });
        let stored = f.repo.get(&f.alice, &todo.id).unwrap().unwrap();
        assert_eq!(stored, todo);
        assert_eq!(stored.due_date, Some(due));
    }

    #[test]
    fn list_nests_subtasks_and_orders_by_position() {
        let f = setup();
        let a = f.create(new("a"));
        let b = f.create(new("b"));
        f.create(subtask("b1", &b.id));
        f.create(subtask("b2", &b.id));
        f.repo
            .reorder(
                &f.alice,
                &[
                    PositionUpdate { id: b.id.clone(), position: 0 },
                    PositionUpdate { id: a.id.clone(), position: 1 },
                ],
            )
            .unwrap();

        let list = f.repo.list_top_level(&f.alice).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].todo.title, "b");
        let subs: Vec<&str> = list[0].subtasks.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(subs, vec!["b1", "b2"]);
        assert!(list[1].subtasks.is_empty());
    }

    #[test]
    fn position_ties_read_newest_first() {
        let f = setup();
        let old = f.create(new("old"));
        std::thread::sleep(std::time::Duration::from_millis(2));
        let newer = f.create(new("newer"));
        f.repo
            .reorder(&f.alice, &[PositionUpdate { id: newer.id.clone(), position: old.position }])
            .unwrap();
        assert_eq!(f.titles(), vec![("newer".to_string(), 0), ("old".to_string(), 0)]);
    }

    #[test]
    fn other_users_rows_are_invisible() {
        let f = setup();
        let todo = f.create(new("private"));
        assert!(f.repo.get(&f.bob, &todo.id).unwrap().is_none());
        assert!(f.repo.list_top_level(&f.bob).unwrap().is_empty());
        let patch = TodoPatch {
            title: Some("hijacked".into()),
            ..Default::default()
        };
        assert!(f.repo.update(&f.bob, &todo.id, &patch).unwrap().is_none());
        assert!(!f.repo.delete(&f.bob, &todo.id, DeletePolicy::Cascade).unwrap());
        assert_eq!(f.repo.get(&f.alice, &todo.id).unwrap().unwrap().title, "private");
    }

    #[test]
    fn update_patches_only_given_fields() {
        let f = setup();
        let todo = f.create(NewTodo {
            description: Some("keep me".into()),
            due_date: NaiveDate::from_ymd_opt(2026, 1, 2),
            ..new("before")
        });
        let patch: TodoPatch =
            serde_json::from_str(r#"{"title": "after", "dueDate": null, "completed": true}"#).unwrap();
        let updated = f.repo.update(&f.alice, &todo.id, &patch).unwrap().unwrap();
        assert_eq!(updated.title, "after");
        assert!(updated.completed);
        assert_eq!(updated.due_date, None);
        assert_eq!(updated.description.as_deref(), Some("keep me"));
        assert_eq!(updated.priority, todo.priority);
        assert!(updated.updated_at >= todo.updated_at);
    }

    #[test]
    fn empty_patch_returns_current_row() {
        let f = setup();
        let todo = f.create(new("same"));
        let got = f.repo.update(&f.alice, &todo.id, &TodoPatch::default()).unwrap();
        assert_eq!(got, Some(todo));
    }

    #[test]
    fn reparenting_appends_to_new_group() {
        let f = setup();
        let parent = f.create(new("parent"));
        f.create(subtask("existing", &parent.id));
        let loose = f.create(new("loose"));
        let patch = TodoPatch {
            parent_id: Some(Some(parent.id.clone())),
            ..Default::default()
        };
        let moved = f.repo.update(&f.alice, &loose.id, &patch).unwrap().unwrap();
        assert_eq!(moved.parent_id.as_ref(), Some(&parent.id));
        assert_eq!(moved.position, 1);
    }

    #[test]
    fn restating_the_parent_keeps_position() {
        let f = setup();
        let a = f.create(new("A"));
        f.create(new("B"));
        f.create(new("C"));
        let patch: TodoPatch =
            serde_json::from_str(r#"{"title": "A2", "parentId": null}"#).unwrap();
        let updated = f.repo.update(&f.alice, &a.id, &patch).unwrap().unwrap();
        assert_eq!(updated.title, "A2");
        assert_eq!(updated.position, 0);
        assert_eq!(
            f.titles(),
            vec![("A2".to_string(), 0), ("B".to_string(), 1), ("C".to_string(), 2)]
        );
    }

    #[test]
    fn restating_the_priority_keeps_position() {
        let f = setup();
        let a = f.create(with_priority("A", Priority::High));
        f.create(with_priority("B", Priority::High));
        let patch = TodoPatch {
            priority: Some(Priority::High),
            completed: Some(true),
            ..Default::default()
        };
        let updated = f.repo.update(&f.alice, &a.id, &patch).unwrap().unwrap();
        assert_eq!(updated.position, 0);
    }

    #[test]
    fn lane_change_appends_to_the_new_lane() {
        let f = setup();
        let a = f.create(new("A"));
        f.create(with_priority("X", Priority::High));
        f.create(with_priority("Y", Priority::High));
        let patch = TodoPatch {
            priority: Some(Priority::High),
            ..Default::default()
        };
        let updated = f.repo.update(&f.alice, &a.id, &patch).unwrap().unwrap();
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.position, 3);
        let high: Vec<String> = f
            .repo
            .list_top_level(&f.alice)
            .unwrap()
            .into_iter()
            .filter(|t| t.todo.priority == Priority::High)
            .map(|t| t.todo.title)
            .collect();
        assert_eq!(high, vec!["X", "Y", "A"]);
    }

    #[test]
    fn explicit_position_wins_over_append() {
        let f = setup();
        let a = f.create(new("A"));
        f.create(with_priority("X", Priority::High));
        let patch = TodoPatch {
            priority: Some(Priority::High),
            position: Some(0),
            ..Default::default()
        };
        let updated = f.repo.update(&f.alice, &a.id, &patch).unwrap().unwrap();
        assert_eq!(updated.position, 0);
    }

    #[test]
    fn update_of_foreign_todo_is_none() {
        let f = setup();
        let todo = f.create(new("mine"));
        let patch = TodoPatch {
            title: Some("stolen".into()),
            ..Default::default()
        };
        assert!(f.repo.update(&f.bob, &todo.id, &patch).unwrap().is_none());
    }

    #[test]
    fn delete_detach_promotes_subtasks() {
        let f = setup();
        let parent = f.create(new("parent"));
        f.create(new("other"));
        f.create(subtask("s0", &parent.id));
        f.create(subtask("s1", &parent.id));

        assert!(f.repo.delete(&f.alice, &parent.id, DeletePolicy::Detach).unwrap());
        assert_eq!(
            f.titles(),
            vec![
                ("other".to_string(), 1),
                ("s0".to_string(), 2),
                ("s1".to_string(), 3)
            ]
        );
    }

    #[test]
    fn delete_cascade_removes_subtasks() {
        let f = setup();
        let parent = f.create(new("parent"));
        let child = f.create(subtask("child", &parent.id));
        assert!(f.repo.delete(&f.alice, &parent.id, DeletePolicy::Cascade).unwrap());
        assert!(f.repo.get(&f.alice, &child.id).unwrap().is_none());
        assert!(f.repo.list_all(&f.alice).unwrap().is_empty());
    }

    #[test]
    fn delete_subtask_leaves_parent() {
        let f = setup();
        let parent = f.create(new("parent"));
        let child = f.create(subtask("child", &parent.id));
        assert!(f.repo.delete(&f.alice, &child.id, DeletePolicy::Detach).unwrap());
        assert!(!f.repo.has_subtasks(&f.alice, &parent.id).unwrap());
    }

    #[test]
    fn reorder_is_all_or_nothing() {
        let f = setup();
        let a = f.create(new("a"));
        let b = f.create(new("b"));
        let foreign = f
            .repo
            .create(&f.bob, &new("bob's"), DEFAULT_COLOR)
            .unwrap()
            .unwrap();

        let applied = f
            .repo
            .reorder(
                &f.alice,
                &[
                    PositionUpdate { id: b.id.clone(), position: 0 },
                    PositionUpdate { id: foreign.id.clone(), position: 1 },
                    PositionUpdate { id: a.id.clone(), position: 2 },
                ],
            )
            .unwrap();
        assert!(!applied);
        assert_eq!(f.titles(), vec![("a".to_string(), 0), ("b".to_string(), 1)]);
        assert_eq!(f.repo.get(&f.bob, &foreign.id).unwrap().unwrap().position, 0);
    }

    #[test]
    fn empty_reorder_is_applied() {
        let f = setup();
        assert!(f.repo.reorder(&f.alice, &[]).unwrap());
    }

    #[test]
    fn move_within_lane() {
        let f = setup();
        f.create(new("A"));
        let b = f.create(new("B"));
        f.create(new("C"));
        let (moved, plan) = f
            .repo
            .move_todo(&f.alice, &b.id, planner(Priority::Normal, 0))
            .unwrap()
            .unwrap();
        assert_eq!(moved.position, 0);
        assert!(!plan.is_cross_partition());
        assert_eq!(
            f.titles(),
            vec![("B".to_string(), 0), ("A".to_string(), 1), ("C".to_string(), 2)]
        );
    }

    #[test]
    fn move_across_lanes_persists_priority_and_both_lanes() {
        let f = setup();
        let a = f.create(new("A"));
        f.create(new("B"));
        let x = f.create(with_priority("X", Priority::High));
        f.repo
            .reorder(&f.alice, &[PositionUpdate { id: x.id.clone(), position: 0 }])
            .unwrap();

        let (moved, _) = f
            .repo
            .move_todo(&f.alice, &a.id, planner(Priority::High, 1))
            .unwrap()
            .unwrap();
        assert_eq!(moved.priority, Priority::High);

        let lane = |p: Priority| -> Vec<(String, i64)> {
            f.repo
                .list_all(&f.alice)
                .unwrap()
                .into_iter()
                .filter(|t| t.priority == p)
                .map(|t| (t.title, t.position))
                .collect()
        };
        assert_eq!(lane(Priority::High), vec![("X".to_string(), 0), ("A".to_string(), 1)]);
        assert_eq!(lane(Priority::Normal), vec![("B".to_string(), 0)]);
    }

    #[test]
    fn move_of_foreign_todo_is_none() {
        let f = setup();
        let todo = f.create(new("mine"));
        let result = f
            .repo
            .move_todo(&f.bob, &todo.id, planner(Priority::Urgent, 0))
            .unwrap();
        assert!(result.is_none());
        assert_eq!(
            f.repo.get(&f.alice, &todo.id).unwrap().unwrap().priority,
            Priority::Normal
        );
    }

    #[test]
    fn siblings_span_all_priorities_of_one_parent() {
        let f = setup();
        let parent = f.create(new("p"));
        f.create(with_priority("u", Priority::Urgent));
        f.create(subtask("child", &parent.id));
        let top = f.repo.siblings(&f.alice, None).unwrap();
        assert_eq!(top.len(), 2);
        let children = f.repo.siblings(&f.alice, Some(&parent.id)).unwrap();
        assert_eq!(children.len(), 1);
    }
}
