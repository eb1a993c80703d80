//! Owned view model of one user's board.
//!
//! A [`Board`] is built from `todos.list` output and only changes through
//! the `apply_*` methods, which take the values the action layer returned.
//! [`Board::drag_end`] is the one optimistic path: it computes a
//! [`MovePlan`], applies it locally and hands it back for persistence.

use serde::Serialize;

use crate::ids::TodoId;
use crate::ranking::{self, MovePlan, MoveRequest, PartitionKey, RankEntry, RankError};
use crate::todo::{DeletePolicy, Priority, Todo, TodoWithSubtasks};

/// A finished drag gesture, as reported by the drag-and-drop surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DragEnd {
    pub draggable_id: TodoId,
    pub source: Priority,
    /// `None` when the item was dropped outside any lane.
    pub destination: Option<Priority>,
    pub index: i64,
}

/// One priority column.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Lane {
    pub priority: Priority,
    pub todos: Vec<TodoWithSubtasks>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Board {
    lanes: Vec<Lane>,
}

impl Board {
    pub fn from_todos(todos: Vec<TodoWithSubtasks>) -> Self {
        let mut board = Self::empty();
        for mut item in todos {
            sort_todos(&mut item.subtasks);
            board.lane_mut(item.todo.priority).todos.push(item);
        }
        for lane in &mut board.lanes {
            sort_lane(&mut lane.todos);
        }
        board
    }

    pub fn empty() -> Self {
        Self {
            lanes: Priority::LANES
                .iter()
                .map(|&priority| Lane {
                    priority,
                    todos: Vec::new(),
                })
                .collect(),
        }
    }

    pub fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    pub fn lane(&self, priority: Priority) -> &[TodoWithSubtasks] {
        self.lanes
            .iter()
            .find(|l| l.priority == priority)
            .map(|l| l.todos.as_slice())
            .unwrap_or_default()
    }

    /// Number of top-level todos.
    pub fn len(&self) -> usize {
        self.lanes.iter().map(|l| l.todos.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &TodoId) -> Option<&TodoWithSubtasks> {
        self.lanes
            .iter()
            .flat_map(|l| l.todos.iter())
            .find(|t| &t.todo.id == id)
    }

    /// Insert a freshly created todo (top-level or subtask).
    pub fn apply_created(&mut self, created: TodoWithSubtasks) {
        match created.todo.parent_id.clone() {
            Some(parent_id) => {
                if let Some(parent) = self.find_mut(&parent_id) {
                    parent.subtasks.push(created.todo);
                    sort_todos(&mut parent.subtasks);
                }
            }
            None => {
                let lane = self.lane_mut(created.todo.priority);
                lane.todos.push(created);
                sort_lane(&mut lane.todos);
            }
        }
    }

    /// Replace a todo with the server's updated copy, moving it between
    /// lanes or between parents as needed.
    pub fn apply_updated(&mut self, updated: Todo) {
        let subtasks = self.take(&updated.id).map(|t| t.subtasks).unwrap_or_default();
        self.apply_created(TodoWithSubtasks {
            todo: updated,
            subtasks,
        });
    }

    /// Remove a todo and treat its subtasks the way the server did.
    pub fn apply_deleted(&mut self, id: &TodoId, policy: DeletePolicy) {
        let Some(removed) = self.take(id) else {
            return;
        };
        if policy == DeletePolicy::Cascade {
            return;
        }
        for mut sub in removed.subtasks {
            sub.parent_id = None;
            sub.position = ranking::append_position(self.top_level().map(|t| t.position));
            self.apply_created(TodoWithSubtasks::leaf(sub));
        }
    }

    /// Apply a drag gesture optimistically and return the plan to persist.
    ///
    /// A drop outside any lane is not an error: it returns `Ok(None)` and
    /// leaves the board unchanged.
    pub fn drag_end(&mut self, drag: &DragEnd) -> Result<Option<MovePlan>, RankError> {
        let Some(destination) = drag.destination else {
            return Ok(None);
        };
        let moved = self
            .get(&drag.draggable_id)
            .ok_or_else(|| RankError::NotFound(drag.draggable_id.clone()))?;
        let source = PartitionKey::of(&moved.todo).with_priority(drag.source);
        let request = MoveRequest {
            moved_id: drag.draggable_id.clone(),
            destination: source.with_priority(destination),
            source,
            dest_index: drag.index,
        };
        let entries: Vec<RankEntry> = self.top_level().map(RankEntry::from).collect();
        let plan = ranking::plan_move(&entries, &request)?;
        self.apply_plan(&plan);
        Ok(Some(plan))
    }

    /// Write a plan's priority change and positions into the board.
    pub fn apply_plan(&mut self, plan: &MovePlan) {
        if let Some(priority) = plan.new_priority {
            if let Some(mut moved) = self.take(&plan.moved_id) {
                moved.todo.priority = priority;
                self.lane_mut(priority).todos.push(moved);
            }
        }
        for lane in &mut self.lanes {
            for item in &mut lane.todos {
                if let Some(position) = plan.position_of(&item.todo.id) {
                    item.todo.position = position;
                }
            }
            sort_lane(&mut lane.todos);
        }
    }

    fn top_level(&self) -> impl Iterator<Item = &Todo> {
        self.lanes.iter().flat_map(|l| l.todos.iter().map(|t| &t.todo))
    }

    fn lane_mut(&mut self, priority: Priority) -> &mut Lane {
        let idx = Priority::LANES
            .iter()
            .position(|&p| p == priority)
            .unwrap_or_default();
        &mut self.lanes[idx]
    }

    fn find_mut(&mut self, id: &TodoId) -> Option<&mut TodoWithSubtasks> {
        self.lanes
            .iter_mut()
            .flat_map(|l| l.todos.iter_mut())
            .find(|t| &t.todo.id == id)
    }

    /// Remove a top-level todo, or a subtask from its parent.
    fn take(&mut self, id: &TodoId) -> Option<TodoWithSubtasks> {
        for lane in &mut self.lanes {
            if let Some(idx) = lane.todos.iter().position(|t| &t.todo.id == id) {
                return Some(lane.todos.remove(idx));
            }
            for parent in &mut lane.todos {
                if let Some(idx) = parent.subtasks.iter().position(|s| &s.id == id) {
                    return Some(TodoWithSubtasks::leaf(parent.subtasks.remove(idx)));
                }
            }
        }
        None
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::empty()
    }
}

fn sort_lane(todos: &mut [TodoWithSubtasks]) {
    todos.sort_by(|a, b| {
        ranking::display_order(&RankEntry::from(&a.todo), &RankEntry::from(&b.todo))
    });
}

fn sort_todos(todos: &mut [Todo]) {
    todos.sort_by(|a, b| ranking::display_order(&RankEntry::from(a), &RankEntry::from(b)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;
    use crate::todo::DEFAULT_COLOR;
    use chrono::{DateTime, Utc};

    fn todo(id: &str, priority: Priority, position: i64) -> Todo {
        Todo {
            id: TodoId::from_raw(id),
            user_id: UserId::from_raw("user_1"),
            title: id.to_string(),
            description: None,
            completed: false,
            priority,
            due_date: None,
            color: DEFAULT_COLOR.to_string(),
            position,
            parent_id: None,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn subtask(id: &str, parent: &str, position: i64) -> Todo {
        Todo {
            parent_id: Some(TodoId::from_raw(parent)),
            ..todo(id, Priority::Normal, position)
        }
    }

    fn titles(board: &Board, priority: Priority) -> Vec<(String, i64)> {
        board
            .lane(priority)
            .iter()
            .map(|t| (t.todo.title.clone(), t.todo.position))
            .collect()
    }

    fn sample() -> Board {
        Board::from_todos(vec![
            TodoWithSubtasks::leaf(todo("B", Priority::Normal, 1)),
            TodoWithSubtasks::leaf(todo("A", Priority::Normal, 0)),
            TodoWithSubtasks::leaf(todo("X", Priority::High, 0)),
        ])
    }

    #[test]
    fn groups_into_four_lanes_in_order() {
        let board = sample();
        let order: Vec<Priority> = board.lanes().iter().map(|l| l.priority).collect();
        assert_eq!(order, Priority::LANES.to_vec());
        assert_eq!(titles(&board, Priority::Normal), vec![("A".to_string(), 0), ("B".to_string(), 1)]);
        assert_eq!(board.len(), 3);
        assert!(Board::empty().is_empty());
    }

    #[test]
    fn drag_across_lanes_matches_server_plan() {
        let mut board = sample();
        let plan = board
            .drag_end(&DragEnd {
                draggable_id: TodoId::from_raw("A"),
                source: Priority::Normal,
                destination: Some(Priority::High),
                index: 1,
            })
            .unwrap()
            .unwrap();
        assert_eq!(plan.new_priority, Some(Priority::High));
        assert_eq!(titles(&board, Priority::High), vec![("X".to_string(), 0), ("A".to_string(), 1)]);
        assert_eq!(titles(&board, Priority::Normal), vec![("B".to_string(), 0)]);
        assert_eq!(
            board.get(&TodoId::from_raw("A")).unwrap().todo.priority,
            Priority::High
        );
    }

    #[test]
    fn drag_within_lane() {
        let mut board = sample();
        board
            .drag_end(&DragEnd {
                draggable_id: TodoId::from_raw("B"),
                source: Priority::Normal,
                destination: Some(Priority::Normal),
                index: 0,
            })
            .unwrap();
        assert_eq!(titles(&board, Priority::Normal), vec![("B".to_string(), 0), ("A".to_string(), 1)]);
    }

    #[test]
    fn drop_outside_is_ignored() {
        let mut board = sample();
        let before = board.clone();
        let plan = board
            .drag_end(&DragEnd {
                draggable_id: TodoId::from_raw("A"),
                source: Priority::Normal,
                destination: None,
                index: 0,
            })
            .unwrap();
        assert!(plan.is_none());
        assert_eq!(board, before);
    }

    #[test]
    fn drag_unknown_id_fails() {
        let mut board = sample();
        let err = board
            .drag_end(&DragEnd {
                draggable_id: TodoId::from_raw("nope"),
                source: Priority::Low,
                destination: Some(Priority::Low),
                index: 0,
            })
            .unwrap_err();
        assert_eq!(err, RankError::NotFound(TodoId::from_raw("nope")));
    }

    #[test]
    fn created_subtask_lands_under_parent() {
        let mut board = sample();
        board.apply_created(TodoWithSubtasks::leaf(subtask("S", "A", 0)));
        let parent = board.get(&TodoId::from_raw("A")).unwrap();
        assert_eq!(parent.subtasks.len(), 1);
        assert_eq!(board.len(), 3);
    }

    #[test]
    fn update_moves_between_lanes() {
        let mut board = sample();
        let mut changed = todo("B", Priority::Urgent, 0);
        changed.title = "renamed".into();
        board.apply_updated(changed);
        assert!(titles(&board, Priority::Normal).iter().all(|(t, _)| t != "B"));
        assert_eq!(titles(&board, Priority::Urgent), vec![("renamed".to_string(), 0)]);
    }

    #[test]
    fn update_keeps_subtasks() {
        let mut board = sample();
        board.apply_created(TodoWithSubtasks::leaf(subtask("S", "A", 0)));
        let mut changed = todo("A", Priority::Normal, 0);
        changed.completed = true;
        board.apply_updated(changed);
        let parent = board.get(&TodoId::from_raw("A")).unwrap();
        assert!(parent.todo.completed);
        assert_eq!(parent.subtasks.len(), 1);
    }

    #[test]
    fn delete_detaches_subtasks_to_the_end() {
        let mut board = sample();
        board.apply_created(TodoWithSubtasks::leaf(subtask("S", "A", 0)));
        board.apply_deleted(&TodoId::from_raw("A"), DeletePolicy::Detach);
        let s = board.get(&TodoId::from_raw("S")).unwrap();
        assert!(s.todo.parent_id.is_none());
        assert_eq!(s.todo.position, 2);
        assert_eq!(board.len(), 3);
    }

    #[test]
    fn delete_cascade_drops_subtasks() {
        let mut board = sample();
        board.apply_created(TodoWithSubtasks::leaf(subtask("S", "A", 0)));
        board.apply_deleted(&TodoId::from_raw("A"), DeletePolicy::Cascade);
        assert!(board.get(&TodoId::from_raw("S")).is_none());
        assert_eq!(board.len(), 2);
    }

    #[test]
    fn delete_subtask_only_touches_parent() {
        let mut board = sample();
        board.apply_created(TodoWithSubtasks::leaf(subtask("S", "A", 0)));
        board.apply_deleted(&TodoId::from_raw("S"), DeletePolicy::Detach);
        assert!(board.get(&TodoId::from_raw("A")).unwrap().subtasks.is_empty());
        assert_eq!(board.len(), 3);
    }
}
