//! Position ranking for todos.
//!
//! Positions are ordinals scoped to a [`PartitionKey`]. Everything in this
//! module is a pure function over explicit inputs: callers load the rows,
//! ask for a plan, and persist the returned [`PositionUpdate`]s themselves.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ids::{TodoId, UserId};
use crate::todo::{PositionUpdate, Priority, Todo};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RankError {
    #[error("todo not found in working set: {0}")]
    NotFound(TodoId),
}

/// The set of todos within which `position` is meaningful.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionKey {
    pub user_id: UserId,
    pub parent_id: Option<TodoId>,
    pub priority: Priority,
}

impl PartitionKey {
    pub fn of(todo: &Todo) -> Self {
        Self {
            user_id: todo.user_id.clone(),
            parent_id: todo.parent_id.clone(),
            priority: todo.priority,
        }
    }

    /// Same owner and parent, different lane.
    pub fn with_priority(&self, priority: Priority) -> Self {
        Self {
            priority,
            ..self.clone()
        }
    }
}

/// The ranking-relevant projection of a todo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankEntry {
    pub id: TodoId,
    pub partition: PartitionKey,
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&Todo> for RankEntry {
    fn from(todo: &Todo) -> Self {
        Self {
            id: todo.id.clone(),
            partition: PartitionKey::of(todo),
            position: todo.position,
            created_at: todo.created_at,
        }
    }
}

/// A drag-and-drop style move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveRequest {
    pub moved_id: TodoId,
    pub source: PartitionKey,
    pub destination: PartitionKey,
    /// Target index in the destination's display order. Clamped to `[0, len]`.
    pub dest_index: i64,
}

/// Result of [`plan_move`]: the assignments a caller must persist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePlan {
    pub moved_id: TodoId,
    /// Set when the move crosses lanes.
    pub new_priority: Option<Priority>,
    /// Dense positions for the whole destination partition.
    pub destination: Vec<PositionUpdate>,
    /// Dense positions for what is left of the source partition. Empty for
    /// moves within one partition.
    pub source: Vec<PositionUpdate>,
}

impl MovePlan {
    pub fn is_cross_partition(&self) -> bool {
        self.new_priority.is_some()
    }

    pub fn position_of(&self, id: &TodoId) -> Option<i64> {
        self.destination
            .iter()
            .chain(self.source.iter())
            .find(|u| &u.id == id)
            .map(|u| u.position)
    }

    /// All assignments, destination first.
    pub fn into_updates(self) -> Vec<PositionUpdate> {
        let mut updates = self.destination;
        updates.extend(self.source);
        updates
    }
}

/// Position for an item appended to a partition holding `positions`.
pub fn append_position<I>(positions: I) -> i64
where
    I: IntoIterator<Item = i64>,
{
    positions.into_iter().max().map_or(0, |max| max + 1)
}

/// Read order: `position` ascending, then newest first. The id breaks any
/// remaining tie so the order is total.
pub fn display_order(a: &RankEntry, b: &RankEntry) -> Ordering {
    a.position
        .cmp(&b.position)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_for_display(entries: &mut [RankEntry]) {
    entries.sort_by(display_order);
}

/// Rewrite one partition as `0..n-1` following its current display order.
pub fn densify(entries: &[RankEntry]) -> Vec<PositionUpdate> {
    let mut ordered = entries.to_vec();
    sort_for_display(&mut ordered);
    enumerate(ordered.iter())
}

/// True when `positions`, taken in order, are exactly `0, 1, .., n-1`.
pub fn is_dense<I>(positions: I) -> bool
where
    I: IntoIterator<Item = i64>,
{
    positions
        .into_iter()
        .enumerate()
        .all(|(i, p)| i64::try_from(i).is_ok_and(|i| i == p))
}

/// Plan a move of `request.moved_id` to `request.dest_index` of the
/// destination partition.
///
/// `items` is the caller's working set; it may span several partitions. Only
/// the destination partition (and, for a lane change, the source partition)
/// appear in the plan. An id missing from `items` yields
/// [`RankError::NotFound`] and no assignments.
pub fn plan_move(items: &[RankEntry], request: &MoveRequest) -> Result<MovePlan, RankError> {
    let mut working = items.to_vec();
    sort_for_display(&mut working);

    let idx = working
        .iter()
        .position(|e| e.id == request.moved_id)
        .ok_or_else(|| RankError::NotFound(request.moved_id.clone()))?;
    let mut moved = working.remove(idx);

    let crosses = request.source != request.destination;
    if crosses {
        moved.partition = request.destination.clone();
    }

    let mut lane: Vec<&RankEntry> = working
        .iter()
        .filter(|e| e.partition == request.destination)
        .collect();
    let at = clamp_index(request.dest_index, lane.len());
    lane.insert(at, &moved);
    let destination = enumerate(lane.into_iter());

    let source = if crosses {
        enumerate(working.iter().filter(|e| e.partition == request.source))
    } else {
        Vec::new()
    };

    let new_priority = (crosses && request.source.priority != request.destination.priority)
        .then_some(request.destination.priority);

    Ok(MovePlan {
        moved_id: request.moved_id.clone(),
        new_priority,
        destination,
        source,
    })
}

fn clamp_index(index: i64, len: usize) -> usize {
    usize::try_from(index.max(0)).map_or(len, |i| i.min(len))
}

fn enumerate<'a, I>(entries: I) -> Vec<PositionUpdate>
where
    I: Iterator<Item = &'a RankEntry>,
{
    entries
        .zip(0_i64..)
        .map(|(e, position)| PositionUpdate {
            id: e.id.clone(),
            position,
        })
        .collect()
}
