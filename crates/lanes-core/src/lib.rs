//! Domain types for the lanes to-do service: ids, the `Todo` entity, the
//! position ranking engine and the board view model.

pub mod board;
pub mod ids;
pub mod ranking;
pub mod todo;

pub use board::{Board, DragEnd, Lane};
pub use ids::{RequestId, TodoId, UserId};
pub use ranking::{MovePlan, MoveRequest, PartitionKey, RankEntry, RankError};
pub use todo::{
    DeletePolicy, NewTodo, PositionUpdate, Priority, Todo, TodoPatch, TodoWithSubtasks,
    DEFAULT_COLOR,
};
