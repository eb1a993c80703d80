pub mod actions;
pub mod cache;
pub mod compat;
pub mod handlers;
pub mod rpc;
pub mod server;

pub use actions::{ActionConfig, ActionError, Caller, MoveOutcome, TodoActions};
pub use server::{start, ServerConfig, ServerHandle};
