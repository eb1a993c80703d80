pub mod database;
pub mod error;
pub mod row_helpers;
pub mod schema;
pub mod sessions;
pub mod todos;
pub mod users;

pub use database::Database;
pub use error::StoreError;
pub use sessions::{IssuedToken, SessionRepo};
pub use todos::TodoRepo;
pub use users::{UserRepo, UserRow};
