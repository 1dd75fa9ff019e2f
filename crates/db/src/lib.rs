//! `db` crate — pure persistence layer.
//!
//! Provides a connection pool, typed row structs, and repository functions
//! for every table owned by the Store component (workflows, executions,
//! node-executions, logs, pauses, usage). No business logic lives here —
//! the `engine` crate is the only caller allowed to interpret what these
//! rows mean.

pub mod error;
pub mod pool;
pub mod repository;
pub mod models;

pub use pool::DbPool;
pub use error::DbError;
