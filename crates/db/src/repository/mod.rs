//! Repository functions — one module per database table.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! No business logic, no domain types — pure SQL. Status-transition
//! invariants (P1) are enforced here via conditional `WHERE` clauses, not
//! in the caller, so that concurrent workers can never race a row back out
//! of a terminal state.

pub mod workflows;
pub mod executions;
pub mod node_executions;
pub mod logs;
pub mod pauses;
pub mod usage;
