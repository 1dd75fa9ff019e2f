pub mod executions;
pub mod workflows;

pub use crate::AppState;
