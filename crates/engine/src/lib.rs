//! `engine` crate — domain models, DAG validation, variable interpolation,
//! the Handler Runtime, the parallel DAG scheduler, the dispatcher, and the
//! Event Hub. This is the heart of the execution system.

pub mod collaborators;
pub mod config;
pub mod dag;
pub mod dispatcher;
pub mod error;
pub mod event_hub;
pub mod executor;
pub mod handler_runtime;
pub mod interpolate;
pub mod models;

pub use config::EngineConfig;
pub use dag::validate_dag;
pub use dispatcher::{apply_route_decision, route_after_nack, Dispatcher, RouteDecision, StartOutcome};
pub use error::EngineError;
pub use event_hub::EventHub;
pub use executor::{ExecutionOutcome, WorkflowExecutor};
pub use models::{Edge, NodeDefinition, Trigger, Workflow};

#[cfg(test)]
mod executor_tests;
