//! `nodes` crate — the `ExecutableNode` trait, the Block Registry, and
//! built-in node implementations.
//!
//! Every node — built-in and custom alike — must implement
//! [`ExecutableNode`]. The engine crate dispatches execution through this
//! trait object via the `BlockRegistry`.

pub mod builtin;
pub mod error;
pub mod external;
pub mod mock;
pub mod registry;
pub mod schema;
pub mod traits;

pub use error::NodeError;
pub use registry::{BlockDescriptor, BlockRegistry};
pub use traits::{ExecutableNode, ExecutionContext, NodeOutput};
