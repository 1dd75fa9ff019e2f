//! `queue` crate — the durable work queue (spec §4.2) and the circuit
//! breaker (spec §4.3) that protects publishes to it.
//!
//! Three logical channels — primary, retry, dead-letter — all live in one
//! `job_queue` table, distinguished by a `channel` column. Consumers poll
//! with `SELECT ... FOR UPDATE SKIP LOCKED` exactly like the `db` crate's
//! job-queue repository this module replaces and generalizes.

pub mod circuit_breaker;
pub mod envelope;
pub mod error;
pub mod repository;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use envelope::{Envelope, JobKind};
pub use error::QueueError;
