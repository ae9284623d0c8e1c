//! Job model: the persisted record, retry policy, and handler contract.
//!
//! A job is a durable, retryable unit of asynchronous work. Its persisted
//! form is [`JobRecord`]; its behavior lives in a [`JobHandler`] registered
//! for the record's `kind`, resolved through a [`HandlerRegistry`] at
//! dispatch time.

pub mod handler;
pub mod record;

pub use handler::{HandlerRegistry, JobFailure, JobHandler};
pub use record::{JobRecord, JobStatus, RetryPolicy, MAX_BACKOFF_MS};
