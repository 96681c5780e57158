//! Reliability primitives.
//!
//! - [`retry`]: Exponential backoff for transient failures

pub mod retry;
