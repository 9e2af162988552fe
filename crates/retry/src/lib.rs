//! Retry and bounded-concurrency primitives for background verification work
//!
//! - `ExponentialBackoff`: delay schedule between attempts
//! - `RetryPolicy`: attempt budget plus backoff, retrying only transient failures
//! - `WorkerPool`: semaphore-bounded execution of per-document jobs

pub mod backoff;
pub mod policy;
pub mod pool;

pub use backoff::ExponentialBackoff;
pub use policy::{RetryError, RetryPolicy, Retried};
pub use pool::{PoolError, WorkerPool};
