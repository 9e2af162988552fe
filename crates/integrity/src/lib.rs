//! Content-hash integrity verification for stored trade documents.
//!
//! The [`IntegrityVerifier`] recomputes a document's SHA-256 and classifies
//! it, the [`AlertManager`] persists results and raises deduplicated alerts,
//! and the [`IntegrityScheduler`] drives periodic and on-demand runs with
//! retries on transient storage failures.

pub mod alerts;
pub mod error;
pub mod notifier;
pub mod scheduler;
pub mod verifier;

pub use alerts::AlertManager;
pub use error::{AlertError, SchedulerError, VerifyError};
pub use notifier::{AlertNotifier, NotifyError, RecordingNotifier, RunNotice, TracingNotifier};
pub use scheduler::{IntegrityScheduler, RunHandle, RunScope, SchedulerConfig};
pub use verifier::{IntegrityVerifier, DEFAULT_FETCH_TIMEOUT};
