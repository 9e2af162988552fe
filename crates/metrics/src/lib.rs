//! Metrics and tracing setup for the trade ledger
//!
//! # Features
//!
//! - Prometheus counters and histograms owned by a [`MetricsCollector`]
//! - HTTP endpoint for metrics scraping and liveness
//! - Subscriber initialisation with JSON or pretty output
//! - Per-run spans for integrity sweeps
//!
//! # Example
//!
//! ```no_run
//! use trade_ledger_metrics::{MetricsCollector, MetricsServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let collector = Arc::new(MetricsCollector::new().unwrap());
//!     let server = MetricsServer::new(collector.clone(), "0.0.0.0:9090".to_string());
//!     server.serve().await.unwrap();
//! }
//! ```

pub mod collector;
pub mod http;
pub mod tracing;

pub use collector::{MetricsCollector, MetricsError};
pub use http::{MetricsServer, MetricsServerError};
pub use tracing::{init_tracing, LogFormat, MetricsLayer, RunSpan, TracingError, DEFAULT_FILTER};
