use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{field::Visit, Event, Level, Subscriber};
use tracing_subscriber::{
    fmt,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};
use trade_ledger_types::{RunId, RunMode};

use crate::collector::MetricsCollector;

/// Filter used when neither the config nor `RUST_LOG` sets one
pub const DEFAULT_FILTER: &str = "info,trade_ledger=debug";

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `filter`; an empty `filter` falls back to
/// [`DEFAULT_FILTER`]. With a collector, error events are also counted.
pub fn init_tracing(
    filter: &str,
    format: LogFormat,
    collector: Option<Arc<MetricsCollector>>,
) -> Result<(), TracingError> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| {
        let directives = if filter.trim().is_empty() {
            DEFAULT_FILTER
        } else {
            filter
        };
        EnvFilter::try_new(directives).map_err(|e| TracingError::InvalidFilter(e.to_string()))
    })?;

    let metrics_layer = collector.map(MetricsLayer::new);
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(metrics_layer);

    let result = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .json(),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).pretty())
            .try_init(),
    };

    result.map_err(|e| TracingError::InitError(e.to_string()))
}

/// Counts error-level events per target
pub struct MetricsLayer {
    collector: Arc<MetricsCollector>,
}

impl MetricsLayer {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }
}

impl<S> Layer<S> for MetricsLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() != Level::ERROR {
            return;
        }

        let mut visitor = ErrorVisitor::default();
        event.record(&mut visitor);
        let target = visitor.target.as_deref().unwrap_or(metadata.target());
        self.collector.record_error(target);
    }
}

/// Picks up an explicit `error_target` field, which overrides the module path
#[derive(Default)]
struct ErrorVisitor {
    target: Option<String>,
}

impl Visit for ErrorVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "error_target" {
            self.target = Some(format!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "error_target" {
            self.target = Some(value.to_string());
        }
    }
}

/// Span context for one integrity run
#[derive(Debug, Clone)]
pub struct RunSpan {
    pub run_id: RunId,
    pub mode: RunMode,
}

impl RunSpan {
    pub fn new(run_id: RunId, mode: RunMode) -> Self {
        Self { run_id, mode }
    }

    /// Span to instrument the run's future with
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "integrity_run",
            run_id = %self.run_id,
            mode = %self.mode,
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("tracing initialization error: {0}")]
    InitError(String),
}
