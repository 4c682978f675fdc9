//! Tracing subscriber initialisation.

use crate::config::LogConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global subscriber.
///
/// `RUST_LOG` takes precedence over [`LogConfig::filter`]. Returns an error
/// if a global subscriber is already set.
pub fn init_tracing(config: &LogConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.as_str()));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()?;
    }

    tracing::info!(filter = %config.filter, json = config.json, "tracing initialised");
    Ok(())
}

/// Span tying together every step of one saga run.
pub fn saga_span(saga: &str, urn: &str) -> tracing::Span {
    tracing::info_span!("saga", saga, urn, correlation.id = %uuid::Uuid::new_v4())
}
