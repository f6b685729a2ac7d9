//! Tracing setup for the media server.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::fmt;

/// Install a console subscriber. `RUST_LOG` wins over `default_filter`.
///
/// # Errors
///
/// Fails if `default_filter` is not a valid filter directive or a global
/// subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> Result<(), Box<dyn std::error::Error>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)?,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()?;

    tracing::debug!(default_filter, "tracing initialized");
    Ok(())
}
