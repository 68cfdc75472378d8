use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. `RUST_LOG` wins over `default_directive`.
///
/// Errors if a global subscriber is already set, e.g. when called twice.
pub fn init_tracing(default_directive: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
}
