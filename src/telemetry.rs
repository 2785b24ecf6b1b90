use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing for host binaries and test harnesses.
///
/// Filter defaults to `info` with crate-level debug and can be overridden
/// through `RUST_LOG`. Callers embedding the crate in a larger application
/// should install their own subscriber instead.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wind_ensemble=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
