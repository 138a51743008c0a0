//! Logging bootstrap using tracing.
//!
//! The engine only emits `tracing` events; the host decides whether to
//! install this subscriber or its own.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize logging with the specified level (`RUST_LOG` takes precedence)
pub fn init(level: &str) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(build_filter(level))
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Like [`init`], but a subscriber that is already installed is not an error.
///
/// Returns whether this call installed the subscriber.
pub fn try_init(level: &str) -> bool {
    tracing_subscriber::registry()
        .with(build_filter(level))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init()
        .is_ok()
}
