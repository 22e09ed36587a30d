//! Log output setup for hosts of the sync core.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info,offline_sync=debug,local_store=info,sw_cache=info";

/// Install the global `tracing` subscriber.
///
/// Honors `RUST_LOG`. Calling it again, or after another subscriber was
/// installed, does nothing.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if result.is_ok() {
        tracing::debug!("Logging initialized");
    }
}
