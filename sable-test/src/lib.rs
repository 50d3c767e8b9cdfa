//! Shared test tooling for the sable workspace: tracing and error-report
//! installation, a common prelude, and hex test vectors.

use std::sync::Once;

use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod prelude;
pub mod vectors;

static INIT: Once = Once::new();

/// Initialize tracing and `color_eyre` panic/error reports for a test.
///
/// Call this at the top of every test; only the first call in a process
/// does anything.
pub fn init() {
    INIT.call_once(|| {
        let filter_layer =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt::layer().with_target(false))
            .with(ErrorLayer::default())
            .init();

        color_eyre::install().expect("color_eyre installs in an uninitialized process");
    })
}
