//! Shared test setup.

use std::sync::Once;

use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static TEST_SETUP: Once = Once::new();

/// Installs a test-writer subscriber once per test binary.
///
/// `RUST_LOG` overrides the default `mandate=debug`.
pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mandate=debug"));
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .try_init();
        match installed {
            Ok(()) => info!("test logging ready"),
            Err(e) => eprintln!("test logging not installed: {e}"),
        }
    });
}
