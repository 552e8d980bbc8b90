use std::env;
use std::sync::Once;

use tracing::{debug, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::config::Settings;
use crate::domain::Classification;
use crate::infrastructure::ServiceContainer;

static TEST_SETUP: Once = Once::new();

pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        if env::var("RUST_LOG").is_err() {
            env::set_var("RUST_LOG", "otdb=trace");
        }
        // global logging subscriber, used by all tracing log macros
        setup_test_logging();
        info!("Test Setup complete");
    });
}

fn setup_test_logging() {
    debug!("INIT: Attempting logger init from testing.rs");
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_test_writer()
            .with_filter(env_filter),
    );

    // Only set if we haven't already set a global subscriber
    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else {
        subscriber.try_init().unwrap_or_else(|e| {
            eprintln!("Error: Failed to set up logging: {}", e);
        });
    }
}

/// Settings for tests: fixed user, default limits, store in `store_dir`.
pub fn test_settings(store_dir: &std::path::Path) -> Settings {
    Settings {
        store_dir: store_dir.to_path_buf(),
        user: "tester".into(),
        default_classification: Classification::Development,
        max_reference_depth: 8,
        prune_level: 1,
    }
}

/// A container with an in-memory store.
pub fn memory_container() -> ServiceContainer {
    init_test_setup();
    ServiceContainer::in_memory(test_settings(std::path::Path::new("/nonexistent")))
}
