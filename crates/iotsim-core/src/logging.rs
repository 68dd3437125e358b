//! `tracing` initialisation shared by the binary and integration tests.

use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let _ = fmt().with_env_filter(filter).try_init();
}
