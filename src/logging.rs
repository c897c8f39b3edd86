use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{GraphError, Result};

/// Installs the global `tracing` subscriber.
///
/// `level` is an `EnvFilter` directive such as `info` or
/// `pagegraph::engine=debug`. `RUST_LOG`, when set, takes precedence.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(env) if !env.trim().is_empty() => EnvFilter::try_new(env),
        _ => EnvFilter::try_new(level),
    }
    .map_err(|e| GraphError::Config(format!("invalid log level: {e}")))?;
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| GraphError::Config("logging already initialized".into()))
}
