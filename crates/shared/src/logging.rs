use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing for the binary.
///
/// Default: info everywhere. Can be overridden with `RUST_LOG`.
pub fn init() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {e}"))
}
