//! Tracing subscriber setup for binaries and tools embedding the engine
//!
//! The library itself only emits `tracing` events. Filtering follows
//! `RUST_LOG`, defaulting to `info`.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a global subscriber, human-readable or JSON lines.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(json: bool) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}
