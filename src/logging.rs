use std::io;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Output goes to stderr so stdout carries only
/// scan output. `RUST_LOG`, when set, overrides `default_level`.
pub fn init(default_level: &str) -> Result<()> {
    let filter = build_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), default_level)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

/// Blank `env` counts as unset. Errors name whichever input failed to parse.
fn build_filter(env: Option<String>, default_level: &str) -> Result<EnvFilter> {
    match env {
        Some(directives) if !directives.trim().is_empty() => EnvFilter::try_new(&directives)
            .with_context(|| format!("invalid {} filter {directives:?}", EnvFilter::DEFAULT_ENV)),
        _ => EnvFilter::try_new(default_level)
            .with_context(|| format!("invalid log level {default_level:?}")),
    }
}
