//! Tracing subscriber setup.

use anyhow::anyhow;
use tracing_subscriber::EnvFilter;

use crate::config::LogSettings;

/// Install the global subscriber.
///
/// `--verbose` forces `debug`; otherwise `RUST_LOG` wins over the configured
/// level.
pub fn init(settings: &LogSettings) -> anyhow::Result<()> {
    let filter = filter_for(settings)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false);

    let installed = if settings.json {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

fn filter_for(settings: &LogSettings) -> anyhow::Result<EnvFilter> {
    if settings.verbose {
        return Ok(EnvFilter::new("debug"));
    }
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&settings.level)
            .map_err(|e| anyhow!("invalid log level {:?}: {e}", settings.level)),
    }
}
