//! log output.

use {
    crate::config::LogFormat,
    tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

/// the filter used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info";

/// installs the global subscriber, writing to stderr in the given format.
///
/// directives in `RUST_LOG` override the default `info` level.
pub fn init(format: LogFormat) -> anyhow::Result<()> {
    let filter = filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())?;
    let registry = Registry::default().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()?,
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false),
            )
            .try_init()?,
    }

    Ok(())
}

fn filter(directives: Option<&str>) -> anyhow::Result<EnvFilter> {
    match directives {
        Some(directives) if !directives.trim().is_empty() => Ok(EnvFilter::try_new(directives)?),
        _ => Ok(EnvFilter::new(DEFAULT_FILTER)),
    }
}
