//! Tracing subscriber setup.
//!
//! Every entry point funnels into one registry with a compact fmt layer;
//! they differ only in where the filter directive comes from.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Filter used when neither an explicit directive nor `RUST_LOG` is given.
pub const DEFAULT_FILTER: &str = "remote_exec=info";

/// Install the subscriber, filtering with `RUST_LOG` or [`DEFAULT_FILTER`].
///
/// A subscriber installed earlier, by this crate or the host application,
/// is kept.
pub fn init() {
    if try_init().is_err() {
        tracing::debug!("tracing subscriber already installed, keeping it");
    }
}

/// Like [`init`], but reports an already installed subscriber.
pub fn try_init() -> Result<(), TryInitError> {
    try_init_with_filter(filter_for(None))
}

/// Install the subscriber with an explicit filter directive.
///
/// An unparsable directive falls back to [`DEFAULT_FILTER`].
pub fn try_init_with(directive: &str) -> Result<(), TryInitError> {
    try_init_with_filter(filter_for(Some(directive)))
}

/// Install the subscriber with the level from the logging section.
pub fn try_init_from_config(config: &Config) -> Result<(), TryInitError> {
    try_init_with(config.log_filter())
}

fn filter_for(directive: Option<&str>) -> EnvFilter {
    let parsed = match directive {
        Some(directive) => EnvFilter::try_new(directive).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    };
    parsed.unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

fn try_init_with_filter(filter: EnvFilter) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
}
