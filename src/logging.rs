//! Logging configuration using tracing

use anyhow::Context;
use tracing::Subscriber;
use tracing_subscriber::{fmt, fmt::MakeWriter, prelude::*, registry::LookupSpan, EnvFilter, Layer};

/// Worker diagnostics stay visible at the default level
const DEFAULT_DIRECTIVES: &str = "info,chhobi::worker=warn";

fn filter_for(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
    }
}

/// Human-readable layer; the target tells worker stderr apart from our own events
fn plain_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer().with_target(true).with_writer(writer)
}

/// Initialize the logging system; output goes to stderr so stdout stays clean for data
pub fn init(verbose: bool, json: bool) -> anyhow::Result<()> {
    let filter = filter_for(verbose);

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(plain_layer(std::io::stderr))
            .try_init()
    };

    result.context("a global tracing subscriber is already installed")
}
