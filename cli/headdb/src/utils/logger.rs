use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::commands::Verbosity;
use crate::utils::message;

/// Overrides the filter derived from `-v`/`-q`, e.g. `HEADDB_LOG=headdb_catalog=trace`
pub const HEADDB_LOG_VAR: &str = "HEADDB_LOG";

pub(crate) fn init_logger(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_env(HEADDB_LOG_VAR)
        .or_else(|_| EnvFilter::try_new(log_filter(verbosity)));
    let filter = match filter {
        Ok(filter) => filter,
        Err(err) => {
            message::error(format!("Invalid log filter: {err}"));
            EnvFilter::new("warn")
        },
    };

    let log_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter);

    if let Err(err) = tracing_subscriber::registry().with(log_layer).try_init() {
        message::error(format!("Initializing logger failed: {err}"));
    }
}

fn log_filter(verbosity: Verbosity) -> &'static str {
    match verbosity {
        // Show only errors
        Verbosity::Quiet => "off,headdb=error,headdb_catalog=error",
        // Show our own info logs
        Verbosity::Verbose(0) => "off,headdb=info,headdb_catalog=info",
        // Also show debug logs, including per category timings
        Verbosity::Verbose(1) => "off,headdb=debug,headdb_catalog=debug",
        // Also show info from HTTP dependencies
        Verbosity::Verbose(2) => "info,headdb=trace,headdb_catalog=trace",
        Verbosity::Verbose(_) => "trace",
    }
}
