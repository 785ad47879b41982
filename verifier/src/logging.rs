//! Diagnostic output for the `tbv` binary.
//!
//! Library code only talks to the `log` facade. The binary installs a
//! `tracing-subscriber` formatter on stderr, whose `log` bridge picks up
//! those records, with a default level chosen by the `-v` count. Directives
//! in `RUST_LOG` refine the filter when set.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Error returned when a global subscriber is already installed.
pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Maps the `-v` count to a level filter.
///
/// No flag keeps the run quiet, `-v` shows notices, warnings, and failures,
/// and `-vv` or more adds debug and trace output.
#[must_use]
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::OFF,
        1 => LevelFilter::INFO,
        _ => LevelFilter::TRACE,
    }
}

/// Builds the filter for `verbosity`, letting `RUST_LOG` add directives.
#[must_use]
pub fn filter_for(verbosity: u8) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level_for(verbosity).into())
        .from_env_lossy()
}

/// Installs the stderr subscriber and the `log` bridge.
///
/// # Errors
///
/// Returns an error if a subscriber or logger is already installed.
pub fn init(verbosity: u8) -> Result<(), InitError> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_env_filter(filter_for(verbosity))
        .try_init()
}
