//! Logging initialization for the CLI.
//!
//! Logging is owned by the CLI crate; library crates only emit `tracing`
//! events.

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber.
///
/// * `verbosity` - 0 = INFO, 1 = DEBUG, 2+ = TRACE for modserve's own targets
/// * `json` - If true, output JSON lines to stderr
///
/// `RUST_LOG` is honored for everything else; without it other crates log
/// at WARN.
pub fn init(verbosity: u8, json: bool) {
    let level = level_for(verbosity);

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy()
        .add_directive(own_directive("modserve", level))
        .add_directive(own_directive("modserve_core", level))
        .add_directive(own_directive("tower_http", level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn own_directive(target: &str, level: Level) -> Directive {
    let directive = format!("{target}={level}");
    directive
        .parse()
        .unwrap_or_else(|_| LevelFilter::from_level(level).into())
}
